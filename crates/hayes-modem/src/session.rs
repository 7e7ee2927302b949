//! Shared telephony state
//!
//! One [`ModemSession`] holds everything both sides touch: the request
//! path (driver methods running command exchanges) and the unsolicited
//! path (the router running on the reader task). Every field is
//! individually synchronized so the router never blocks on a request in
//! flight.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::data::DataCallState;
use crate::events::ModemEvent;
use crate::radio::{RadioState, TechnologyFamily};

/// Signal strength figures as reported by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalReading {
    /// RSSI in 3GPP 27.007 units, 0..31 or 99 for unknown
    pub rssi: i64,
    /// Bit error rate, 0..7 or 99 for unknown
    pub ber: i64,
}

pub struct ModemSession {
    technology: TechnologyFamily,
    radio_tx: watch::Sender<RadioState>,
    /// Latched on transport closure; forces every later radio state to
    /// [`RadioState::Unavailable`]
    closed: AtomicBool,

    data: Mutex<DataCallState>,
    /// Reading cached from an unsolicited report, consumed by the next
    /// signal strength query
    signal: Mutex<Option<SignalReading>>,
    /// Time fragment waiting for its daylight-saving part
    nitz_fragment: Mutex<Option<String>>,

    /// Last registration status seen, solicited or not
    registration_status: Mutex<Option<i64>>,
    /// Set by the first unsolicited registration line after a solicited
    /// query; suppresses duplicate network-state events in a burst
    registration_burst_seen: AtomicBool,

    /// A call-state notification is out and unacknowledged; further
    /// ones are suppressed until the next call poll
    call_notify_pending: AtomicBool,
    /// The host answered a call; disarms the phantom-answer heuristic
    expect_answer: AtomicBool,
    /// Index of the incoming or waiting call seen by the last poll
    incoming_or_waiting: Mutex<Option<i64>>,
    /// Consecutive phantom-answer repolls so far
    repoll_count: AtomicU32,

    audio_on: AtomicBool,

    events: mpsc::UnboundedSender<ModemEvent>,
}

impl ModemSession {
    pub fn new(technology: TechnologyFamily, events: mpsc::UnboundedSender<ModemEvent>) -> Self {
        let (radio_tx, _) = watch::channel(RadioState::Unavailable);
        Self {
            technology,
            radio_tx,
            closed: AtomicBool::new(false),
            data: Mutex::new(DataCallState::Off),
            signal: Mutex::new(None),
            nitz_fragment: Mutex::new(None),
            registration_status: Mutex::new(None),
            registration_burst_seen: AtomicBool::new(false),
            call_notify_pending: AtomicBool::new(false),
            expect_answer: AtomicBool::new(false),
            incoming_or_waiting: Mutex::new(None),
            repoll_count: AtomicU32::new(0),
            audio_on: AtomicBool::new(false),
            events,
        }
    }

    pub fn technology(&self) -> TechnologyFamily {
        self.technology
    }

    /// Push one event to the host. A send failure means the host
    /// dropped its receiver, which is its way of unsubscribing.
    pub fn emit(&self, event: ModemEvent) {
        let _ = self.events.send(event);
    }

    // --- radio state ---

    pub fn radio_state(&self) -> RadioState {
        *self.radio_tx.borrow()
    }

    /// Watch for radio state changes
    pub fn watch_radio(&self) -> watch::Receiver<RadioState> {
        self.radio_tx.subscribe()
    }

    /// Move the radio state machine. Once the transport has closed the
    /// only reachable state is `Unavailable`. Returns the state that was
    /// applied when it differs from the previous one.
    pub fn set_radio_state(&self, state: RadioState) -> Option<RadioState> {
        let effective = if self.closed.load(Ordering::SeqCst) {
            RadioState::Unavailable
        } else {
            state
        };

        let changed = self.radio_tx.send_replace(effective) != effective;
        if changed {
            debug!(?effective, "radio state");
            self.emit(ModemEvent::RadioStateChanged(effective));
            Some(effective)
        } else {
            None
        }
    }

    /// Latch transport closure and force the radio unavailable
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.set_radio_state(RadioState::Unavailable);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // --- data call state ---

    pub fn data_state(&self) -> DataCallState {
        *self.data.lock().unwrap()
    }

    pub fn set_data_state(&self, state: DataCallState) {
        *self.data.lock().unwrap() = state;
    }

    /// Move the data state only if it still holds `from`; a concurrent
    /// teardown or drop wins otherwise.
    pub fn advance_data_state(&self, from: DataCallState, to: DataCallState) -> bool {
        let mut state = self.data.lock().unwrap();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    // --- signal cache ---

    pub fn cache_signal(&self, reading: SignalReading) {
        *self.signal.lock().unwrap() = Some(reading);
    }

    /// Take the cached reading, leaving the cache empty
    pub fn take_signal(&self) -> Option<SignalReading> {
        self.signal.lock().unwrap().take()
    }

    // --- network time ---

    pub fn store_nitz_fragment(&self, fragment: String) {
        *self.nitz_fragment.lock().unwrap() = Some(fragment);
    }

    pub fn take_nitz_fragment(&self) -> Option<String> {
        self.nitz_fragment.lock().unwrap().take()
    }

    // --- registration ---

    pub fn set_registration_status(&self, status: i64) {
        *self.registration_status.lock().unwrap() = Some(status);
    }

    pub fn registration_status(&self) -> Option<i64> {
        *self.registration_status.lock().unwrap()
    }

    /// First unsolicited registration line since the last solicited
    /// query wins; the rest of the burst is suppressed.
    pub fn begin_registration_burst(&self) -> bool {
        !self.registration_burst_seen.swap(true, Ordering::SeqCst)
    }

    pub fn reset_registration_burst(&self) {
        self.registration_burst_seen.store(false, Ordering::SeqCst);
    }

    // --- call bookkeeping ---

    /// Try to arm a call-state notification; `false` means one is
    /// already out and unacknowledged.
    pub fn arm_call_notify(&self) -> bool {
        !self.call_notify_pending.swap(true, Ordering::SeqCst)
    }

    /// A call poll acknowledges whatever notification was out
    pub fn ack_call_notify(&self) {
        self.call_notify_pending.store(false, Ordering::SeqCst);
    }

    pub fn call_notify_pending(&self) -> bool {
        self.call_notify_pending.load(Ordering::SeqCst)
    }

    pub fn set_expect_answer(&self, expect: bool) {
        self.expect_answer.store(expect, Ordering::SeqCst);
    }

    pub fn expect_answer(&self) -> bool {
        self.expect_answer.load(Ordering::SeqCst)
    }

    /// Swap in the incoming-or-waiting index from the current poll,
    /// returning the previous poll's value
    pub fn swap_incoming_or_waiting(&self, index: Option<i64>) -> Option<i64> {
        std::mem::replace(&mut self.incoming_or_waiting.lock().unwrap(), index)
    }

    pub fn bump_repoll_count(&self) -> u32 {
        self.repoll_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_repoll_count(&self) {
        self.repoll_count.store(0, Ordering::SeqCst);
    }

    pub fn repoll_count(&self) -> u32 {
        self.repoll_count.load(Ordering::SeqCst)
    }

    // --- audio path ---

    /// Returns true when the flag actually changed
    pub fn set_audio_on(&self, on: bool) -> bool {
        self.audio_on.swap(on, Ordering::SeqCst) != on
    }

    pub fn audio_on(&self) -> bool {
        self.audio_on.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (ModemSession, mpsc::UnboundedReceiver<ModemEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ModemSession::new(TechnologyFamily::Sim, tx), rx)
    }

    #[test]
    fn radio_state_change_emits_once() {
        let (session, mut rx) = session();
        assert_eq!(session.set_radio_state(RadioState::Off), Some(RadioState::Off));
        assert_eq!(session.set_radio_state(RadioState::Off), None);
        assert_eq!(
            rx.try_recv().unwrap(),
            ModemEvent::RadioStateChanged(RadioState::Off)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_session_pins_radio_unavailable() {
        let (session, _rx) = session();
        session.set_radio_state(RadioState::SimReady);
        session.mark_closed();
        assert_eq!(session.radio_state(), RadioState::Unavailable);
        assert_eq!(session.set_radio_state(RadioState::SimReady), None);
        assert_eq!(session.radio_state(), RadioState::Unavailable);
    }

    #[test]
    fn data_state_advance_requires_expected_state() {
        let (session, _rx) = session();
        session.set_data_state(DataCallState::Dialing);
        assert!(session.advance_data_state(DataCallState::Dialing, DataCallState::Connected));
        assert!(!session.advance_data_state(DataCallState::Dialing, DataCallState::Connected));
        assert_eq!(session.data_state(), DataCallState::Connected);
    }

    #[test]
    fn signal_cache_is_consumed_on_take() {
        let (session, _rx) = session();
        session.cache_signal(SignalReading { rssi: 20, ber: 99 });
        assert!(session.take_signal().is_some());
        assert!(session.take_signal().is_none());
    }

    #[test]
    fn call_notify_arms_once_until_acked() {
        let (session, _rx) = session();
        assert!(session.arm_call_notify());
        assert!(!session.arm_call_notify());
        session.ack_call_notify();
        assert!(session.arm_call_notify());
    }

    #[test]
    fn registration_burst_dedup() {
        let (session, _rx) = session();
        assert!(session.begin_registration_burst());
        assert!(!session.begin_registration_burst());
        session.reset_registration_burst();
        assert!(session.begin_registration_burst());
    }
}
