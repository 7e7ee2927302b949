//! Routing of unsolicited modem traffic
//!
//! The router runs on the channel's reader task, so it must never
//! submit commands. Anything that needs a command exchange (a data call
//! list recheck, a delayed notification) is pushed onto the deferred
//! queue and picked up by [`crate::driver::ModemDriver::run`].
//!
//! Everything is dropped while the radio is `Unavailable`; nothing the
//! modem says before initialization is trustworthy.

use std::sync::Arc;

use hayes_channel::{Unsolicited, UnsolicitedSink};
use hayes_protocol::{parse_cme_error, Tokenizer};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::WorkaroundPolicy;
use crate::data::DataCallState;
use crate::driver::DeferredAction;
use crate::events::ModemEvent;
use crate::radio::{parse_registration, RadioState};
use crate::session::{ModemSession, SignalReading};
use crate::sms::SmsCodec;

/// RSSI for a 0..5 signal level, in 27.007 units
const LEVEL_TO_RSSI: [i64; 6] = [0, 3, 5, 8, 12, 19];

pub(crate) struct UnsolicitedRouter {
    session: Arc<ModemSession>,
    deferred: mpsc::UnboundedSender<DeferredAction>,
    policy: WorkaroundPolicy,
    codec: Arc<dyn SmsCodec>,
}

impl UnsolicitedRouter {
    pub(crate) fn new(
        session: Arc<ModemSession>,
        deferred: mpsc::UnboundedSender<DeferredAction>,
        policy: WorkaroundPolicy,
        codec: Arc<dyn SmsCodec>,
    ) -> Self {
        Self {
            session,
            deferred,
            policy,
            codec,
        }
    }

    fn defer(&self, action: DeferredAction) {
        let _ = self.deferred.send(action);
    }

    /// Emit a call-state notification unless one is already out
    fn notify_call_state(&self) {
        if self.session.arm_call_notify() {
            self.session.emit(ModemEvent::CallStateChanged);
        }
    }

    fn handle_nitz(&self, line: &str) {
        if line.starts_with("+HTCCTZV:") {
            // Single-shot variant carrying the complete time report.
            match parse_full_time(line) {
                Some(report) => self.session.emit(ModemEvent::NitzTimeReceived(report)),
                None => debug!(line, "malformed time report"),
            }
        } else if line.starts_with("+CTZV:") || line.starts_with("%CTZV:") {
            // Two fields: timezone, then local time. Held until the
            // daylight-saving part follows.
            if let Some(fragment) = parse_ctzv(line) {
                self.session.store_nitz_fragment(fragment);
            } else {
                debug!(line, "malformed time report");
            }
        } else if let Some(rest) = line.strip_prefix("+CTZDST:") {
            let dst = rest.trim();
            match self.session.take_nitz_fragment() {
                Some(fragment) => self
                    .session
                    .emit(ModemEvent::NitzTimeReceived(format!("{fragment},{dst}"))),
                None => debug!("daylight-saving report without a time report"),
            }
        }
    }

    fn handle_call_drop(&self, line: &str) {
        let drop_level = match self.session.data_state() {
            DataCallState::Connected => 1,
            DataCallState::Dialing => 2,
            _ => 0,
        };

        // A line-drop report while connected can only mean the data
        // call; there is nothing to repoll on the voice side.
        if line.starts_with("+PCD") && drop_level == 1 {
            self.defer(DeferredAction::DataCallListRecheck);
            return;
        }
        // A drop while dialing aborts the setup in progress; the setup
        // loop notices the state change.
        if drop_level == 2 {
            self.session.set_data_state(DataCallState::Terminated);
            return;
        }
        if drop_level == 1 {
            self.defer(DeferredAction::DataCallListRecheck);
        }
        self.notify_call_state();
    }

    fn handle_rssi(&self, line: &str) {
        let reading = if line.starts_with("+CSQ:") {
            parse_csq(line)
        } else {
            parse_level_report(line)
        };
        match reading {
            Some(reading) => {
                self.session.cache_signal(reading);
                self.session.emit(ModemEvent::SignalStrength(reading));
            }
            None => debug!(line, "malformed signal report"),
        }
    }

    fn handle_registration(&self, line: &str) {
        let info = parse_registration(line).ok();

        // Only the first line of an unsolicited burst becomes an event;
        // the host's follow-up query resets the window.
        if self.session.begin_registration_burst() {
            if let Some(info) = &info {
                self.session.set_registration_status(info.status);
            }
            self.session.emit(ModemEvent::NetworkStateChanged);
        }

        // Deregistration while a data call is up will not always come
        // with a context event; recheck the list ourselves.
        if let Some(info) = info {
            if !info.is_registered() && self.session.data_state() == DataCallState::Connected {
                self.defer(DeferredAction::DataCallListRecheck);
            }
        }
    }

    fn handle_new_sms(&self, pdu: Option<String>) {
        let Some(pdu) = pdu else {
            warn!("SMS notification without a PDU line");
            return;
        };
        let decoded = self.codec.decode_deliver(&pdu);
        self.session.emit(ModemEvent::NewSms { pdu, decoded });
    }

    fn handle_status_report(&self, pdu: Option<String>) {
        let Some(mut pdu) = pdu else {
            warn!("status report without a PDU line");
            return;
        };
        // Some firmware strips the SMSC header; prepend a zero-length
        // one so the PDU stays well-formed.
        if !pdu.starts_with("07") {
            pdu = format!("00{pdu}");
        }
        self.session.emit(ModemEvent::NewSmsStatusReport { pdu });
    }

    fn handle_ussd(&self, line: &str) {
        match parse_ussd(line) {
            Some((kind, text)) => self.session.emit(ModemEvent::Ussd { kind, text }),
            None => debug!(line, "malformed USSD notification"),
        }
    }

    /// The configured firmware quirk: a dropped PDP context reported as
    /// a bare CME error line instead of a `+CGEV` notification
    fn is_fake_context_event(&self, line: &str) -> bool {
        match self.policy.fake_context_event_cme {
            Some(code) => parse_cme_error(line).is_some_and(|cme| cme.code() == code),
            None => false,
        }
    }
}

impl UnsolicitedSink for UnsolicitedRouter {
    fn on_unsolicited(&mut self, unsolicited: Unsolicited) {
        if self.session.radio_state() == RadioState::Unavailable {
            return;
        }
        let line = unsolicited.line.as_str();

        if line.starts_with("+CTZV:")
            || line.starts_with("%CTZV:")
            || line.starts_with("+CTZDST:")
            || line.starts_with("+HTCCTZV:")
        {
            self.handle_nitz(line);
        } else if line == "RING" || line == "2" || line.starts_with("+CRING:") {
            self.session.emit(ModemEvent::CallRing);
            self.notify_call_state();
        } else if line.starts_with("+CCWA") {
            self.session.emit(ModemEvent::CallWaiting);
            self.notify_call_state();
        } else if line == "3" || line.starts_with("NO CARRIER") || line.starts_with("+PCD:") {
            self.handle_call_drop(line);
        } else if line.starts_with("+CSQ:") || line.starts_with("+XCIEV:") {
            self.handle_rssi(line);
        } else if line.starts_with("+CREG:") || line.starts_with("+CGREG:") {
            self.handle_registration(line);
        } else if line.starts_with("+CMT:") {
            self.handle_new_sms(unsolicited.pdu);
        } else if line.starts_with("+CDS:") {
            self.handle_status_report(unsolicited.pdu);
        } else if line.starts_with("+CGEV:") || self.is_fake_context_event(line) {
            self.defer(DeferredAction::DataCallListRecheck);
        } else if line.starts_with("+CUSD:") {
            self.handle_ussd(line);
        } else {
            debug!(line, "unhandled unsolicited line");
        }
    }

    fn on_closed(&mut self) {
        self.session.mark_closed();
    }
}

/// `+HTCCTZV: "<time><tz>,<dst>"` carries the whole report in one line
fn parse_full_time(line: &str) -> Option<String> {
    let mut fields = Tokenizer::new(line).ok()?;
    Some(fields.next_str().ok()?.to_owned())
}

/// `+CTZV: "<tz>","<time>"` becomes the `<time><tz>` fragment the
/// daylight-saving report completes
fn parse_ctzv(line: &str) -> Option<String> {
    let mut fields = Tokenizer::new(line).ok()?;
    let tz = fields.next_str().ok()?.to_owned();
    let time = fields.next_str().ok()?;
    Some(format!("{time}{tz}"))
}

fn parse_csq(line: &str) -> Option<SignalReading> {
    let mut fields = Tokenizer::new(line).ok()?;
    Some(SignalReading {
        rssi: fields.next_int().ok()?,
        ber: fields.next_int().unwrap_or(99),
    })
}

/// Signal level reports carry 0..5 instead of an RSSI
fn parse_level_report(line: &str) -> Option<SignalReading> {
    let mut fields = Tokenizer::new(line).ok()?;
    let level = fields.next_int().ok()?.clamp(0, 5) as usize;
    Some(SignalReading {
        rssi: LEVEL_TO_RSSI[level],
        ber: 99,
    })
}

/// `+CUSD: <type>[,<hex payload>,<dcs>]`. The payload is UCS-2 when
/// the data coding scheme says so, 8-bit characters otherwise.
fn parse_ussd(line: &str) -> Option<(u8, Option<String>)> {
    let mut fields = Tokenizer::new(line).ok()?;
    let kind = (fields.next_int().ok()? & 7) as u8;
    if !fields.has_more() {
        return Some((kind, None));
    }
    let payload = fields.next_str().ok()?;
    let dcs = fields.next_int().unwrap_or(0);
    let bytes = hex_to_bytes(payload)?;
    let text = if (dcs & 0xec) == 0x48 {
        ucs2_to_string(&bytes)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };
    Some((kind, Some(text)))
}

fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn ucs2_to_string(bytes: &[u8]) -> String {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .map(|unit| char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::TechnologyFamily;
    use crate::sms::RawPduCodec;
    use tokio::sync::mpsc::error::TryRecvError;

    struct Fixture {
        router: UnsolicitedRouter,
        session: Arc<ModemSession>,
        events: mpsc::UnboundedReceiver<ModemEvent>,
        deferred: mpsc::UnboundedReceiver<DeferredAction>,
    }

    fn fixture() -> Fixture {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (deferred_tx, deferred) = mpsc::unbounded_channel();
        let session = Arc::new(ModemSession::new(TechnologyFamily::Sim, event_tx));
        session.set_radio_state(RadioState::SimReady);
        let router = UnsolicitedRouter::new(
            session.clone(),
            deferred_tx,
            WorkaroundPolicy::default(),
            Arc::new(RawPduCodec),
        );
        let mut fixture = Fixture {
            router,
            session,
            events,
            deferred,
        };
        // Drop the RadioStateChanged from setup.
        let _ = fixture.events.try_recv();
        fixture
    }

    fn line(fixture: &mut Fixture, line: &str) {
        fixture.router.on_unsolicited(Unsolicited {
            line: line.to_owned(),
            pdu: None,
        });
    }

    #[test]
    fn everything_is_dropped_while_unavailable() {
        let mut fx = fixture();
        fx.session.mark_closed();
        let _ = fx.events.try_recv();
        line(&mut fx, "RING");
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn ring_reports_and_notifies_once() {
        let mut fx = fixture();
        line(&mut fx, "RING");
        line(&mut fx, "+CRING: VOICE");
        line(&mut fx, "2");
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallRing);
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallStateChanged);
        // Further rings in the burst only ring; the notification is
        // still out.
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallRing);
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallRing);
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn voice_drop_notifies_once_until_acked() {
        let mut fx = fixture();
        line(&mut fx, "NO CARRIER");
        line(&mut fx, "NO CARRIER");
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallStateChanged);
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
        fx.session.ack_call_notify();
        line(&mut fx, "NO CARRIER");
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallStateChanged);
    }

    #[test]
    fn drop_while_dialing_terminates_the_data_call_silently() {
        let mut fx = fixture();
        fx.session.set_data_state(DataCallState::Dialing);
        line(&mut fx, "NO CARRIER");
        assert_eq!(fx.session.data_state(), DataCallState::Terminated);
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(fx.deferred.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn drop_while_connected_rechecks_the_data_call_list() {
        let mut fx = fixture();
        fx.session.set_data_state(DataCallState::Connected);
        line(&mut fx, "+PCD: 1,0");
        assert_eq!(
            fx.deferred.try_recv().unwrap(),
            DeferredAction::DataCallListRecheck
        );
        // The drop was attributed to data; no voice notification.
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn rssi_report_is_cached_for_the_next_query() {
        let mut fx = fixture();
        line(&mut fx, "+CSQ: 21,99");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::SignalStrength(SignalReading { rssi: 21, ber: 99 })
        );
        assert_eq!(
            fx.session.take_signal(),
            Some(SignalReading { rssi: 21, ber: 99 })
        );
    }

    #[test]
    fn level_report_is_scaled() {
        let mut fx = fixture();
        line(&mut fx, "+XCIEV: 4,0");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::SignalStrength(SignalReading { rssi: 12, ber: 99 })
        );
    }

    #[test]
    fn registration_burst_emits_one_event() {
        let mut fx = fixture();
        line(&mut fx, "+CREG: 1");
        line(&mut fx, "+CGREG: 1");
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::NetworkStateChanged);
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(fx.session.registration_status(), Some(1));
    }

    #[test]
    fn deregistration_with_data_up_rechecks_the_list() {
        let mut fx = fixture();
        fx.session.set_data_state(DataCallState::Connected);
        line(&mut fx, "+CREG: 0");
        assert_eq!(
            fx.deferred.try_recv().unwrap(),
            DeferredAction::DataCallListRecheck
        );
    }

    #[test]
    fn new_sms_carries_the_pdu() {
        let mut fx = fixture();
        fx.router.on_unsolicited(Unsolicited {
            line: "+CMT: ,24".to_owned(),
            pdu: Some("07914400000000F0040B91".to_owned()),
        });
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::NewSms {
                pdu: "07914400000000F0040B91".to_owned(),
                decoded: None,
            }
        );
    }

    #[test]
    fn status_report_missing_smsc_header_gets_one() {
        let mut fx = fixture();
        fx.router.on_unsolicited(Unsolicited {
            line: "+CDS: 25".to_owned(),
            pdu: Some("06270B9144".to_owned()),
        });
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::NewSmsStatusReport {
                pdu: "0006270B9144".to_owned(),
            }
        );
    }

    #[test]
    fn status_report_with_smsc_header_is_untouched() {
        let mut fx = fixture();
        fx.router.on_unsolicited(Unsolicited {
            line: "+CDS: 25".to_owned(),
            pdu: Some("07914400000000F0".to_owned()),
        });
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::NewSmsStatusReport {
                pdu: "07914400000000F0".to_owned(),
            }
        );
    }

    #[test]
    fn context_event_rechecks_the_list() {
        let mut fx = fixture();
        line(&mut fx, "+CGEV: NW DEACT \"IP\", \"10.0.0.2\", 1");
        assert_eq!(
            fx.deferred.try_recv().unwrap(),
            DeferredAction::DataCallListRecheck
        );
    }

    #[test]
    fn fake_context_event_cme_line_rechecks_the_list() {
        let mut fx = fixture();
        line(&mut fx, "+CME ERROR: 150");
        assert_eq!(
            fx.deferred.try_recv().unwrap(),
            DeferredAction::DataCallListRecheck
        );
        // Other codes stay unhandled.
        line(&mut fx, "+CME ERROR: 100");
        assert_eq!(fx.deferred.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn nitz_time_assembles_across_reports() {
        let mut fx = fixture();
        line(&mut fx, "+CTZV: \"+04\",\"10/05/06,00:01:52\"");
        assert_eq!(fx.events.try_recv(), Err(TryRecvError::Empty));
        line(&mut fx, "+CTZDST: 1");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::NitzTimeReceived("10/05/06,00:01:52+04,1".to_owned())
        );
    }

    #[test]
    fn single_shot_time_report_emits_directly() {
        let mut fx = fixture();
        line(&mut fx, "+HTCCTZV: \"10/05/06,00:01:52+04,1\"");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::NitzTimeReceived("10/05/06,00:01:52+04,1".to_owned())
        );
    }

    #[test]
    fn ussd_gsm8_payload_decodes() {
        let mut fx = fixture();
        // "Hi" in 8-bit characters
        line(&mut fx, "+CUSD: 0,\"4869\",0");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::Ussd {
                kind: 0,
                text: Some("Hi".to_owned()),
            }
        );
    }

    #[test]
    fn ussd_ucs2_payload_decodes() {
        let mut fx = fixture();
        // "Hi" in UCS-2, dcs 0x48
        line(&mut fx, "+CUSD: 1,\"00480069\",72");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::Ussd {
                kind: 1,
                text: Some("Hi".to_owned()),
            }
        );
    }

    #[test]
    fn ussd_without_payload() {
        let mut fx = fixture();
        line(&mut fx, "+CUSD: 2");
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ModemEvent::Ussd {
                kind: 2,
                text: None,
            }
        );
    }

    #[test]
    fn call_waiting_reports_and_notifies() {
        let mut fx = fixture();
        line(&mut fx, "+CCWA: \"+18005551212\",145,1");
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallWaiting);
        assert_eq!(fx.events.try_recv().unwrap(), ModemEvent::CallStateChanged);
    }
}
