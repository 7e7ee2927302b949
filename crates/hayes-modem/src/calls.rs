//! Voice call lifecycle
//!
//! The host never sees call progress directly; it polls
//! [`ModemDriver::poll_calls`] whenever a call-state event tells it to.
//! The poll is where firmware quirks get absorbed: unparseable `+CLCC`
//! entries are skipped rather than failing the list, and a phantom
//! "answered" call that appears the instant an incoming call vanishes
//! is repolled away, bounded by [`crate::config::WorkaroundPolicy`].

use hayes_protocol::{parse_call_record, CallRecord, CallState, CommandShape};
use tracing::debug;

use crate::driver::{DeferredAction, ModemDriver};
use crate::error::ModemError;

/// Caller line identification override for an outgoing call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClirMode {
    /// Use the subscription default
    #[default]
    Default,
    /// Withhold the caller's number
    Invoke,
    /// Present the caller's number
    Suppress,
}

/// Audio routing hook. The driver only decides when call audio should
/// be up; how that happens is platform business.
pub trait AudioPath: Send + Sync {
    fn set_enabled(&self, enabled: bool);
}

/// Audio hook for platforms where the modem routes audio itself
#[derive(Debug, Default)]
pub struct NullAudioPath;

impl AudioPath for NullAudioPath {
    fn set_enabled(&self, _enabled: bool) {}
}

impl ModemDriver {
    /// Snapshot the current calls.
    ///
    /// Only voice calls are reported. Calling this acknowledges any
    /// outstanding call-state notification; if unstable calls remain, a
    /// fresh delayed notification is armed so the host polls again.
    pub async fn poll_calls(&self) -> Result<Vec<CallRecord>, ModemError> {
        loop {
            self.session.ack_call_notify();

            let response = self.channel.send_multiline("AT+CLCC", "+CLCC:").await?;
            if !response.success {
                return Err(ModemError::Command(response.final_line));
            }

            let mut calls = Vec::new();
            let mut incoming = None;
            let mut needs_repoll = false;
            for line in &response.lines {
                match parse_call_record(line) {
                    Ok(record) => {
                        if matches!(record.state, CallState::Incoming | CallState::Waiting) {
                            incoming = Some(record.index);
                        }
                        if !record.state.is_stable() {
                            needs_repoll = true;
                        }
                        if record.is_voice {
                            calls.push(record);
                        }
                    }
                    Err(err) => debug!(%err, line, "skipping unparseable call entry"),
                }
            }

            if self.is_phantom_answer(&calls, incoming) {
                self.session.bump_repoll_count();
                debug!(
                    repoll = self.session.repoll_count(),
                    "phantom answered call, repolling"
                );
                tokio::time::sleep(self.config.call_notify_delay).await;
                continue;
            }
            self.session.swap_incoming_or_waiting(incoming);
            self.session.set_expect_answer(false);
            self.session.reset_repoll_count();

            if calls.is_empty() && self.session.audio_on() {
                self.set_audio(false);
            }

            if needs_repoll && self.session.arm_call_notify() {
                let _ = self
                    .deferred_tx
                    .send(DeferredAction::NotifyCallStateDelayed);
            }

            return Ok(calls);
        }
    }

    /// An incoming call vanished and an already-active call sits at its
    /// index, yet nobody answered. Some firmware does this briefly
    /// while the caller hangs up; trust it only after bounded repolls
    /// keep showing the same picture.
    fn is_phantom_answer(&self, calls: &[CallRecord], incoming: Option<i64>) -> bool {
        let previous = match self.session.swap_incoming_or_waiting(incoming) {
            Some(index) => index,
            None => return false,
        };
        // Keep the baseline for the next pass in case we repoll.
        self.session.swap_incoming_or_waiting(Some(previous));

        incoming.is_none()
            && !self.session.expect_answer()
            && calls
                .iter()
                .any(|call| call.index == previous && call.state == CallState::Active)
            && self.session.repoll_count() < self.config.workarounds.max_erroneous_answer_repolls
    }

    /// Place an outgoing voice call. Success means the dial was
    /// accepted; progress arrives through call-state events.
    pub async fn dial(&self, number: &str, clir: ClirMode) -> Result<(), ModemError> {
        self.set_audio(true);
        let suffix = match clir {
            ClirMode::Default => "",
            ClirMode::Invoke => "I",
            ClirMode::Suppress => "i",
        };
        // The modem holds the final until the network accepts the dial.
        self.channel
            .submit_with_timeout(
                &format!("ATD{number}{suffix};"),
                CommandShape::NoResult,
                None,
                self.config.dial_timeout,
            )
            .await?;
        Ok(())
    }

    /// Answer the incoming call
    pub async fn answer(&self) -> Result<(), ModemError> {
        self.channel.send("ATA").await?;
        self.set_audio(true);
        // Disarm the phantom-answer heuristic: this answer is real.
        self.session.set_expect_answer(true);
        Ok(())
    }

    /// Hang up one call by its list index
    pub async fn hangup(&self, index: i64) -> Result<(), ModemError> {
        self.channel.send(&format!("AT+CHLD=1{index}")).await?;
        Ok(())
    }

    /// Hang up the waiting or held calls
    pub async fn hangup_waiting_or_background(&self) -> Result<(), ModemError> {
        self.channel.send("AT+CHLD=0").await?;
        Ok(())
    }

    /// Hang up the active calls and resume the held ones
    pub async fn hangup_foreground_resume_background(&self) -> Result<(), ModemError> {
        self.channel.send("AT+CHLD=1").await?;
        Ok(())
    }

    /// Swap active and held calls, accepting a waiting call if there is
    /// one
    pub async fn switch_waiting_or_holding_and_active(&self) -> Result<(), ModemError> {
        self.channel.send("AT+CHLD=2").await?;
        self.session.set_expect_answer(true);
        Ok(())
    }

    /// Merge held and active calls into a conference
    pub async fn conference(&self) -> Result<(), ModemError> {
        self.channel.send("AT+CHLD=3").await?;
        Ok(())
    }

    /// Reject the waiting call as user-determined user busy
    pub async fn reject_waiting_call(&self) -> Result<(), ModemError> {
        self.channel.send("ATH").await?;
        Ok(())
    }

    /// Split one party out of the conference
    pub async fn separate_connection(&self, party: i64) -> Result<(), ModemError> {
        // AT+CHLD=2x only takes a single digit.
        if !(1..=9).contains(&party) {
            return Err(ModemError::NotSupported);
        }
        self.channel.send(&format!("AT+CHLD=2{party}")).await?;
        Ok(())
    }

    /// Send one DTMF tone in the active call
    pub async fn send_dtmf(&self, tone: char) -> Result<(), ModemError> {
        if !tone.is_ascii_alphanumeric() && !matches!(tone, '*' | '#') {
            return Err(ModemError::NotSupported);
        }
        self.channel.send(&format!("AT+VTS={tone}")).await?;
        Ok(())
    }

    pub(crate) fn set_audio(&self, enabled: bool) {
        if self.session.set_audio_on(enabled) {
            self.audio.set_enabled(enabled);
        }
    }
}
