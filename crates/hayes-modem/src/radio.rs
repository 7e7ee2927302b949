//! Radio power-up, SIM readiness, and network status
//!
//! The radio state machine is the spine of the driver. Everything else
//! is gated on it:
//!
//! - `Unavailable` is where a session starts and where it ends when the
//!   transport closes.
//! - `Off` follows the initial configuration pass; the host decides
//!   when to power on.
//! - Powering on lands in the not-ready state for the configured
//!   technology family and settles, via bounded SIM polling, into
//!   `SimReady` or `SimLockedOrAbsent` (NV radios go straight to
//!   `NvReady`).
//!
//! Entering a state runs its setup commands, so a transition can chain:
//! power-on setup leads to SIM polling leads to the ready state and its
//! own setup pass.

use hayes_protocol::{CmeError, ParseError, Tokenizer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::{first_line, ModemDriver};
use crate::error::ModemError;
use crate::session::SignalReading;

/// Radio state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioState {
    /// Powered down by `AT+CFUN=0`
    Off,
    /// Not initialized yet, or the transport is gone
    Unavailable,
    /// Powered on, SIM still initializing
    SimNotReady,
    /// SIM needs a PIN or PUK, or there is no SIM
    SimLockedOrAbsent,
    /// Fully operational
    SimReady,
    /// Powered on, NV store still initializing
    NvNotReady,
    /// Fully operational, no SIM involved
    NvReady,
}

impl RadioState {
    /// Powered on and initialized far enough to take ordinary commands
    pub fn is_functional(self) -> bool {
        !matches!(self, RadioState::Off | RadioState::Unavailable)
    }

    /// One of the two terminal ready states
    pub fn is_ready(self) -> bool {
        matches!(self, RadioState::SimReady | RadioState::NvReady)
    }
}

/// Whether subscriber identity lives on a SIM or in NV memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TechnologyFamily {
    Sim,
    Nv,
}

impl TechnologyFamily {
    /// The state entered right after power-on
    pub fn not_ready_state(self) -> RadioState {
        match self {
            TechnologyFamily::Sim => RadioState::SimNotReady,
            TechnologyFamily::Nv => RadioState::NvNotReady,
        }
    }
}

/// Result of one SIM status probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStatus {
    Absent,
    NotReady,
    Ready,
    PinRequired,
    PukRequired,
    NetworkPersonalization,
}

/// Which registration domain to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationDomain {
    Voice,
    Packet,
}

/// Parsed registration status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    /// 3GPP 27.007 stat: 1 registered home, 5 registered roaming
    pub status: i64,
    pub lac: Option<i64>,
    pub cid: Option<i64>,
    /// Access technology, when the firmware reports a fifth field
    pub technology: Option<i64>,
}

impl RegistrationInfo {
    pub fn is_registered(&self) -> bool {
        self.status == 1 || self.status == 5
    }
}

/// Configuration pass run once after the radio is first forced off.
/// Failures of individual commands are tolerated; not every firmware
/// knows every one of these.
pub const INIT_COMMANDS: &[&str] = &[
    // reset, numeric result codes
    "ATZV0",
    "ATE0",
    "ATS0=0",
    "ATQ0",
    "ATX3",
    "AT&C1",
    "AT&D1",
    "AT+CMEE=1",
    "AT+CRC=1;+CR=1",
    "AT+FCLASS=0",
    "AT+CMGF=0",
    "AT+CSCS=\"HEX\"",
    "AT+CSSN=1,1",
    "AT+COLP=0",
    "AT+CCWA=1",
    "AT+CMUT=0",
    "AT+CLIR=0",
    "AT+CNMI=1,2,2,2,0",
    "AT+CGREG=1",
    "AT+CUSD=1",
    "AT+CLIP=1",
    "AT+CMOD=0",
];

/// Parse a `+CREG:`/`+CGREG:` body in any of the shapes firmware emits.
///
/// The field count decides the layout: `stat`, `n,stat`,
/// `stat,lac,cid`, `n,stat,lac,cid`, or `n,stat,lac,cid,tech`.
/// Location fields are hex, with or without quotes.
pub fn parse_registration(line: &str) -> Result<RegistrationInfo, ParseError> {
    let body = match line.find(':') {
        Some(idx) => &line[idx + 1..],
        None => line,
    };
    let commas = body.matches(',').count();
    let mut fields = Tokenizer::bare(body);

    let (status, hex_fields) = match commas {
        0 => (fields.next_int()?, false),
        1 => {
            fields.next_int()?;
            (fields.next_int()?, false)
        }
        2 => (fields.next_int()?, true),
        3 | 4 => {
            fields.next_int()?;
            (fields.next_int()?, true)
        }
        _ => return Err(ParseError::MalformedLine(line.to_owned())),
    };

    let mut info = RegistrationInfo {
        status,
        lac: None,
        cid: None,
        technology: None,
    };
    if hex_fields {
        info.lac = Some(parse_hex_field(fields.next_str()?)?);
        info.cid = Some(parse_hex_field(fields.next_str()?)?);
    }
    if commas == 4 {
        info.technology = Some(fields.next_int()?);
    }
    Ok(info)
}

fn parse_hex_field(field: &str) -> Result<i64, ParseError> {
    i64::from_str_radix(field, 16).map_err(|_| ParseError::InvalidInt(field.to_owned()))
}

impl ModemDriver {
    /// Handshake with the modem and run the initial configuration pass.
    /// Leaves the radio in [`RadioState::Off`]; power-on is the host's
    /// call.
    pub async fn initialize(&self) -> Result<(), ModemError> {
        self.channel.handshake().await?;

        // Force a known state before configuring anything.
        self.channel.send("AT+CFUN=0").await?;
        self.session.set_radio_state(RadioState::Off);

        for command in INIT_COMMANDS {
            let response = self.channel.send(command).await?;
            if !response.success {
                debug!(command, "init command rejected, continuing");
            }
        }

        // Prefer registration reports with location; fall back for
        // firmware that only takes the basic form.
        let response = self.channel.send("AT+CREG=2").await?;
        if !response.success {
            self.channel.send("AT+CREG=1").await?;
        }

        info!("modem initialized, radio off");
        Ok(())
    }

    /// Power the radio on or off. Powering on settles the state machine
    /// through SIM polling before returning.
    pub async fn radio_power(&self, on: bool) -> Result<(), ModemError> {
        let state = self.session.radio_state();
        if !on && state != RadioState::Off {
            let response = self.channel.send("AT+CFUN=0").await?;
            if !response.success {
                return Err(ModemError::Command(response.final_line));
            }
            self.transition(RadioState::Off).await?;
        } else if on && state == RadioState::Off {
            let response = self.channel.send("AT+CFUN=1").await?;
            if !response.success {
                // Some firmware rejects CFUN=1 when the radio is
                // already up; believe the query over the error.
                if !self.is_radio_on().await.unwrap_or(false) {
                    return Err(ModemError::Command(response.final_line));
                }
            }
            self.transition(self.session.technology().not_ready_state())
                .await?;
        }
        Ok(())
    }

    /// Query whether the radio is powered
    pub async fn is_radio_on(&self) -> Result<bool, ModemError> {
        let response = self.channel.send_singleline("AT+CFUN?", "+CFUN:").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        let mut fields = Tokenizer::new(first_line(&response)?)?;
        Ok(fields.next_bool()?)
    }

    /// Move the radio state machine, running each entered state's setup
    /// and following any state it settles into.
    pub(crate) async fn transition(&self, target: RadioState) -> Result<(), ModemError> {
        let mut next = Some(target);
        while let Some(state) = next.take() {
            let Some(entered) = self.session.set_radio_state(state) else {
                break;
            };
            next = self.on_state_entered(entered).await?;
        }
        Ok(())
    }

    async fn on_state_entered(&self, state: RadioState) -> Result<Option<RadioState>, ModemError> {
        match state {
            RadioState::SimNotReady => self.poll_sim_until_settled().await.map(Some),
            RadioState::NvNotReady => Ok(Some(RadioState::NvReady)),
            RadioState::SimReady | RadioState::NvReady => {
                self.ready_setup().await?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Commands that only make sense once the radio is fully up
    async fn ready_setup(&self) -> Result<(), ModemError> {
        // Automatic operator selection; cell broadcast on.
        for command in ["AT+COPS=0", "AT+CSCB=1"] {
            let response = self.channel.send(command).await?;
            if !response.success {
                debug!(command, "ready setup command rejected");
            }
        }
        // Phase 2+ SMS if the firmware offers it.
        let _ = self.channel.send_singleline("AT+CSMS=1", "+CSMS:").await;
        Ok(())
    }

    /// Poll the SIM until it leaves `NotReady`, bounded by
    /// configuration. A SIM that never settles is reported locked or
    /// absent rather than polled forever.
    async fn poll_sim_until_settled(&self) -> Result<RadioState, ModemError> {
        for _ in 0..self.config.sim_poll_attempts {
            if self.session.radio_state() != RadioState::SimNotReady {
                return Ok(self.session.radio_state());
            }
            match self.sim_status().await? {
                SimStatus::NotReady => {
                    tokio::time::sleep(self.config.sim_poll_interval).await;
                }
                SimStatus::Ready => return Ok(RadioState::SimReady),
                _ => return Ok(RadioState::SimLockedOrAbsent),
            }
        }
        warn!("SIM stuck in not-ready, giving up");
        Ok(RadioState::SimLockedOrAbsent)
    }

    /// One SIM status probe via `AT+CPIN?`.
    ///
    /// `READY` from the PIN query can race actual SIM initialization,
    /// so it is only believed once an IMSI read succeeds.
    pub async fn sim_status(&self) -> Result<SimStatus, ModemError> {
        if !self.session.radio_state().is_functional() {
            return Ok(SimStatus::NotReady);
        }

        let response = match self.channel.send_singleline("AT+CPIN?", "+CPIN:").await {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "PIN query failed");
                return Ok(SimStatus::NotReady);
            }
        };

        if !response.success {
            return Ok(match self.channel.last_cme_error() {
                Some(CmeError::SimNotInserted) => SimStatus::Absent,
                _ => SimStatus::NotReady,
            });
        }

        let body = first_line(&response)?
            .trim_start_matches("+CPIN:")
            .trim();
        match body {
            "SIM PIN" => Ok(SimStatus::PinRequired),
            "SIM PUK" => Ok(SimStatus::PukRequired),
            "PH-NET PIN" => Ok(SimStatus::NetworkPersonalization),
            "READY" => {
                if self.confirm_sim_ready().await? {
                    Ok(SimStatus::Ready)
                } else {
                    Ok(SimStatus::NotReady)
                }
            }
            other => {
                debug!(other, "unrecognized PIN state");
                Ok(SimStatus::Absent)
            }
        }
    }

    async fn confirm_sim_ready(&self) -> Result<bool, ModemError> {
        for attempt in 0..self.config.imsi_confirm_attempts {
            match self.channel.send_numeric("AT+CIMI").await {
                Ok(response) if response.success => return Ok(true),
                Ok(_) | Err(hayes_channel::ChannelError::InvalidResponse(_)) => {
                    debug!(attempt, "SIM claims ready but IMSI read failed");
                }
                Err(err) => return Err(err.into()),
            }
            tokio::time::sleep(self.config.imsi_confirm_interval).await;
        }
        Ok(false)
    }

    /// Unlock the SIM with its PIN, or set a new one via the PUK
    pub async fn enter_sim_pin(&self, pin: &str, new_pin: Option<&str>) -> Result<(), ModemError> {
        let command = match new_pin {
            Some(new) => format!("AT+CPIN=\"{pin}\",\"{new}\""),
            None => format!("AT+CPIN=\"{pin}\""),
        };
        let response = self.channel.send(&command).await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        self.transition(RadioState::SimReady).await
    }

    /// Query registration status in one domain, with bounded retries
    /// for firmware that intermittently errors the query
    pub async fn registration_state(
        &self,
        domain: RegistrationDomain,
    ) -> Result<RegistrationInfo, ModemError> {
        // A solicited query starts a fresh unsolicited dedup window.
        self.session.reset_registration_burst();

        let (command, prefix) = match domain {
            RegistrationDomain::Voice => ("AT+CREG?", "+CREG:"),
            RegistrationDomain::Packet => ("AT+CGREG?", "+CGREG:"),
        };

        let mut last_error = ModemError::InvalidResponse(format!("{command} never answered"));
        for _ in 0..self.config.registration_query_retries {
            match self.channel.send_singleline(command, prefix).await {
                Ok(response) if response.success => {
                    let info = parse_registration(first_line(&response)?)?;
                    self.session.set_registration_status(info.status);
                    return Ok(info);
                }
                Ok(response) => last_error = ModemError::Command(response.final_line),
                Err(hayes_channel::ChannelError::Closed) => {
                    return Err(hayes_channel::ChannelError::Closed.into())
                }
                Err(err) => last_error = err.into(),
            }
        }
        Err(last_error)
    }

    /// Current signal strength. An unsolicited report since the last
    /// query is consumed instead of bothering the modem again.
    pub async fn signal_strength(&self) -> Result<SignalReading, ModemError> {
        if let Some(cached) = self.session.take_signal() {
            return Ok(cached);
        }
        let response = self.channel.send_singleline("AT+CSQ", "+CSQ:").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        let mut fields = Tokenizer::new(first_line(&response)?)?;
        Ok(SignalReading {
            rssi: fields.next_int()?,
            ber: fields.next_int().unwrap_or(99),
        })
    }

    /// Subscriber identity from the SIM
    pub async fn imsi(&self) -> Result<String, ModemError> {
        let response = self.channel.send_numeric("AT+CIMI").await?;
        if !response.success {
            return Err(ModemError::RadioNotAvailable);
        }
        Ok(first_line(&response)?.to_owned())
    }

    /// Equipment identity
    pub async fn imei(&self) -> Result<String, ModemError> {
        let response = self.channel.send_numeric("AT+CGSN").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        Ok(first_line(&response)?.to_owned())
    }

    /// Firmware revision string
    pub async fn baseband_version(&self) -> Result<String, ModemError> {
        let response = self.channel.send_singleline("AT+CGMR", "").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        Ok(first_line(&response)?.to_owned())
    }

    /// Put operator selection back in automatic mode
    pub async fn set_network_selection_automatic(&self) -> Result<(), ModemError> {
        let response = self.channel.send("AT+COPS=0").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        Ok(())
    }

    /// Start a USSD session
    pub async fn send_ussd(&self, text: &str) -> Result<(), ModemError> {
        let command = format!("AT+CUSD=1,\"{text}\",15");
        let response = self.channel.send(&command).await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        Ok(())
    }

    /// Abort the USSD session in progress
    pub async fn cancel_ussd(&self) -> Result<(), ModemError> {
        let response = self.channel.send("AT+CUSD=2").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        Ok(())
    }

    /// Acknowledge receipt of an SMS delivered via unsolicited
    /// notification
    pub async fn acknowledge_sms(&self, received_ok: bool) -> Result<(), ModemError> {
        let command = if received_ok { "AT+CNMA=1" } else { "AT+CNMA=2" };
        let response = self.channel.send(command).await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_bare_status() {
        let info = parse_registration("+CREG: 1").unwrap();
        assert_eq!(info.status, 1);
        assert!(info.is_registered());
        assert_eq!(info.lac, None);
    }

    #[test]
    fn registration_mode_and_status() {
        let info = parse_registration("+CREG: 2,5").unwrap();
        assert_eq!(info.status, 5);
        assert!(info.is_registered());
    }

    #[test]
    fn registration_with_location() {
        let info = parse_registration("+CREG: 2,1,\"C3F0\",\"08A9\"").unwrap();
        assert_eq!(info.status, 1);
        assert_eq!(info.lac, Some(0xC3F0));
        assert_eq!(info.cid, Some(0x08A9));
    }

    #[test]
    fn registration_without_mode_but_with_location() {
        let info = parse_registration("+CGREG: 1,\"C3F0\",\"08A9\"").unwrap();
        assert_eq!(info.status, 1);
        assert_eq!(info.lac, Some(0xC3F0));
    }

    #[test]
    fn registration_with_access_technology() {
        let info = parse_registration("+CGREG: 2,1,\"C3F0\",\"08A9\",2").unwrap();
        assert_eq!(info.technology, Some(2));
    }

    #[test]
    fn searching_is_not_registered() {
        let info = parse_registration("+CREG: 2,2").unwrap();
        assert!(!info.is_registered());
    }

    #[test]
    fn garbage_registration_line_is_rejected() {
        assert!(parse_registration("+CREG: 1,2,3,4,5,6").is_err());
        assert!(parse_registration("+CREG: no").is_err());
    }

    #[test]
    fn not_ready_state_follows_family() {
        assert_eq!(
            TechnologyFamily::Sim.not_ready_state(),
            RadioState::SimNotReady
        );
        assert_eq!(TechnologyFamily::Nv.not_ready_state(), RadioState::NvNotReady);
    }
}
