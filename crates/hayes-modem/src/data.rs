//! Packet data call lifecycle
//!
//! A data call is half modem, half platform: the modem activates a PDP
//! context and switches the line to data mode, then a link layer
//! (PPP daemon, kernel interface) has to come up around it. The driver
//! owns the ordering and the bounded waits; the platform side hides
//! behind [`LinkLayer`].
//!
//! The state machine is deliberately small: `Off`, `Terminated` (link
//! going down), `Dialing` (context activated, waiting for an address),
//! `Connected`. Unsolicited drops move `Dialing` to `Terminated` so a
//! setup in progress notices and aborts.

use std::io;
use std::path::PathBuf;

use hayes_protocol::{CommandShape, Tokenizer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::ModemDriver;
use crate::error::ModemError;

/// PDP context id used for the single supported data call
pub const DATA_CALL_CID: i64 = 1;

/// Data call state, ordered by how alive the call is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataCallState {
    Off,
    Terminated,
    Dialing,
    Connected,
}

/// One entry of the data call list
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataCallInfo {
    pub cid: i64,
    pub active: bool,
    pub pdp_type: String,
    pub apn: String,
    pub address: String,
    /// Network interface the call rides on
    pub interface: String,
}

/// Platform side of a data call.
///
/// Implementations must be cheap to poll; the driver calls
/// [`LinkLayer::local_address`] and [`LinkLayer::is_operational`] in
/// bounded wait loops.
pub trait LinkLayer: Send + Sync {
    /// Bring the link up or down around an activated context
    fn set_link(&self, up: bool) -> io::Result<()>;
    /// Local address once the link has one. `0.0.0.0` counts as not
    /// yet.
    fn local_address(&self) -> Option<String>;
    /// Whether the platform link is still standing
    fn is_operational(&self) -> bool;
}

/// Link layer driven through the filesystem: a control file taking
/// `1`/`0`, an address file, and a marker whose existence means the
/// link is operational
pub struct FsLinkLayer {
    control_path: PathBuf,
    address_path: PathBuf,
    marker_path: PathBuf,
}

impl FsLinkLayer {
    pub fn new(
        control_path: impl Into<PathBuf>,
        address_path: impl Into<PathBuf>,
        marker_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            control_path: control_path.into(),
            address_path: address_path.into(),
            marker_path: marker_path.into(),
        }
    }
}

impl LinkLayer for FsLinkLayer {
    fn set_link(&self, up: bool) -> io::Result<()> {
        info!(up, "data link");
        std::fs::write(&self.control_path, if up { "1" } else { "0" })
    }

    fn local_address(&self) -> Option<String> {
        let text = std::fs::read_to_string(&self.address_path).ok()?;
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_owned())
        }
    }

    fn is_operational(&self) -> bool {
        self.marker_path.exists()
    }
}

/// Parse one `+CGACT:` line into `(cid, active)`
fn parse_cgact(line: &str) -> Result<(i64, bool), hayes_protocol::ParseError> {
    let mut fields = Tokenizer::new(line)?;
    Ok((fields.next_int()?, fields.next_bool()?))
}

/// Parse one `+CGDCONT:` line into `(cid, pdp_type, apn, address)`
fn parse_cgdcont(line: &str) -> Result<(i64, String, String, String), hayes_protocol::ParseError> {
    let mut fields = Tokenizer::new(line)?;
    let cid = fields.next_int()?;
    let pdp_type = fields.next_str()?.to_owned();
    let apn = fields.next_str()?.to_owned();
    let address = fields
        .next_str()
        .map(str::to_owned)
        .unwrap_or_default();
    Ok((cid, pdp_type, apn, address))
}

/// A hangup-style final on a context command means the context was
/// already gone, which is the outcome we wanted.
fn is_carrier_lost_final(final_line: &str) -> bool {
    final_line == "3" || final_line.starts_with("NO CARRIER")
}

impl ModemDriver {
    /// Bring up the data call on `apn`.
    ///
    /// Any previous call is torn down first. Returns once the link has
    /// a real local address; gives up after the configured number of
    /// address polls or as soon as an unsolicited drop moves the call
    /// out of `Dialing`.
    pub async fn setup_data_call(&self, apn: &str) -> Result<DataCallInfo, ModemError> {
        self.teardown_data_call(DATA_CALL_CID).await?;

        let context = format!("AT+CGDCONT={DATA_CALL_CID},\"IP\",\"{apn}\",,0,0");
        for command in [
            context.as_str(),
            "AT+CGQREQ=1",
            "AT+CGQMIN=1",
            "AT+CGEREP=1,0",
        ] {
            let response = self.channel.send(command).await?;
            if !response.success {
                debug!(command, "context setup command rejected, continuing");
            }
        }

        self.session.set_data_state(DataCallState::Dialing);
        self.channel
            .send(&format!("AT+CGACT=0,{DATA_CALL_CID}"))
            .await?;

        // Context activation can sit on the line well past the ordinary
        // command timeout before CONNECT.
        let response = self
            .channel
            .submit_with_timeout(
                "ATD*99***1#",
                CommandShape::NoResult,
                None,
                self.config.dial_timeout,
            )
            .await?;
        if !response.success {
            self.session.set_data_state(DataCallState::Off);
            return Err(ModemError::Command(response.final_line));
        }

        if let Err(err) = self.link.set_link(true) {
            self.session.set_data_state(DataCallState::Off);
            return Err(err.into());
        }

        let address = match self.wait_for_address().await {
            Some(address) => address,
            None => {
                let _ = self.link.set_link(false);
                self.session.set_data_state(DataCallState::Off);
                return Err(ModemError::Command("data call never got an address".into()));
            }
        };

        // An unsolicited drop may have raced us here; it wins.
        if !self
            .session
            .advance_data_state(DataCallState::Dialing, DataCallState::Connected)
        {
            let _ = self.link.set_link(false);
            self.session.set_data_state(DataCallState::Off);
            return Err(ModemError::Command("data call dropped during setup".into()));
        }

        info!(apn, address, "data call up");
        Ok(DataCallInfo {
            cid: DATA_CALL_CID,
            active: true,
            pdp_type: "IP".to_owned(),
            apn: apn.to_owned(),
            address,
            interface: self.config.data_interface.clone(),
        })
    }

    async fn wait_for_address(&self) -> Option<String> {
        for _ in 0..self.config.address_poll_attempts {
            tokio::time::sleep(self.config.address_poll_interval).await;
            if self.session.data_state() != DataCallState::Dialing {
                return None;
            }
            if let Some(address) = self.link.local_address() {
                if address != "0.0.0.0" {
                    return Some(address);
                }
            }
        }
        None
    }

    /// Tear down the data call on `cid`.
    ///
    /// Idempotent: with the call already off this exchanges nothing
    /// with the modem. A `NO CARRIER` answer to the deactivation counts
    /// as success, the context being gone is the point.
    pub async fn teardown_data_call(&self, cid: i64) -> Result<(), ModemError> {
        if self.session.data_state() == DataCallState::Off {
            return Ok(());
        }

        if self.link.is_operational() {
            if self.session.data_state() > DataCallState::Terminated {
                self.session.set_data_state(DataCallState::Terminated);
                self.link.set_link(false)?;
            }
            let mut settled = false;
            for _ in 0..self.config.link_settle_attempts {
                if !self.link.is_operational() {
                    settled = true;
                    break;
                }
                tokio::time::sleep(self.config.link_settle_interval).await;
            }
            if !settled {
                warn!("link layer refused to stand down");
                return Err(ModemError::Command("link layer still operational".into()));
            }
        }

        let response = self.channel.send(&format!("AT+CGACT=0,{cid}")).await?;
        if !response.success && !is_carrier_lost_final(&response.final_line) {
            return Err(ModemError::Command(response.final_line));
        }

        self.session.set_data_state(DataCallState::Off);
        Ok(())
    }

    /// Enumerate PDP contexts, cross-referencing activation state with
    /// context definitions. Context lines for unknown cids are skipped;
    /// contexts with no definition keep empty type and APN.
    pub async fn data_call_list(&self) -> Result<Vec<DataCallInfo>, ModemError> {
        let response = self.channel.send_multiline("AT+CGACT?", "+CGACT:").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }

        let mut list = Vec::new();
        for line in &response.lines {
            match parse_cgact(line) {
                Ok((cid, active)) => list.push(DataCallInfo {
                    cid,
                    active,
                    interface: self.config.data_interface.clone(),
                    ..DataCallInfo::default()
                }),
                Err(err) => debug!(%err, line, "skipping unparseable context state"),
            }
        }

        let response = self
            .channel
            .send_multiline("AT+CGDCONT?", "+CGDCONT:")
            .await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        for line in &response.lines {
            match parse_cgdcont(line) {
                Ok((cid, pdp_type, apn, address)) => {
                    if let Some(entry) = list.iter_mut().find(|entry| entry.cid == cid) {
                        entry.pdp_type = pdp_type;
                        entry.apn = apn;
                        entry.address = address;
                    }
                }
                Err(err) => debug!(%err, line, "skipping unparseable context definition"),
            }
        }

        // The modem may keep reporting the context active after the
        // platform link died; what the link layer shows wins.
        if let Some(first) = list.first_mut() {
            if !self.link.is_operational() || self.session.data_state() < DataCallState::Connected
            {
                first.active = false;
            }
        }

        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgact_line_parses() {
        assert_eq!(parse_cgact("+CGACT: 1,1").unwrap(), (1, true));
        assert_eq!(parse_cgact("+CGACT: 2,0").unwrap(), (2, false));
        assert!(parse_cgact("+CGACT: x").is_err());
    }

    #[test]
    fn cgdcont_line_parses() {
        let (cid, pdp_type, apn, address) =
            parse_cgdcont("+CGDCONT: 1,\"IP\",\"internet\",\"10.0.0.2\",0,0").unwrap();
        assert_eq!(cid, 1);
        assert_eq!(pdp_type, "IP");
        assert_eq!(apn, "internet");
        assert_eq!(address, "10.0.0.2");
    }

    #[test]
    fn cgdcont_line_without_address() {
        let (_, _, apn, address) = parse_cgdcont("+CGDCONT: 1,\"IP\",\"internet\"").unwrap();
        assert_eq!(apn, "internet");
        assert_eq!(address, "");
    }

    #[test]
    fn carrier_lost_finals() {
        assert!(is_carrier_lost_final("3"));
        assert!(is_carrier_lost_final("NO CARRIER"));
        assert!(!is_carrier_lost_final("4"));
        assert!(!is_carrier_lost_final("ERROR"));
    }

    #[test]
    fn data_states_order_by_liveness() {
        assert!(DataCallState::Off < DataCallState::Terminated);
        assert!(DataCallState::Dialing < DataCallState::Connected);
    }
}
