//! Driver configuration

use std::time::Duration;

use hayes_channel::ChannelConfig;
use serde::{Deserialize, Serialize};

use crate::radio::TechnologyFamily;

/// Tuning for the telephony driver.
///
/// The defaults match well-behaved handset firmware; the bounded-retry
/// knobs exist because real modems lie, stall, and report calls that do
/// not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    /// Which ready state power-up settles into
    pub technology: TechnologyFamily,
    /// Command channel tuning
    pub channel: ChannelConfig,
    /// Firmware quirk handling
    pub workarounds: WorkaroundPolicy,

    /// SIM polls before an unready SIM is declared locked or absent
    pub sim_poll_attempts: u32,
    /// Delay between SIM polls
    pub sim_poll_interval: Duration,

    /// IMSI probes used to confirm a SIM that claims `READY`
    pub imsi_confirm_attempts: u32,
    /// Delay between IMSI probes
    pub imsi_confirm_interval: Duration,

    /// Local-address polls before a dialed data call is abandoned
    pub address_poll_attempts: u32,
    /// Delay between local-address polls
    pub address_poll_interval: Duration,

    /// Polls waiting for the link layer to stand down during teardown
    pub link_settle_attempts: u32,
    /// Delay between link-settle polls
    pub link_settle_interval: Duration,

    /// Bound on dial commands, which the modem may sit on far longer
    /// than the ordinary command timeout while the network answers
    pub dial_timeout: Duration,
    /// Delay before a deferred call-state notification fires
    pub call_notify_delay: Duration,
    /// Attempts for a registration status query that keeps failing
    pub registration_query_retries: u32,
    /// Network interface carrying data calls
    pub data_interface: String,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            technology: TechnologyFamily::Sim,
            channel: ChannelConfig::default(),
            workarounds: WorkaroundPolicy::default(),
            sim_poll_attempts: 30,
            sim_poll_interval: Duration::from_secs(1),
            imsi_confirm_attempts: 10,
            imsi_confirm_interval: Duration::from_secs(2),
            address_poll_attempts: 10,
            address_poll_interval: Duration::from_secs(1),
            link_settle_attempts: 10,
            link_settle_interval: Duration::from_secs(1),
            dial_timeout: Duration::from_secs(60),
            call_notify_delay: Duration::from_millis(500),
            registration_query_retries: 4,
            data_interface: "ppp0".to_owned(),
        }
    }
}

/// Knobs for known firmware quirks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkaroundPolicy {
    /// Bound on call-list repolls when the firmware reports a phantom
    /// answered call right after an incoming call vanishes
    pub max_erroneous_answer_repolls: u32,
    /// Some firmware reports a dropped PDP context as a bare CME error
    /// with this code instead of a `+CGEV` notification. `None`
    /// disables the workaround.
    pub fake_context_event_cme: Option<i64>,
}

impl Default for WorkaroundPolicy {
    fn default() -> Self {
        Self {
            max_erroneous_answer_repolls: 4,
            fake_context_event_cme: Some(150),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = ModemConfig::default();
        assert!(config.sim_poll_attempts > 0);
        assert!(config.address_poll_attempts > 0);
        assert!(config.link_settle_attempts > 0);
        assert!(config.dial_timeout > config.channel.command_timeout);
        assert_eq!(config.workarounds.max_erroneous_answer_repolls, 4);
        assert_eq!(config.workarounds.fake_context_event_cme, Some(150));
    }

    #[test]
    fn workarounds_can_be_disabled() {
        let policy = WorkaroundPolicy {
            max_erroneous_answer_repolls: 0,
            fake_context_event_cme: None,
        };
        assert_eq!(policy.fake_context_event_cme, None);
    }
}
