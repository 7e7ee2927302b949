//! Failure cause reporting
//!
//! After a dial or a data call setup fails, the host asks why. The
//! answer is derived from the structured `+CME ERROR` code the channel
//! recorded for the failed exchange; everything unmapped collapses to
//! an unspecified cause.

use hayes_protocol::CmeError;
use serde::{Deserialize, Serialize};

/// Why the last voice call ended or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallFailCause {
    Normal,
    Busy,
    Congestion,
    CallBarred,
    FdnBlocked,
    CdmaNotEmergency,
    ImsiUnknownInVlr,
    ImeiNotAccepted,
    ErrorUnspecified,
}

/// Why the last data call setup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFailCause {
    None,
    NsapiInUse,
    ServiceOptionNotSupported,
    ServiceOptionNotSubscribed,
    ServiceOptionOutOfOrder,
    OperatorBarred,
    UserAuthentication,
    ActivationRejectGgsn,
    ActivationRejectUnspecified,
    RegistrationFail,
    InsufficientResources,
    GprsRegistrationFail,
    ErrorUnspecified,
}

/// Map the recorded CME code of a failed dial to a call fail cause.
/// No recorded code means the network ended the call normally.
pub fn call_fail_cause(cme: Option<CmeError>) -> CallFailCause {
    use CmeError::*;
    match cme {
        None => CallFailCause::Normal,
        Some(PhoneIsBusy) => CallFailCause::Busy,
        Some(NetworkTimeout) => CallFailCause::Congestion,
        Some(OperationNotAllowed) | Some(OperationNotSupported) | Some(CallBarred) => {
            CallFailCause::CallBarred
        }
        Some(PlmnNotAllowed) | Some(LocationAreaNotAllowed) | Some(RoamingNotAllowed) => {
            CallFailCause::FdnBlocked
        }
        Some(NetworkNotAllowed) => CallFailCause::CdmaNotEmergency,
        Some(IllegalMs) => CallFailCause::ImsiUnknownInVlr,
        Some(IllegalMe) => CallFailCause::ImeiNotAccepted,
        Some(_) => CallFailCause::ErrorUnspecified,
    }
}

/// Map the recorded CME code of a failed data call setup to a PDP fail
/// cause
pub fn data_fail_cause(cme: Option<CmeError>) -> DataFailCause {
    use CmeError::*;
    match cme {
        None => DataFailCause::None,
        Some(PhoneAdaptorLinkReserved) => DataFailCause::NsapiInUse,
        Some(ServiceOptionNotSupported) | Some(OperationNotSupported) => {
            DataFailCause::ServiceOptionNotSupported
        }
        Some(RequestedServiceOptionNotSubscribed) => DataFailCause::ServiceOptionNotSubscribed,
        Some(ServiceOptionTemporarilyOutOfOrder) => DataFailCause::ServiceOptionOutOfOrder,
        Some(OperationNotAllowed) | Some(NetworkNotAllowed) => DataFailCause::OperatorBarred,
        Some(PdpAuthenticationFailure) => DataFailCause::UserAuthentication,
        Some(IllegalMs) | Some(IllegalMe) | Some(GprsServicesNotAllowed) => {
            DataFailCause::OperatorBarred
        }
        Some(PlmnNotAllowed) | Some(LocationAreaNotAllowed) | Some(RoamingNotAllowed) => {
            DataFailCause::ActivationRejectGgsn
        }
        Some(TemporaryNotAllowed) => DataFailCause::ActivationRejectUnspecified,
        Some(PhoneFailure) | Some(NoConnectionToPhone) | Some(NoNetworkService)
        | Some(NetworkTimeout) => DataFailCause::RegistrationFail,
        Some(MemoryFailure) => DataFailCause::InsufficientResources,
        Some(InvalidMobileClass) => DataFailCause::GprsRegistrationFail,
        Some(_) => DataFailCause::ErrorUnspecified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_busy() {
        assert_eq!(call_fail_cause(Some(CmeError::PhoneIsBusy)), CallFailCause::Busy);
    }

    #[test]
    fn clean_exchange_is_a_normal_end() {
        assert_eq!(call_fail_cause(None), CallFailCause::Normal);
        assert_eq!(data_fail_cause(None), DataFailCause::None);
    }

    #[test]
    fn roaming_restrictions_reject_activation() {
        assert_eq!(
            data_fail_cause(Some(CmeError::RoamingNotAllowed)),
            DataFailCause::ActivationRejectGgsn
        );
    }

    #[test]
    fn unknown_codes_are_unspecified() {
        assert_eq!(
            call_fail_cause(Some(CmeError::Unknown(777))),
            CallFailCause::ErrorUnspecified
        );
        assert_eq!(
            data_fail_cause(Some(CmeError::Unknown(777))),
            DataFailCause::ErrorUnspecified
        );
    }
}
