//! Host request dispatch
//!
//! Hosts speak a numbered request vocabulary. Every request goes
//! through the same path: radio-state gating first, then a lookup
//! table from request code to handler. Handlers translate driver
//! errors into the host's result codes; a host never sees a Rust
//! error, only a [`ResultCode`] and an optional payload.

use std::future::Future;
use std::pin::Pin;

use hayes_protocol::CallRecord;
use tracing::debug;

use crate::calls::ClirMode;
use crate::causes::{CallFailCause, DataFailCause};
use crate::data::DataCallInfo;
use crate::driver::ModemDriver;
use crate::error::ModemError;
use crate::radio::{RadioState, RegistrationDomain, RegistrationInfo, SimStatus};
use crate::session::SignalReading;

/// Request vocabulary, with the wire numbering hosts use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestCode {
    GetSimStatus = 1,
    EnterSimPin = 2,
    GetCurrentCalls = 9,
    Dial = 10,
    GetImsi = 11,
    Hangup = 12,
    HangupWaitingOrBackground = 13,
    HangupForegroundResumeBackground = 14,
    SwitchWaitingOrHoldingAndActive = 15,
    Conference = 16,
    Udub = 17,
    LastCallFailCause = 18,
    SignalStrength = 19,
    VoiceRegistrationState = 20,
    DataRegistrationState = 21,
    RadioPower = 23,
    Dtmf = 24,
    SendSms = 25,
    SetupDataCall = 27,
    SendUssd = 29,
    CancelUssd = 30,
    SmsAcknowledge = 37,
    GetImei = 38,
    Answer = 40,
    DeactivateDataCall = 41,
    SetNetworkSelectionAutomatic = 46,
    BasebandVersion = 51,
    SeparateConnection = 52,
    LastDataCallFailCause = 56,
    DataCallList = 57,
}

/// One host request with its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    GetSimStatus,
    EnterSimPin {
        pin: String,
        new_pin: Option<String>,
    },
    GetCurrentCalls,
    Dial {
        number: String,
        clir: ClirMode,
    },
    GetImsi,
    Hangup {
        index: i64,
    },
    HangupWaitingOrBackground,
    HangupForegroundResumeBackground,
    SwitchWaitingOrHoldingAndActive,
    Conference,
    Udub,
    LastCallFailCause,
    SignalStrength,
    VoiceRegistrationState,
    DataRegistrationState,
    RadioPower {
        on: bool,
    },
    Dtmf {
        tone: char,
    },
    SendSms {
        smsc: Option<String>,
        pdu: String,
    },
    SetupDataCall {
        apn: String,
    },
    SendUssd {
        text: String,
    },
    CancelUssd,
    SmsAcknowledge {
        received_ok: bool,
    },
    GetImei,
    Answer,
    DeactivateDataCall {
        cid: i64,
    },
    SetNetworkSelectionAutomatic,
    BasebandVersion,
    SeparateConnection {
        party: i64,
    },
    LastDataCallFailCause,
    DataCallList,
}

impl HostRequest {
    pub fn code(&self) -> RequestCode {
        match self {
            HostRequest::GetSimStatus => RequestCode::GetSimStatus,
            HostRequest::EnterSimPin { .. } => RequestCode::EnterSimPin,
            HostRequest::GetCurrentCalls => RequestCode::GetCurrentCalls,
            HostRequest::Dial { .. } => RequestCode::Dial,
            HostRequest::GetImsi => RequestCode::GetImsi,
            HostRequest::Hangup { .. } => RequestCode::Hangup,
            HostRequest::HangupWaitingOrBackground => RequestCode::HangupWaitingOrBackground,
            HostRequest::HangupForegroundResumeBackground => {
                RequestCode::HangupForegroundResumeBackground
            }
            HostRequest::SwitchWaitingOrHoldingAndActive => {
                RequestCode::SwitchWaitingOrHoldingAndActive
            }
            HostRequest::Conference => RequestCode::Conference,
            HostRequest::Udub => RequestCode::Udub,
            HostRequest::LastCallFailCause => RequestCode::LastCallFailCause,
            HostRequest::SignalStrength => RequestCode::SignalStrength,
            HostRequest::VoiceRegistrationState => RequestCode::VoiceRegistrationState,
            HostRequest::DataRegistrationState => RequestCode::DataRegistrationState,
            HostRequest::RadioPower { .. } => RequestCode::RadioPower,
            HostRequest::Dtmf { .. } => RequestCode::Dtmf,
            HostRequest::SendSms { .. } => RequestCode::SendSms,
            HostRequest::SetupDataCall { .. } => RequestCode::SetupDataCall,
            HostRequest::SendUssd { .. } => RequestCode::SendUssd,
            HostRequest::CancelUssd => RequestCode::CancelUssd,
            HostRequest::SmsAcknowledge { .. } => RequestCode::SmsAcknowledge,
            HostRequest::GetImei => RequestCode::GetImei,
            HostRequest::Answer => RequestCode::Answer,
            HostRequest::DeactivateDataCall { .. } => RequestCode::DeactivateDataCall,
            HostRequest::SetNetworkSelectionAutomatic => {
                RequestCode::SetNetworkSelectionAutomatic
            }
            HostRequest::BasebandVersion => RequestCode::BasebandVersion,
            HostRequest::SeparateConnection { .. } => RequestCode::SeparateConnection,
            HostRequest::LastDataCallFailCause => RequestCode::LastDataCallFailCause,
            HostRequest::DataCallList => RequestCode::DataCallList,
        }
    }
}

/// Result code reported back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    GenericFailure,
    RadioNotAvailable,
    PasswordIncorrect,
    ModeNotSupported,
    RequestNotSupported,
    OpNotAllowedBeforeRegistration,
}

/// Typed response payload, when a request has one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    None,
    SimStatus(SimStatus),
    Calls(Vec<CallRecord>),
    Text(String),
    Signal(SignalReading),
    Registration(RegistrationInfo),
    DataCall(DataCallInfo),
    DataCalls(Vec<DataCallInfo>),
    CallFailCause(CallFailCause),
    DataFailCause(DataFailCause),
    MessageReference(i64),
}

/// What the host gets back for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub result: ResultCode,
    pub payload: ResponsePayload,
}

impl RequestOutcome {
    fn ok(payload: ResponsePayload) -> Self {
        Self {
            result: ResultCode::Success,
            payload,
        }
    }

    fn fail(result: ResultCode) -> Self {
        Self {
            result,
            payload: ResponsePayload::None,
        }
    }
}

/// Whether `code` is refused outright in radio state `state`.
///
/// Identity and SIM status queries work even before the radio is up;
/// power control additionally works while the radio is off; the
/// firmware version is always answerable.
fn gated(state: RadioState, code: RequestCode) -> bool {
    use RequestCode::*;
    if matches!(code, BasebandVersion) {
        return false;
    }
    match state {
        RadioState::Unavailable => !matches!(code, GetSimStatus | GetImei),
        RadioState::Off => !matches!(code, GetSimStatus | GetImei | RadioPower),
        _ => false,
    }
}

fn result_for(err: &ModemError) -> ResultCode {
    match err {
        ModemError::RadioNotAvailable => ResultCode::RadioNotAvailable,
        ModemError::NotSupported => ResultCode::RequestNotSupported,
        ModemError::NotRegistered => ResultCode::OpNotAllowedBeforeRegistration,
        ModemError::Channel(hayes_channel::ChannelError::Closed) => ResultCode::RadioNotAvailable,
        _ => ResultCode::GenericFailure,
    }
}

fn outcome_unit(result: Result<(), ModemError>) -> RequestOutcome {
    match result {
        Ok(()) => RequestOutcome::ok(ResponsePayload::None),
        Err(err) => {
            debug!(%err, "request failed");
            RequestOutcome::fail(result_for(&err))
        }
    }
}

fn outcome_with(
    result: Result<ResponsePayload, ModemError>,
) -> RequestOutcome {
    match result {
        Ok(payload) => RequestOutcome::ok(payload),
        Err(err) => {
            debug!(%err, "request failed");
            RequestOutcome::fail(result_for(&err))
        }
    }
}

fn mismatch(request: &HostRequest) -> RequestOutcome {
    debug!(?request, "request parameters do not match its code");
    RequestOutcome::fail(ResultCode::GenericFailure)
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = RequestOutcome> + Send + 'a>>;
type Handler = for<'a> fn(&'a ModemDriver, HostRequest) -> HandlerFuture<'a>;

/// Request code to handler. Linear scan; the table is small and cold.
const HANDLERS: &[(RequestCode, Handler)] = &[
    (RequestCode::GetSimStatus, get_sim_status),
    (RequestCode::EnterSimPin, enter_sim_pin),
    (RequestCode::GetCurrentCalls, get_current_calls),
    (RequestCode::Dial, dial),
    (RequestCode::GetImsi, get_imsi),
    (RequestCode::Hangup, hangup),
    (RequestCode::HangupWaitingOrBackground, hangup_waiting),
    (
        RequestCode::HangupForegroundResumeBackground,
        hangup_foreground,
    ),
    (
        RequestCode::SwitchWaitingOrHoldingAndActive,
        switch_waiting,
    ),
    (RequestCode::Conference, conference),
    (RequestCode::Udub, udub),
    (RequestCode::LastCallFailCause, last_call_fail_cause),
    (RequestCode::SignalStrength, signal_strength),
    (RequestCode::VoiceRegistrationState, voice_registration),
    (RequestCode::DataRegistrationState, data_registration),
    (RequestCode::RadioPower, radio_power),
    (RequestCode::Dtmf, dtmf),
    (RequestCode::SendSms, send_sms),
    (RequestCode::SetupDataCall, setup_data_call),
    (RequestCode::SendUssd, send_ussd),
    (RequestCode::CancelUssd, cancel_ussd),
    (RequestCode::SmsAcknowledge, sms_acknowledge),
    (RequestCode::GetImei, get_imei),
    (RequestCode::Answer, answer),
    (RequestCode::DeactivateDataCall, deactivate_data_call),
    (
        RequestCode::SetNetworkSelectionAutomatic,
        network_selection_automatic,
    ),
    (RequestCode::BasebandVersion, baseband_version),
    (RequestCode::SeparateConnection, separate_connection),
    (RequestCode::LastDataCallFailCause, last_data_fail_cause),
    (RequestCode::DataCallList, data_call_list),
];

fn handler_for(code: RequestCode) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(entry, _)| *entry == code)
        .map(|(_, handler)| *handler)
}

impl ModemDriver {
    /// Dispatch one host request
    pub async fn handle(&self, request: HostRequest) -> RequestOutcome {
        let code = request.code();
        if gated(self.radio_state(), code) {
            return RequestOutcome::fail(ResultCode::RadioNotAvailable);
        }
        match handler_for(code) {
            Some(handler) => handler(self, request).await,
            None => RequestOutcome::fail(ResultCode::RequestNotSupported),
        }
    }
}

fn get_sim_status(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        outcome_with(driver.sim_status().await.map(ResponsePayload::SimStatus))
    })
}

fn enter_sim_pin(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::EnterSimPin { pin, new_pin } = &request else {
            return mismatch(&request);
        };
        match driver.enter_sim_pin(pin, new_pin.as_deref()).await {
            Ok(()) => RequestOutcome::ok(ResponsePayload::None),
            Err(ModemError::Command(_)) => {
                RequestOutcome::fail(ResultCode::PasswordIncorrect)
            }
            Err(err) => RequestOutcome::fail(result_for(&err)),
        }
    })
}

fn get_current_calls(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_with(driver.poll_calls().await.map(ResponsePayload::Calls)) })
}

fn dial(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::Dial { number, clir } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.dial(number, *clir).await)
    })
}

fn get_imsi(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_with(driver.imsi().await.map(ResponsePayload::Text)) })
}

fn hangup(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::Hangup { index } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.hangup(*index).await)
    })
}

fn hangup_waiting(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.hangup_waiting_or_background().await) })
}

fn hangup_foreground(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.hangup_foreground_resume_background().await) })
}

fn switch_waiting(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.switch_waiting_or_holding_and_active().await) })
}

fn conference(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.conference().await) })
}

fn udub(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.reject_waiting_call().await) })
}

fn last_call_fail_cause(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        RequestOutcome::ok(ResponsePayload::CallFailCause(driver.last_call_fail_cause()))
    })
}

fn signal_strength(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        outcome_with(driver.signal_strength().await.map(ResponsePayload::Signal))
    })
}

fn voice_registration(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        outcome_with(
            driver
                .registration_state(RegistrationDomain::Voice)
                .await
                .map(ResponsePayload::Registration),
        )
    })
}

fn data_registration(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        outcome_with(
            driver
                .registration_state(RegistrationDomain::Packet)
                .await
                .map(ResponsePayload::Registration),
        )
    })
}

fn radio_power(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::RadioPower { on } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.radio_power(*on).await)
    })
}

fn dtmf(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::Dtmf { tone } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.send_dtmf(*tone).await)
    })
}

fn send_sms(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::SendSms { smsc, pdu } = &request else {
            return mismatch(&request);
        };
        outcome_with(
            driver
                .send_sms(smsc.as_deref(), pdu)
                .await
                .map(ResponsePayload::MessageReference),
        )
    })
}

fn setup_data_call(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::SetupDataCall { apn } = &request else {
            return mismatch(&request);
        };
        outcome_with(
            driver
                .setup_data_call(apn)
                .await
                .map(ResponsePayload::DataCall),
        )
    })
}

fn send_ussd(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::SendUssd { text } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.send_ussd(text).await)
    })
}

fn cancel_ussd(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.cancel_ussd().await) })
}

fn sms_acknowledge(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::SmsAcknowledge { received_ok } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.acknowledge_sms(*received_ok).await)
    })
}

fn get_imei(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_with(driver.imei().await.map(ResponsePayload::Text)) })
}

fn answer(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.answer().await) })
}

fn deactivate_data_call(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::DeactivateDataCall { cid } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.teardown_data_call(*cid).await)
    })
}

fn network_selection_automatic(
    driver: &ModemDriver,
    _request: HostRequest,
) -> HandlerFuture<'_> {
    Box::pin(async move { outcome_unit(driver.set_network_selection_automatic().await) })
}

fn baseband_version(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        outcome_with(driver.baseband_version().await.map(ResponsePayload::Text))
    })
}

fn separate_connection(driver: &ModemDriver, request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        let HostRequest::SeparateConnection { party } = &request else {
            return mismatch(&request);
        };
        outcome_unit(driver.separate_connection(*party).await)
    })
}

fn last_data_fail_cause(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        RequestOutcome::ok(ResponsePayload::DataFailCause(driver.last_data_fail_cause()))
    })
}

fn data_call_list(driver: &ModemDriver, _request: HostRequest) -> HandlerFuture<'_> {
    Box::pin(async move {
        outcome_with(
            driver
                .data_call_list()
                .await
                .map(ResponsePayload::DataCalls),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseband_version_is_never_gated() {
        for state in [
            RadioState::Unavailable,
            RadioState::Off,
            RadioState::SimReady,
        ] {
            assert!(!gated(state, RequestCode::BasebandVersion));
        }
    }

    #[test]
    fn identity_queries_work_before_the_radio_is_up() {
        assert!(!gated(RadioState::Unavailable, RequestCode::GetSimStatus));
        assert!(!gated(RadioState::Unavailable, RequestCode::GetImei));
        assert!(gated(RadioState::Unavailable, RequestCode::Dial));
        assert!(gated(RadioState::Unavailable, RequestCode::RadioPower));
    }

    #[test]
    fn power_control_works_while_off() {
        assert!(!gated(RadioState::Off, RequestCode::RadioPower));
        assert!(gated(RadioState::Off, RequestCode::GetCurrentCalls));
        assert!(gated(RadioState::Off, RequestCode::SetupDataCall));
    }

    #[test]
    fn functional_states_gate_nothing() {
        for code in [
            RequestCode::Dial,
            RequestCode::SetupDataCall,
            RequestCode::SendSms,
        ] {
            assert!(!gated(RadioState::SimReady, code));
            assert!(!gated(RadioState::SimLockedOrAbsent, code));
        }
    }

    #[test]
    fn every_request_code_has_a_handler() {
        let requests = [
            HostRequest::GetSimStatus,
            HostRequest::GetCurrentCalls,
            HostRequest::LastCallFailCause,
            HostRequest::DataCallList,
            HostRequest::RadioPower { on: true },
            HostRequest::SendSms {
                smsc: None,
                pdu: String::new(),
            },
        ];
        for request in requests {
            assert!(handler_for(request.code()).is_some());
        }
    }
}
