//! Events pushed up to the host
//!
//! Everything the modem volunteers on its own, after routing and state
//! bookkeeping, becomes a [`ModemEvent`] on the driver's event channel.
//! Events are delivered in the order the underlying lines arrived.

use crate::data::DataCallInfo;
use crate::radio::RadioState;
use crate::session::SignalReading;
use crate::sms::SmsMessage;

/// One notification for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// The radio state machine moved
    RadioStateChanged(RadioState),
    /// The set of current calls may have changed; poll to find out
    CallStateChanged,
    /// An incoming call is ringing
    CallRing,
    /// A waiting call was announced
    CallWaiting,
    /// Network registration may have changed; query to find out
    NetworkStateChanged,
    /// The data call list changed. An empty list means the change could
    /// not be enumerated and the host should assume everything dropped.
    DataCallListChanged(Vec<DataCallInfo>),
    /// Fresh signal strength figures
    SignalStrength(SignalReading),
    /// Network time, as `<time><tz>[,<dst>]`
    NitzTimeReceived(String),
    /// New incoming SMS. The raw PDU is always present; the decoded
    /// form is best-effort from the codec collaborator.
    NewSms {
        pdu: String,
        decoded: Option<SmsMessage>,
    },
    /// SMS status report
    NewSmsStatusReport { pdu: String },
    /// Unstructured supplementary service notification
    Ussd { kind: u8, text: Option<String> },
}
