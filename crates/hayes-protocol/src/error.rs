//! Error types for AT response parsing

use thiserror::Error;

/// Errors that can occur while parsing AT response lines
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line does not start with the expected prefix
    #[error("missing prefix in line: {0}")]
    MissingPrefix(String),

    /// Expected another comma-separated field
    #[error("missing field in line")]
    MissingField,

    /// Field could not be parsed as an integer
    #[error("invalid integer field: {0}")]
    InvalidInt(String),

    /// Field could not be parsed as a boolean (0/1)
    #[error("invalid boolean field: {0}")]
    InvalidBool(String),

    /// Line has the right prefix but malformed contents
    #[error("malformed line: {0}")]
    MalformedLine(String),
}

/// Structured modem error reported on a `+CME ERROR: <n>` final line.
///
/// Unknown codes are preserved rather than collapsed so failure-cause
/// mapping can still distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmeError {
    PhoneFailure,
    NoConnectionToPhone,
    PhoneAdaptorLinkReserved,
    OperationNotAllowed,
    OperationNotSupported,
    PhSimPinRequired,
    SimNotInserted,
    SimPinRequired,
    SimPukRequired,
    SimFailure,
    SimBusy,
    SimWrong,
    IncorrectPassword,
    SimPin2Required,
    SimPuk2Required,
    MemoryFull,
    InvalidIndex,
    NotFound,
    MemoryFailure,
    TextStringTooLong,
    InvalidCharactersInTextString,
    DialStringTooLong,
    InvalidCharactersInDialString,
    NoNetworkService,
    NetworkTimeout,
    NetworkNotAllowed,
    NetworkPersonalizationPinRequired,
    NetworkPersonalizationPukRequired,
    UnknownError,
    IllegalMs,
    IllegalMe,
    GprsServicesNotAllowed,
    PlmnNotAllowed,
    LocationAreaNotAllowed,
    RoamingNotAllowed,
    TemporaryNotAllowed,
    ServiceOptionNotSupported,
    RequestedServiceOptionNotSubscribed,
    ServiceOptionTemporarilyOutOfOrder,
    UnspecifiedGprsError,
    PdpAuthenticationFailure,
    InvalidMobileClass,
    OperationTemporarilyNotAllowed,
    CallBarred,
    PhoneIsBusy,
    UserAbort,
    InvalidDialString,
    SsNotExecuted,
    SimBlocked,
    SimPoweredDown,
    /// Any code without a named variant
    Unknown(i64),
}

impl CmeError {
    /// Map a numeric CME code to its variant
    pub fn from_code(code: i64) -> CmeError {
        use CmeError::*;
        match code {
            0 => PhoneFailure,
            1 => NoConnectionToPhone,
            2 => PhoneAdaptorLinkReserved,
            3 => OperationNotAllowed,
            4 => OperationNotSupported,
            5 => PhSimPinRequired,
            10 => SimNotInserted,
            11 => SimPinRequired,
            12 => SimPukRequired,
            13 => SimFailure,
            14 => SimBusy,
            15 => SimWrong,
            16 => IncorrectPassword,
            17 => SimPin2Required,
            18 => SimPuk2Required,
            20 => MemoryFull,
            21 => InvalidIndex,
            22 => NotFound,
            23 => MemoryFailure,
            24 => TextStringTooLong,
            25 => InvalidCharactersInTextString,
            26 => DialStringTooLong,
            27 => InvalidCharactersInDialString,
            30 => NoNetworkService,
            31 => NetworkTimeout,
            32 => NetworkNotAllowed,
            40 => NetworkPersonalizationPinRequired,
            41 => NetworkPersonalizationPukRequired,
            100 => UnknownError,
            103 => IllegalMs,
            106 => IllegalMe,
            107 => GprsServicesNotAllowed,
            111 => PlmnNotAllowed,
            112 => LocationAreaNotAllowed,
            113 => RoamingNotAllowed,
            126 => TemporaryNotAllowed,
            132 => ServiceOptionNotSupported,
            133 => RequestedServiceOptionNotSubscribed,
            134 => ServiceOptionTemporarilyOutOfOrder,
            148 => UnspecifiedGprsError,
            149 => PdpAuthenticationFailure,
            150 => InvalidMobileClass,
            256 => OperationTemporarilyNotAllowed,
            257 => CallBarred,
            258 => PhoneIsBusy,
            259 => UserAbort,
            260 => InvalidDialString,
            261 => SsNotExecuted,
            262 => SimBlocked,
            772 => SimPoweredDown,
            other => Unknown(other),
        }
    }

    /// The numeric code this variant maps back to
    pub fn code(&self) -> i64 {
        use CmeError::*;
        match self {
            PhoneFailure => 0,
            NoConnectionToPhone => 1,
            PhoneAdaptorLinkReserved => 2,
            OperationNotAllowed => 3,
            OperationNotSupported => 4,
            PhSimPinRequired => 5,
            SimNotInserted => 10,
            SimPinRequired => 11,
            SimPukRequired => 12,
            SimFailure => 13,
            SimBusy => 14,
            SimWrong => 15,
            IncorrectPassword => 16,
            SimPin2Required => 17,
            SimPuk2Required => 18,
            MemoryFull => 20,
            InvalidIndex => 21,
            NotFound => 22,
            MemoryFailure => 23,
            TextStringTooLong => 24,
            InvalidCharactersInTextString => 25,
            DialStringTooLong => 26,
            InvalidCharactersInDialString => 27,
            NoNetworkService => 30,
            NetworkTimeout => 31,
            NetworkNotAllowed => 32,
            NetworkPersonalizationPinRequired => 40,
            NetworkPersonalizationPukRequired => 41,
            UnknownError => 100,
            IllegalMs => 103,
            IllegalMe => 106,
            GprsServicesNotAllowed => 107,
            PlmnNotAllowed => 111,
            LocationAreaNotAllowed => 112,
            RoamingNotAllowed => 113,
            TemporaryNotAllowed => 126,
            ServiceOptionNotSupported => 132,
            RequestedServiceOptionNotSubscribed => 133,
            ServiceOptionTemporarilyOutOfOrder => 134,
            UnspecifiedGprsError => 148,
            PdpAuthenticationFailure => 149,
            InvalidMobileClass => 150,
            OperationTemporarilyNotAllowed => 256,
            CallBarred => 257,
            PhoneIsBusy => 258,
            UserAbort => 259,
            InvalidDialString => 260,
            SsNotExecuted => 261,
            SimBlocked => 262,
            SimPoweredDown => 772,
            Unknown(code) => *code,
        }
    }
}

/// Extract the structured error from a `+CME ERROR: <n>` final line.
///
/// Returns `None` for any other final (plain `ERROR`, numeric `4`,
/// `NO CARRIER`, ...); those carry no code to extract.
pub fn parse_cme_error(final_line: &str) -> Option<CmeError> {
    let rest = final_line.strip_prefix("+CME ERROR:")?;
    let rest = rest.trim();
    rest.parse::<i64>().ok().map(CmeError::from_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cme_code_round_trips_named_variants() {
        for code in [0, 10, 16, 100, 107, 132, 149, 150, 772] {
            assert_eq!(CmeError::from_code(code).code(), code);
        }
    }

    #[test]
    fn unknown_code_is_preserved() {
        assert_eq!(CmeError::from_code(9999), CmeError::Unknown(9999));
        assert_eq!(CmeError::Unknown(9999).code(), 9999);
    }

    #[test]
    fn parse_cme_error_from_final_line() {
        assert_eq!(
            parse_cme_error("+CME ERROR: 10"),
            Some(CmeError::SimNotInserted)
        );
        assert_eq!(parse_cme_error("+CME ERROR:16"), Some(CmeError::IncorrectPassword));
        assert_eq!(parse_cme_error("ERROR"), None);
        assert_eq!(parse_cme_error("4"), None);
        assert_eq!(parse_cme_error("+CME ERROR: junk"), None);
    }
}
