//! Call-list (`+CLCC`) record parsing

use crate::error::ParseError;
use crate::tokenizer::Tokenizer;

/// State of one call as reported by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
}

impl CallState {
    fn from_code(code: i64) -> Result<CallState, ParseError> {
        match code {
            0 => Ok(CallState::Active),
            1 => Ok(CallState::Holding),
            2 => Ok(CallState::Dialing),
            3 => Ok(CallState::Alerting),
            4 => Ok(CallState::Incoming),
            5 => Ok(CallState::Waiting),
            other => Err(ParseError::MalformedLine(format!(
                "unknown call state {other}"
            ))),
        }
    }

    /// Active and Holding are stable; everything else is transitional
    /// and warrants a repoll.
    pub fn is_stable(&self) -> bool {
        matches!(self, CallState::Active | CallState::Holding)
    }
}

/// One call parsed from a `+CLCC:` intermediate line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Call slot index assigned by the modem
    pub index: i64,
    /// True when the call is mobile terminated (incoming)
    pub mobile_terminated: bool,
    pub state: CallState,
    /// Mode 0 is voice; data and fax calls are not reported to hosts
    pub is_voice: bool,
    pub multiparty: bool,
    /// Remote party number; firmware junk placeholders come back as `None`
    pub number: Option<String>,
    /// Type-of-address octet (145 international, 129 otherwise)
    pub address_type: i64,
}

/// Parse one `+CLCC:` line into a [`CallRecord`].
///
/// Format: `+CLCC: <index>,<mt>,<state>,<mode>,<mpty>[,<number>,<toa>]`.
/// Some firmware reports a placeholder string where the number should be;
/// anything that does not start with a dial character is dropped to `None`.
pub fn parse_call_record(line: &str) -> Result<CallRecord, ParseError> {
    let mut tok = Tokenizer::new(line)?;

    let index = tok.next_int()?;
    let mobile_terminated = tok.next_bool()?;
    let state = CallState::from_code(tok.next_int()?)?;
    let is_voice = tok.next_int()? == 0;
    let multiparty = tok.next_bool()?;

    let mut record = CallRecord {
        index,
        mobile_terminated,
        state,
        is_voice,
        multiparty,
        number: None,
        address_type: 0,
    };

    // The number and address type are optional as a pair.
    let number = match tok.next_str() {
        Ok(n) => n,
        Err(_) => return Ok(record),
    };
    record.address_type = tok.next_int()?;

    if number.starts_with(|c: char| c == '+' || c.is_ascii_digit()) {
        record.number = Some(number.to_owned());
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_record_parses() {
        let rec = parse_call_record("+CLCC: 1,1,4,0,0,\"+18005551212\",145").unwrap();
        assert_eq!(rec.index, 1);
        assert!(rec.mobile_terminated);
        assert_eq!(rec.state, CallState::Incoming);
        assert!(rec.is_voice);
        assert!(!rec.multiparty);
        assert_eq!(rec.number.as_deref(), Some("+18005551212"));
        assert_eq!(rec.address_type, 145);
    }

    #[test]
    fn record_without_number_parses() {
        let rec = parse_call_record("+CLCC: 2,0,0,0,1").unwrap();
        assert_eq!(rec.index, 2);
        assert!(!rec.mobile_terminated);
        assert_eq!(rec.state, CallState::Active);
        assert!(rec.multiparty);
        assert_eq!(rec.number, None);
    }

    #[test]
    fn junk_number_is_dropped() {
        let rec = parse_call_record("+CLCC: 1,0,2,0,0,\"RESTRICTED\",129").unwrap();
        assert_eq!(rec.number, None);
        assert_eq!(rec.address_type, 129);
    }

    #[test]
    fn data_call_is_not_voice() {
        let rec = parse_call_record("+CLCC: 1,0,0,1,0,\"\",129").unwrap();
        assert!(!rec.is_voice);
    }

    #[test]
    fn bad_state_code_is_an_error() {
        assert!(parse_call_record("+CLCC: 1,0,9,0,0").is_err());
    }

    #[test]
    fn parsing_is_idempotent() {
        let line = "+CLCC: 1,1,4,0,0,\"+31651234567\",145";
        let a = parse_call_record(line).unwrap();
        let b = parse_call_record(line).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stability_classification() {
        assert!(CallState::Active.is_stable());
        assert!(CallState::Holding.is_stable());
        assert!(!CallState::Dialing.is_stable());
        assert!(!CallState::Incoming.is_stable());
    }
}
