//! Response framing: command shapes, final-line classification, and the
//! accumulated response handed back to the command issuer.
//!
//! The grammar is line oriented. Every command exchange ends with exactly
//! one *final* line; everything between the echo and the final line is
//! either an intermediate line belonging to the command or an unsolicited
//! notification that happened to interleave. Which lines count as
//! intermediates depends on the [`CommandShape`] the issuer declared.
//!
//! Modems configured for numeric result codes (`ATV0`) report finals as
//! bare digits, so `0`/`1` succeed and `3`/`4`/`6`/`7`/`8` fail alongside
//! their verbose spellings.

/// Expected response shape for a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandShape {
    /// Final line only; anything before it is unsolicited
    NoResult,
    /// A single intermediate that starts with a decimal digit
    Numeric,
    /// A single intermediate starting with a caller-supplied prefix
    SingleLine,
    /// Zero or more intermediates starting with the prefix
    MultiLine,
}

/// Whether a final line reports success or failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalKind {
    Success,
    Error,
}

/// Accumulated outcome of one command exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponse {
    /// True when the final line is a success final
    pub success: bool,
    /// The terminal line verbatim
    pub final_line: String,
    /// Intermediate lines in arrival order
    pub lines: Vec<String>,
}

impl AtResponse {
    pub fn new(final_line: String, lines: Vec<String>) -> Self {
        let success = matches!(classify_final(&final_line), Some(FinalKind::Success));
        AtResponse {
            success,
            final_line,
            lines,
        }
    }
}

const SUCCESS_FINALS: &[&str] = &["OK", "CONNECT", "0", "1"];
const ERROR_FINALS: &[&str] = &[
    "ERROR",
    "+CMS ERROR:",
    "+CME ERROR:",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
    "BUSY",
    "3",
    "4",
    "6",
    "7",
    "8",
];

fn matches_final(line: &str, pattern: &str) -> bool {
    // Numeric result codes must match exactly or "0" would claim any
    // intermediate that happens to start with a zero.
    if pattern.len() == 1 && pattern.as_bytes()[0].is_ascii_digit() {
        line == pattern
    } else {
        line.starts_with(pattern)
    }
}

/// Classify a line as a final result code, or `None` if it is not one
pub fn classify_final(line: &str) -> Option<FinalKind> {
    if SUCCESS_FINALS.iter().any(|p| matches_final(line, p)) {
        return Some(FinalKind::Success);
    }
    if ERROR_FINALS.iter().any(|p| matches_final(line, p)) {
        return Some(FinalKind::Error);
    }
    None
}

/// True for unsolicited prefixes that are followed by a PDU line
/// (`+CMT:` new message, `+CDS:` status report)
pub fn is_sms_notification_prefix(line: &str) -> bool {
    line.starts_with("+CMT:") || line.starts_with("+CDS:")
}

/// Whether a line counts as an intermediate for the given shape
pub fn is_intermediate(line: &str, shape: CommandShape, prefix: Option<&str>) -> bool {
    match shape {
        CommandShape::NoResult => false,
        CommandShape::Numeric => line.as_bytes().first().is_some_and(u8::is_ascii_digit),
        CommandShape::SingleLine | CommandShape::MultiLine => {
            prefix.is_some_and(|p| line.starts_with(p))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_finals_classify() {
        assert_eq!(classify_final("OK"), Some(FinalKind::Success));
        assert_eq!(classify_final("CONNECT 9600"), Some(FinalKind::Success));
        assert_eq!(classify_final("ERROR"), Some(FinalKind::Error));
        assert_eq!(classify_final("+CME ERROR: 10"), Some(FinalKind::Error));
        assert_eq!(classify_final("+CMS ERROR: 500"), Some(FinalKind::Error));
        assert_eq!(classify_final("NO CARRIER"), Some(FinalKind::Error));
        assert_eq!(classify_final("BUSY"), Some(FinalKind::Error));
    }

    #[test]
    fn numeric_finals_need_exact_match() {
        assert_eq!(classify_final("0"), Some(FinalKind::Success));
        assert_eq!(classify_final("1"), Some(FinalKind::Success));
        assert_eq!(classify_final("3"), Some(FinalKind::Error));
        assert_eq!(classify_final("4"), Some(FinalKind::Error));
        // A numeric intermediate is not a final
        assert_eq!(classify_final("0,1,2"), None);
        assert_eq!(classify_final("42"), None);
    }

    #[test]
    fn non_finals_classify_none() {
        assert_eq!(classify_final("+CLCC: 1,0,0,0,0"), None);
        assert_eq!(classify_final("RING"), None);
        assert_eq!(classify_final(""), None);
    }

    #[test]
    fn intermediate_matching_follows_shape() {
        assert!(is_intermediate("42,99", CommandShape::Numeric, None));
        assert!(!is_intermediate("+CSQ: 20,0", CommandShape::Numeric, None));
        assert!(is_intermediate(
            "+CSQ: 20,0",
            CommandShape::SingleLine,
            Some("+CSQ:")
        ));
        assert!(!is_intermediate(
            "+CREG: 1",
            CommandShape::SingleLine,
            Some("+CSQ:")
        ));
        assert!(!is_intermediate("anything", CommandShape::NoResult, None));
    }

    #[test]
    fn response_success_tracks_final_kind() {
        let ok = AtResponse::new("OK".into(), vec![]);
        assert!(ok.success);
        let err = AtResponse::new("+CME ERROR: 100".into(), vec![]);
        assert!(!err.success);
    }

    #[test]
    fn sms_prefixes_detected() {
        assert!(is_sms_notification_prefix("+CMT: ,24"));
        assert!(is_sms_notification_prefix("+CDS: 25"));
        assert!(!is_sms_notification_prefix("+CMTI: \"SM\",1"));
    }
}
