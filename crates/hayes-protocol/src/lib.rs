//! AT Command Grammar
//!
//! This crate provides the line-level grammar shared by the transport
//! channel and the telephony state machine:
//!
//! - **Response framing**: command shapes, final-line classification
//!   (verbose and V0 numeric result codes), intermediate matching
//! - **Tokenizer**: comma-separated fields of a response line, with
//!   quoted strings and `strtol`-style integer parsing
//! - **Structured errors**: `+CME ERROR` code enumeration
//! - **Call records**: `+CLCC` line parsing with junk-number scrubbing
//!
//! Everything here is pure: no I/O, no state. The same line always
//! parses to the same value.
//!
//! # Example
//!
//! ```rust
//! use hayes_protocol::{classify_final, parse_call_record, CallState, FinalKind};
//!
//! assert_eq!(classify_final("OK"), Some(FinalKind::Success));
//!
//! let call = parse_call_record("+CLCC: 1,1,4,0,0,\"+18005551212\",145").unwrap();
//! assert_eq!(call.state, CallState::Incoming);
//! assert_eq!(call.number.as_deref(), Some("+18005551212"));
//! ```

pub mod calls;
pub mod error;
pub mod response;
pub mod tokenizer;

pub use calls::{parse_call_record, CallRecord, CallState};
pub use error::{parse_cme_error, CmeError, ParseError};
pub use response::{
    classify_final, is_intermediate, is_sms_notification_prefix, AtResponse, CommandShape,
    FinalKind,
};
pub use tokenizer::Tokenizer;
