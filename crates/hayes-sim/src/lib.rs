//! AT Modem Simulation
//!
//! A scripted modem that speaks the AT line grammar over one end of an
//! in-memory duplex stream, so the channel and the telephony state
//! machine can be tested without physical hardware.
//!
//! The script is an expectation queue: each step names the exact
//! command line the host is expected to send next and the reply lines
//! the modem answers with. Unscripted commands are answered with
//! `ERROR`. Spontaneous lines (RING, network events) are injected
//! through a [`SimHandle`] at any time.
//!
//! # Example
//!
//! ```rust,no_run
//! use hayes_sim::ScriptedModem;
//!
//! let (stream, handle) = ScriptedModem::new()
//!     .expect("ATE0", &["OK"])
//!     .expect("AT+CLCC", &["+CLCC: 1,1,4,0,0", "OK"])
//!     .spawn();
//!
//! handle.inject("RING");
//! // hand `stream` to the channel under test
//! ```

pub mod modem;

pub use modem::{ScriptStep, ScriptedModem, ScriptedModemConfig, SimHandle};
