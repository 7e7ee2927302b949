//! AT Command Channel
//!
//! This crate owns the byte stream to a modem and turns it into two
//! clean interfaces:
//!
//! - **Command exchange**: [`AtChannel::submit`] and its typed wrappers
//!   write one command and await its complete response. Exchanges are
//!   strictly serialized; a response is never observed before all of
//!   its intermediate lines have accumulated.
//! - **Unsolicited traffic**: everything the modem says on its own
//!   (rings, registration changes, inbound SMS) is delivered to an
//!   [`UnsolicitedSink`] in arrival order, from a dedicated reader
//!   task.
//!
//! Transport closure fails the pending exchange, notifies the sink
//! exactly once, and pins the channel closed; every later submit fails
//! fast with [`ChannelError::Closed`].
//!
//! # Example
//!
//! ```rust,no_run
//! use hayes_channel::{AtChannel, ChannelConfig, Unsolicited, UnsolicitedSink};
//!
//! struct LogSink;
//!
//! impl UnsolicitedSink for LogSink {
//!     fn on_unsolicited(&mut self, unsolicited: Unsolicited) {
//!         println!("modem says: {}", unsolicited.line);
//!     }
//! }
//!
//! # async fn demo() -> Result<(), hayes_channel::ChannelError> {
//! let port = hayes_channel::open_serial("/dev/ttyUSB0", 115_200)?;
//! let channel = AtChannel::open(port, Box::new(LogSink), ChannelConfig::default());
//! channel.handshake().await?;
//! let response = channel.send_singleline("AT+CSQ", "+CSQ:").await?;
//! println!("signal: {:?}", response.lines);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod reader;
pub mod serial;

pub use channel::{AtChannel, AtStream, ChannelConfig};
pub use error::ChannelError;
pub use reader::{Unsolicited, UnsolicitedSink};
pub use serial::open_serial;
