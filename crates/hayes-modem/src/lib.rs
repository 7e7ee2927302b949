//! Telephony driver over an AT command channel
//!
//! This crate turns a [`hayes_channel::AtChannel`] into a phone:
//!
//! - **Radio state machine**: power-up sequencing, bounded SIM
//!   readiness polling, and hard gating of requests against the current
//!   state ([`radio`], [`dispatch`]).
//! - **Voice calls**: dial, answer, hold and conference control, and a
//!   call poll that absorbs firmware quirks ([`calls`]).
//! - **Data calls**: PDP context lifecycle with the platform link layer
//!   behind a trait ([`data`]).
//! - **Unsolicited routing**: everything the modem volunteers becomes a
//!   [`ModemEvent`] on one ordered stream ([`events`]).
//!
//! Hosts either call driver methods directly or go through the numbered
//! request vocabulary in [`dispatch`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hayes_modem::{
//!     FsLinkLayer, HostRequest, ModemConfig, ModemDriver, NullAudioPath, RawPduCodec,
//! };
//!
//! # async fn demo() -> Result<(), hayes_modem::ModemError> {
//! let port = hayes_channel::open_serial("/dev/ttyUSB0", 115_200)?;
//! let link = Arc::new(FsLinkLayer::new(
//!     "/run/ppp/control",
//!     "/run/ppp/address",
//!     "/sys/class/net/ppp0/operstate",
//! ));
//! let (driver, mut events) =
//!     ModemDriver::new(port, ModemConfig::default(), link, Arc::new(NullAudioPath), Arc::new(RawPduCodec));
//!
//! driver.initialize().await?;
//! let worker = driver.clone();
//! tokio::spawn(async move { worker.run().await });
//!
//! driver.handle(HostRequest::RadioPower { on: true }).await;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod calls;
pub mod causes;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod events;
pub mod radio;
pub mod session;
pub mod sms;
mod unsolicited;

pub use calls::{AudioPath, ClirMode, NullAudioPath};
pub use causes::{CallFailCause, DataFailCause};
pub use config::{ModemConfig, WorkaroundPolicy};
pub use data::{DataCallInfo, DataCallState, FsLinkLayer, LinkLayer, DATA_CALL_CID};
pub use dispatch::{HostRequest, RequestCode, RequestOutcome, ResponsePayload, ResultCode};
pub use driver::ModemDriver;
pub use error::ModemError;
pub use events::ModemEvent;
pub use radio::{
    RadioState, RegistrationDomain, RegistrationInfo, SimStatus, TechnologyFamily,
};
pub use session::SignalReading;
pub use sms::{RawPduCodec, SmsCodec, SmsMessage};
