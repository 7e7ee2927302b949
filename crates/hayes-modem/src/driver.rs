//! Driver assembly
//!
//! [`ModemDriver`] wires the command channel, the shared session, and
//! the platform collaborators together. Requests run as driver methods
//! on the caller's task; unsolicited traffic is routed on the reader
//! task and anything it cannot do there lands on the deferred queue,
//! serviced by [`ModemDriver::run`].

use std::sync::Arc;

use hayes_channel::{AtChannel, AtStream};
use hayes_protocol::AtResponse;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::calls::AudioPath;
use crate::causes::{call_fail_cause, data_fail_cause, CallFailCause, DataFailCause};
use crate::config::ModemConfig;
use crate::data::LinkLayer;
use crate::error::ModemError;
use crate::events::ModemEvent;
use crate::radio::RadioState;
use crate::session::ModemSession;
use crate::sms::SmsCodec;
use crate::unsolicited::UnsolicitedRouter;

/// Work the unsolicited router could not do on the reader task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredAction {
    /// Re-enumerate PDP contexts and tell the host what changed
    DataCallListRecheck,
    /// Emit a call-state notification after the configured delay,
    /// unless a poll acknowledged it first
    NotifyCallStateDelayed,
}

/// The telephony driver. One per modem.
pub struct ModemDriver {
    pub(crate) channel: Arc<AtChannel>,
    pub(crate) session: Arc<ModemSession>,
    pub(crate) link: Arc<dyn LinkLayer>,
    pub(crate) audio: Arc<dyn AudioPath>,
    pub(crate) config: ModemConfig,
    pub(crate) deferred_tx: mpsc::UnboundedSender<DeferredAction>,
    deferred_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DeferredAction>>,
}

impl ModemDriver {
    /// Build a driver over `stream` and hand back the event stream the
    /// host consumes. Spawns the channel's reader task; call
    /// [`ModemDriver::initialize`] next, then [`ModemDriver::run`] on
    /// its own task.
    pub fn new<S>(
        stream: S,
        config: ModemConfig,
        link: Arc<dyn LinkLayer>,
        audio: Arc<dyn AudioPath>,
        codec: Arc<dyn SmsCodec>,
    ) -> (Arc<ModemDriver>, mpsc::UnboundedReceiver<ModemEvent>)
    where
        S: AtStream + 'static,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (deferred_tx, deferred_rx) = mpsc::unbounded_channel();

        let session = Arc::new(ModemSession::new(config.technology, event_tx));
        let router = UnsolicitedRouter::new(
            session.clone(),
            deferred_tx.clone(),
            config.workarounds.clone(),
            codec,
        );
        let channel = Arc::new(AtChannel::open(stream, Box::new(router), config.channel.clone()));

        let driver = Arc::new(ModemDriver {
            channel,
            session,
            link,
            audio,
            config,
            deferred_tx,
            deferred_rx: tokio::sync::Mutex::new(deferred_rx),
        });
        (driver, event_rx)
    }

    pub fn radio_state(&self) -> RadioState {
        self.session.radio_state()
    }

    /// Watch radio state transitions
    pub fn watch_radio(&self) -> watch::Receiver<RadioState> {
        self.session.watch_radio()
    }

    /// Whether the transport has closed underneath the driver
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Why the most recent call-related command failed
    pub fn last_call_fail_cause(&self) -> CallFailCause {
        call_fail_cause(self.channel.last_cme_error())
    }

    /// Why the most recent data call setup failed
    pub fn last_data_fail_cause(&self) -> DataFailCause {
        data_fail_cause(self.channel.last_cme_error())
    }

    /// Service the deferred queue until the driver is dropped. Runs
    /// command exchanges, so it must live on its own task, not the
    /// reader's.
    pub async fn run(&self) {
        let mut deferred_rx = self.deferred_rx.lock().await;
        while let Some(action) = deferred_rx.recv().await {
            self.execute(action).await;
        }
    }

    /// Drain whatever is on the deferred queue right now, for hosts
    /// that drive the loop themselves instead of calling
    /// [`ModemDriver::run`]
    pub async fn process_deferred(&self) {
        let mut deferred_rx = self.deferred_rx.lock().await;
        while let Ok(action) = deferred_rx.try_recv() {
            self.execute(action).await;
        }
    }

    async fn execute(&self, action: DeferredAction) {
        match action {
            DeferredAction::DataCallListRecheck => {
                let list = match self.data_call_list().await {
                    Ok(list) => list,
                    Err(err) => {
                        // The host still needs to hear something
                        // changed; an empty list says assume the worst.
                        warn!(%err, "data call list recheck failed");
                        Vec::new()
                    }
                };
                self.session.emit(ModemEvent::DataCallListChanged(list));
            }
            DeferredAction::NotifyCallStateDelayed => {
                tokio::time::sleep(self.config.call_notify_delay).await;
                if self.session.call_notify_pending() {
                    self.session.emit(ModemEvent::CallStateChanged);
                }
            }
        }
    }
}

/// The report line a successful single-line or numeric exchange is
/// guaranteed to carry
pub(crate) fn first_line(response: &AtResponse) -> Result<&str, ModemError> {
    response
        .lines
        .first()
        .map(String::as_str)
        .ok_or_else(|| ModemError::InvalidResponse("missing report line".into()))
}
