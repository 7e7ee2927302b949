//! The command channel
//!
//! One [`AtChannel`] wraps one byte stream to a modem. The stream is
//! split on open: the read half goes to a spawned reader task that
//! frames lines and routes them (see [`crate::reader`]); the write half
//! stays here behind an async mutex that doubles as the in-flight
//! token. Holding the lock across the whole exchange is what
//! serializes commands; there is never more than one outstanding.
//!
//! The reader task must never submit commands. A submit from that task
//! would block on a response only the same task could deliver, so it is
//! rejected up front with [`ChannelError::ReaderContext`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use hayes_protocol::{parse_cme_error, AtResponse, CmeError, CommandShape};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ChannelError;
use crate::reader::{self, UnsolicitedSink};

/// Byte stream a channel can run over: a serial port in production, an
/// in-memory duplex in tests
pub trait AtStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AtStream for T {}

/// Channel tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Bound on one command exchange, from write to terminal line
    pub command_timeout: Duration,
    /// Bound on a single handshake probe
    pub handshake_timeout: Duration,
    /// How many handshake probes to attempt before giving up
    pub handshake_retries: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_millis(250),
            handshake_retries: 8,
        }
    }
}

/// State shared between the channel handle and its reader task
pub(crate) struct Shared {
    /// The command exchange in flight, if any
    pub(crate) pending: Mutex<Option<Pending>>,
    /// Set once the transport goes away; never unset
    pub(crate) closed: AtomicBool,
    /// Task id of the reader, for the wrong-context check
    pub(crate) reader_task: OnceLock<tokio::task::Id>,
    /// Structured error from the most recent failed exchange
    pub(crate) last_cme: Mutex<Option<CmeError>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
            reader_task: OnceLock::new(),
            last_cme: Mutex::new(None),
        }
    }
}

/// One in-flight command exchange
pub(crate) struct Pending {
    /// The submitted line, for echo suppression
    pub(crate) command: String,
    pub(crate) shape: CommandShape,
    pub(crate) prefix: Option<String>,
    /// Intermediates accumulated so far
    pub(crate) lines: Vec<String>,
    /// Fired when the SMS `> ` prompt arrives
    pub(crate) prompt_tx: Option<oneshot::Sender<()>>,
    /// Completed with the full response on the terminal line
    pub(crate) done_tx: oneshot::Sender<AtResponse>,
}

/// Handle for one AT command channel
pub struct AtChannel {
    writer: tokio::sync::Mutex<WriteHalf<Box<dyn AtStream>>>,
    shared: Arc<Shared>,
    config: ChannelConfig,
}

impl AtChannel {
    /// Open a channel over `stream`.
    ///
    /// Spawns the reader task; unsolicited lines and the closure
    /// notification go to `sink`, which runs on the reader task and
    /// therefore must not submit commands.
    pub fn open<S>(stream: S, sink: Box<dyn UnsolicitedSink>, config: ChannelConfig) -> AtChannel
    where
        S: AtStream + 'static,
    {
        let boxed: Box<dyn AtStream> = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);
        let shared = Arc::new(Shared::new());

        tokio::spawn(reader::run_reader(read_half, shared.clone(), sink));

        AtChannel {
            writer: tokio::sync::Mutex::new(write_half),
            shared,
            config,
        }
    }

    /// Whether the transport has closed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Structured `+CME ERROR` code from the most recent failed
    /// exchange, if the modem reported one
    pub fn last_cme_error(&self) -> Option<CmeError> {
        *self.shared.last_cme.lock().unwrap()
    }

    /// Submit one command and await its full response.
    ///
    /// An error final still returns `Ok`: the response carries
    /// `success = false` and the caller decides what failure means.
    /// `Err` is reserved for the channel itself misbehaving (closure,
    /// timeout, shape violation).
    pub async fn submit(
        &self,
        command: &str,
        shape: CommandShape,
        prefix: Option<&str>,
    ) -> Result<AtResponse, ChannelError> {
        self.exchange(command, None, shape, prefix, self.config.command_timeout)
            .await
    }

    /// [`AtChannel::submit`] with an explicit timeout, for commands the
    /// modem is allowed to sit on (dialing, context activation)
    pub async fn submit_with_timeout(
        &self,
        command: &str,
        shape: CommandShape,
        prefix: Option<&str>,
        timeout: Duration,
    ) -> Result<AtResponse, ChannelError> {
        self.exchange(command, None, shape, prefix, timeout).await
    }

    /// Command expecting only a final line
    pub async fn send(&self, command: &str) -> Result<AtResponse, ChannelError> {
        self.submit(command, CommandShape::NoResult, None).await
    }

    /// Command expecting a single numeric intermediate
    pub async fn send_numeric(&self, command: &str) -> Result<AtResponse, ChannelError> {
        self.submit(command, CommandShape::Numeric, None).await
    }

    /// Command expecting exactly one prefixed intermediate
    pub async fn send_singleline(
        &self,
        command: &str,
        prefix: &str,
    ) -> Result<AtResponse, ChannelError> {
        self.submit(command, CommandShape::SingleLine, Some(prefix))
            .await
    }

    /// Command expecting zero or more prefixed intermediates
    pub async fn send_multiline(
        &self,
        command: &str,
        prefix: &str,
    ) -> Result<AtResponse, ChannelError> {
        self.submit(command, CommandShape::MultiLine, Some(prefix))
            .await
    }

    /// SMS submission: send `command`, wait for the `> ` prompt, then
    /// send the PDU terminated with CTRL-Z
    pub async fn send_sms(
        &self,
        command: &str,
        pdu: &str,
        prefix: &str,
    ) -> Result<AtResponse, ChannelError> {
        self.exchange(
            command,
            Some(pdu),
            CommandShape::SingleLine,
            Some(prefix),
            self.config.command_timeout,
        )
        .await
    }

    /// Probe the modem with bounded empty `AT` commands until one
    /// answers, for a device that may still be waking up
    pub async fn handshake(&self) -> Result<(), ChannelError> {
        for attempt in 0..self.config.handshake_retries {
            match self
                .exchange(
                    "AT",
                    None,
                    CommandShape::NoResult,
                    None,
                    self.config.handshake_timeout,
                )
                .await
            {
                Ok(response) if response.success => {
                    debug!(attempt, "handshake complete");
                    return Ok(());
                }
                Ok(_) | Err(ChannelError::Timeout(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(ChannelError::Generic("handshake failed".into()))
    }

    async fn exchange(
        &self,
        command: &str,
        pdu: Option<&str>,
        shape: CommandShape,
        prefix: Option<&str>,
        timeout: Duration,
    ) -> Result<AtResponse, ChannelError> {
        if let (Some(current), Some(reader)) =
            (tokio::task::try_id(), self.shared.reader_task.get())
        {
            if current == *reader {
                return Err(ChannelError::ReaderContext);
            }
        }
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        // The write-half lock is the in-flight token. It is held until
        // this function returns, on every path.
        let mut writer = self.writer.lock().await;

        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let (done_tx, mut done_rx) = oneshot::channel();
        let (prompt_tx, prompt_rx) = oneshot::channel();
        {
            let mut slot = self.shared.pending.lock().unwrap();
            if slot.is_some() {
                return Err(ChannelError::CommandPending);
            }
            *slot = Some(Pending {
                command: command.to_owned(),
                shape,
                prefix: prefix.map(str::to_owned),
                lines: Vec::new(),
                prompt_tx: Some(prompt_tx),
                done_tx,
            });
        }

        debug!(command, "submit");
        let written = async {
            writer.write_all(command.as_bytes()).await?;
            writer.write_all(b"\r").await?;
            writer.flush().await
        }
        .await;
        if let Err(err) = written {
            self.shared.pending.lock().unwrap().take();
            return Err(err.into());
        }

        if let Some(pdu) = pdu {
            match tokio::time::timeout(timeout, prompt_rx).await {
                Ok(Ok(())) => {
                    let written = async {
                        writer.write_all(pdu.as_bytes()).await?;
                        writer.write_all(&[0x1a]).await?;
                        writer.flush().await
                    }
                    .await;
                    if let Err(err) = written {
                        self.shared.pending.lock().unwrap().take();
                        return Err(err.into());
                    }
                }
                // The prompt sender dropped without firing: the modem
                // rejected the command with a final line instead of the
                // prompt, and the failed response is already sitting in
                // done_rx. Actual closure also lands here and falls out
                // below when done_rx errors too.
                Ok(Err(_)) => {}
                Err(_) => {
                    self.shared.pending.lock().unwrap().take();
                    return Err(ChannelError::Timeout(timeout.as_millis() as u64));
                }
            }
        }

        let response = match tokio::time::timeout(timeout, &mut done_rx).await {
            Ok(Ok(response)) => response,
            // The reader dropped the pending exchange: closure.
            Ok(Err(_)) => return Err(ChannelError::Closed),
            Err(_) => {
                let stale = self.shared.pending.lock().unwrap().take();
                if stale.is_some() {
                    return Err(ChannelError::Timeout(timeout.as_millis() as u64));
                }
                // The final line raced the timeout; the response is
                // already in the oneshot.
                match done_rx.try_recv() {
                    Ok(response) => response,
                    Err(_) => return Err(ChannelError::Closed),
                }
            }
        };

        *self.shared.last_cme.lock().unwrap() = if response.success {
            None
        } else {
            parse_cme_error(&response.final_line)
        };

        // A shape that promises an intermediate must deliver one, even
        // under an OK final. Firmware that answers bare OK where a
        // report line belongs is broken and the caller needs to know.
        if response.success
            && matches!(shape, CommandShape::Numeric | CommandShape::SingleLine)
            && response.lines.is_empty()
        {
            return Err(ChannelError::InvalidResponse(format!(
                "no intermediate line in response to {command}"
            )));
        }

        Ok(response)
    }
}
