//! Reader task: byte stream to framed lines, lines to their consumers
//!
//! Lines terminate with CR or LF, empties are skipped. Every framed
//! line goes one of three ways. With no command pending, everything is
//! unsolicited. With a command pending, finals are checked first (a
//! numeric intermediate like `0,1,2` must not be mistaken for the `0`
//! final, which only matches exactly), then shape-directed intermediate
//! matching, and whatever is left is unsolicited traffic that
//! interleaved with the exchange.
//!
//! The SMS `> ` prompt arrives without a terminator and is matched on
//! the raw partial buffer. Two-part notifications (`+CMT:`/`+CDS:`)
//! hold the header line until the PDU line follows.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use hayes_protocol::{classify_final, is_intermediate, is_sms_notification_prefix, AtResponse};
use tokio::io::{AsyncReadExt, ReadHalf};
use tracing::{debug, warn};

use crate::channel::{AtStream, Shared};

/// One unsolicited notification from the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsolicited {
    /// The notification line verbatim
    pub line: String,
    /// The PDU line for two-part notifications
    pub pdu: Option<String>,
}

/// Consumer of unsolicited traffic.
///
/// Runs on the reader task. Implementations must not submit commands;
/// anything that needs a command exchange has to be deferred to another
/// task.
pub trait UnsolicitedSink: Send + 'static {
    /// One notification, delivered in line-arrival order
    fn on_unsolicited(&mut self, unsolicited: Unsolicited);

    /// The transport closed. Called exactly once, after which no more
    /// notifications arrive.
    fn on_closed(&mut self) {}
}

/// Lines longer than this without a terminator mean the peer is not
/// speaking the protocol; the buffer is reset rather than grown.
const MAX_LINE: usize = 4096;

pub(crate) async fn run_reader(
    mut read_half: ReadHalf<Box<dyn AtStream>>,
    shared: Arc<Shared>,
    mut sink: Box<dyn UnsolicitedSink>,
) {
    let _ = shared.reader_task.set(tokio::task::id());

    let mut buf = [0u8; 1024];
    let mut acc: Vec<u8> = Vec::new();
    let mut sms_header: Option<String> = None;

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "read failed, closing channel");
                break;
            }
        };
        acc.extend_from_slice(&buf[..n]);

        while let Some(pos) = acc.iter().position(|&b| b == b'\r' || b == b'\n') {
            let line_bytes: Vec<u8> = acc.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos]).trim().to_string();
            if line.is_empty() {
                continue;
            }
            process_line(&shared, sink.as_mut(), &mut sms_header, line);
        }

        // The SMS prompt never gets a terminator, so it is still
        // sitting in the partial buffer.
        if acc.as_slice() == b"> " {
            acc.clear();
            if let Some(pending) = shared.pending.lock().unwrap().as_mut() {
                if let Some(prompt_tx) = pending.prompt_tx.take() {
                    let _ = prompt_tx.send(());
                }
            }
        }

        if acc.len() > MAX_LINE {
            warn!(len = acc.len(), "unterminated input, resetting line buffer");
            acc.clear();
        }
    }

    shared.closed.store(true, Ordering::SeqCst);
    // Dropping the pending exchange wakes its submitter with Closed.
    drop(shared.pending.lock().unwrap().take());
    debug!("channel closed");
    sink.on_closed();
}

fn process_line(
    shared: &Shared,
    sink: &mut dyn UnsolicitedSink,
    sms_header: &mut Option<String>,
    line: String,
) {
    // A held SMS header claims the very next line as its PDU.
    if let Some(header) = sms_header.take() {
        sink.on_unsolicited(Unsolicited {
            line: header,
            pdu: Some(line),
        });
        return;
    }

    let mut slot = shared.pending.lock().unwrap();
    let Some(pending) = slot.as_mut() else {
        drop(slot);
        dispatch_unsolicited(sink, sms_header, line);
        return;
    };

    // Device echo of the command we just wrote.
    if line == pending.command {
        return;
    }

    if classify_final(&line).is_some() {
        if let Some(finished) = slot.take() {
            drop(slot);
            let response = AtResponse::new(line, finished.lines);
            if finished.done_tx.send(response).is_err() {
                debug!("response arrived after the submitter gave up");
            }
        }
    } else if is_intermediate(&line, pending.shape, pending.prefix.as_deref()) {
        pending.lines.push(line);
    } else {
        drop(slot);
        dispatch_unsolicited(sink, sms_header, line);
    }
}

fn dispatch_unsolicited(
    sink: &mut dyn UnsolicitedSink,
    sms_header: &mut Option<String>,
    line: String,
) {
    if is_sms_notification_prefix(&line) {
        *sms_header = Some(line);
    } else {
        sink.on_unsolicited(Unsolicited { line, pdu: None });
    }
}
