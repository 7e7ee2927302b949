//! Scripted modem simulation
//!
//! Provides a simulated AT modem that answers commands from a script,
//! driven over one end of an in-memory duplex stream.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One expected command and its scripted answer
#[derive(Debug, Clone)]
pub struct ScriptStep {
    /// Exact command line expected (without the trailing CR)
    pub expect: String,
    /// Reply lines, written in order. A line of exactly `"> "` is sent
    /// raw with no terminator, which is how modems present the SMS
    /// prompt. An empty reply list leaves the command unanswered.
    pub reply: Vec<String>,
    /// Wait before answering
    pub delay: Option<Duration>,
}

/// Configuration for creating a scripted modem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedModemConfig {
    /// Echo received commands back before answering, like a modem that
    /// has not seen `ATE0` yet
    pub echo: bool,
    /// Duplex buffer size in bytes
    pub buffer_size: usize,
}

impl Default for ScriptedModemConfig {
    fn default() -> Self {
        Self {
            echo: false,
            buffer_size: 4096,
        }
    }
}

/// A simulated modem that answers AT commands from an expectation queue
#[derive(Debug)]
pub struct ScriptedModem {
    config: ScriptedModemConfig,
    steps: VecDeque<ScriptStep>,
}

/// Handle for injecting unsolicited lines into a running simulation
#[derive(Debug, Clone)]
pub struct SimHandle {
    inject_tx: mpsc::UnboundedSender<Vec<String>>,
}

impl SimHandle {
    /// Queue one unsolicited line for delivery
    pub fn inject(&self, line: impl Into<String>) {
        let _ = self.inject_tx.send(vec![line.into()]);
    }

    /// Queue several lines delivered back to back with nothing
    /// interleaved, for two-part notifications like `+CMT:` plus PDU
    pub fn inject_burst(&self, lines: &[&str]) {
        let _ = self
            .inject_tx
            .send(lines.iter().map(|l| (*l).to_string()).collect());
    }

    /// Make the modem task exit, closing its side of the stream. The
    /// host then observes EOF, like a serial device going away.
    pub fn hang_up(&self) {
        let _ = self.inject_tx.send(vec![]);
    }
}

impl ScriptedModem {
    /// Create an empty script with default configuration
    pub fn new() -> Self {
        Self::from_config(ScriptedModemConfig::default())
    }

    /// Create an empty script with the given configuration
    pub fn from_config(config: ScriptedModemConfig) -> Self {
        Self {
            config,
            steps: VecDeque::new(),
        }
    }

    /// Expect `command` and answer with `reply` lines
    pub fn expect(mut self, command: impl Into<String>, reply: &[&str]) -> Self {
        self.steps.push_back(ScriptStep {
            expect: command.into(),
            reply: reply.iter().map(|l| (*l).to_string()).collect(),
            delay: None,
        });
        self
    }

    /// Expect `command` and answer after `delay`
    pub fn expect_delayed(
        mut self,
        command: impl Into<String>,
        reply: &[&str],
        delay: Duration,
    ) -> Self {
        self.steps.push_back(ScriptStep {
            expect: command.into(),
            reply: reply.iter().map(|l| (*l).to_string()).collect(),
            delay: Some(delay),
        });
        self
    }

    /// Expect `command` and never answer it
    pub fn expect_silence(mut self, command: impl Into<String>) -> Self {
        self.steps.push_back(ScriptStep {
            expect: command.into(),
            reply: Vec::new(),
            delay: None,
        });
        self
    }

    /// Start the simulation.
    ///
    /// Returns the host end of the duplex stream and an injection
    /// handle. The modem task runs until the host end closes or a
    /// [`SimHandle::hang_up`] arrives.
    pub fn spawn(self) -> (DuplexStream, SimHandle) {
        let (host_side, modem_side) = tokio::io::duplex(self.config.buffer_size);
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_modem(modem_side, self.config, self.steps, inject_rx));

        (host_side, SimHandle { inject_tx })
    }
}

impl Default for ScriptedModem {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_modem(
    mut stream: DuplexStream,
    config: ScriptedModemConfig,
    mut steps: VecDeque<ScriptStep>,
    mut inject_rx: mpsc::UnboundedReceiver<Vec<String>>,
) {
    let mut buf = [0u8; 256];
    let mut partial = Vec::new();

    loop {
        tokio::select! {
            injected = inject_rx.recv() => {
                match injected {
                    // Empty burst is the hang-up signal.
                    Some(lines) if lines.is_empty() => {
                        debug!("simulated modem hanging up");
                        return;
                    }
                    Some(lines) => {
                        for line in lines {
                            if write_line(&mut stream, &line).await.is_err() {
                                return;
                            }
                        }
                    }
                    None => return,
                }
            }
            read = stream.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => {
                        debug!("host side closed, simulated modem exiting");
                        return;
                    }
                    Ok(n) => n,
                };
                for &byte in &buf[..n] {
                    // Commands end with CR; an SMS PDU ends with CTRL-Z.
                    if byte == b'\r' || byte == b'\n' || byte == 0x1a {
                        if partial.is_empty() {
                            continue;
                        }
                        let line = String::from_utf8_lossy(&partial).into_owned();
                        partial.clear();
                        if answer(&mut stream, &config, &mut steps, &line).await.is_err() {
                            return;
                        }
                    } else {
                        partial.push(byte);
                    }
                }
            }
        }
    }
}

async fn answer(
    stream: &mut DuplexStream,
    config: &ScriptedModemConfig,
    steps: &mut VecDeque<ScriptStep>,
    line: &str,
) -> std::io::Result<()> {
    if config.echo {
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r").await?;
    }

    let step = match steps.front() {
        Some(step) if step.expect == line => steps.pop_front().unwrap(),
        _ => {
            warn!(command = line, "unscripted command, answering ERROR");
            return write_line(stream, "ERROR").await;
        }
    };

    if let Some(delay) = step.delay {
        tokio::time::sleep(delay).await;
    }
    for reply in &step.reply {
        if reply == "> " {
            // SMS prompt has no line terminator.
            stream.write_all(b"\r\n> ").await?;
            stream.flush().await?;
        } else {
            write_line(stream, reply).await?;
        }
    }
    Ok(())
}

async fn write_line(stream: &mut DuplexStream, line: &str) -> std::io::Result<()> {
    stream.write_all(b"\r\n").await?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await
}
