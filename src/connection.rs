//! Telnet session management for one processor.
//!
//! A [`Connection`] owns the TCP session for one credential tuple and is
//! shared by every shade controller pointed at that processor. It performs
//! the login handshake, serializes outbound commands through a busy flag
//! plus FIFO queue (the processor handles one command at a time), parses
//! inbound lines, and routes status events to subscribers by integration
//! id. On disconnect it reconnects unconditionally, forever; queued
//! commands survive the reconnect and flush once the new session reports
//! ready.

use crate::protocol::{Command, Decoder, ServerMessage, StatusEvent};
use crate::subscription::EventReceiver;
use crate::types::ConnectionConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Tunables for a connection.
///
/// Both knobs default to off, matching the processor's legacy behavior:
/// an unacknowledged command waits forever and reconnects are immediate.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// If set, an in-flight command that sees no ready prompt within this
    /// window is logged and the queue is unblocked.
    pub command_timeout: Option<Duration>,
    /// If set, wait this long between reconnect attempts.
    pub reconnect_delay: Option<Duration>,
}

/// Where the session is in the plaintext login exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginPhase {
    AwaitingLogin,
    AwaitingPassword,
    Ready,
}

struct Inner {
    phase: LoginPhase,
    /// True while a command is in flight; cleared only by the ready prompt
    busy: bool,
    /// Commands waiting for the processor to go idle, in submission order
    queue: VecDeque<Command>,
    /// Bumped per transmission; lets the timeout watchdog detect staleness
    tx_seq: u64,
    /// Writer for the live session, if any
    writer: Option<mpsc::UnboundedSender<Command>>,
    /// Status event subscribers, keyed by integration id
    routes: HashMap<u32, Vec<mpsc::UnboundedSender<StatusEvent>>>,
}

/// A shared connection to one processor.
///
/// Obtain instances through [`ConnectionRegistry`](crate::ConnectionRegistry)
/// so that shades with identical credentials share a single session.
pub struct Connection {
    inner: Arc<Mutex<Inner>>,
    options: ConnectionOptions,
    host: String,
    port: u16,
    supervisor: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Open a connection, spawning the reconnect supervisor.
    ///
    /// Returns immediately; the first TCP connect happens in the
    /// background and commands submitted before it completes are queued.
    /// Must be called from within a tokio runtime.
    pub fn open(config: ConnectionConfig, options: ConnectionOptions) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            phase: LoginPhase::AwaitingLogin,
            busy: true,
            queue: VecDeque::new(),
            tx_seq: 0,
            writer: None,
            routes: HashMap::new(),
        }));

        let host = config.host.clone();
        let port = config.port;

        let supervisor = tokio::spawn(supervisor_loop(config, inner.clone(), options.clone()));

        Self {
            inner,
            options,
            host,
            port,
            supervisor,
        }
    }

    /// The processor's host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The processor's telnet port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Submit a command for transmission.
    ///
    /// If the processor is busy (or no session is up yet) the command is
    /// queued and transmitted in submission order as ready prompts arrive.
    pub fn send_command(&self, command: Command) {
        let seq = {
            let mut guard = self.inner.lock().unwrap();
            if guard.busy || guard.writer.is_none() {
                guard.queue.push_back(command);
                return;
            }
            guard.busy = true;
            transmit(&mut guard, command);
            guard.tx_seq
        };

        if let Some(timeout) = self.options.command_timeout {
            spawn_watchdog(self.inner.clone(), timeout, seq);
        }
    }

    /// Subscribe to status events for one integration id.
    ///
    /// Only events addressed to `integration_id` are delivered; events for
    /// other ids never reach this receiver.
    pub fn subscribe(&self, integration_id: u32) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .routes
            .entry(integration_id)
            .or_default()
            .push(tx);
        EventReceiver::new(rx)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

/// Hand a command to the live session writer.
///
/// If the session died under us the command goes back to the head of the
/// queue so submission order survives the reconnect.
fn transmit(guard: &mut Inner, command: Command) {
    guard.tx_seq = guard.tx_seq.wrapping_add(1);
    if let Some(writer) = &guard.writer {
        if writer.send(command.clone()).is_ok() {
            return;
        }
    }
    guard.queue.push_front(command);
}

/// Ready prompt (or timeout) handling: transmit the queue head, or go idle.
fn advance_queue(inner: &Arc<Mutex<Inner>>, timeout: Option<Duration>) {
    let seq = {
        let mut guard = inner.lock().unwrap();
        match guard.queue.pop_front() {
            Some(command) => {
                guard.busy = true;
                transmit(&mut guard, command);
                guard.tx_seq
            }
            None => {
                guard.busy = false;
                return;
            }
        }
    };

    if let Some(timeout) = timeout {
        spawn_watchdog(inner.clone(), timeout, seq);
    }
}

/// Unblock the queue if the command transmitted as `seq` is still in
/// flight after the configured window.
fn spawn_watchdog(inner: Arc<Mutex<Inner>>, timeout: Duration, seq: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let stalled = {
            let guard = inner.lock().unwrap();
            guard.busy && guard.tx_seq == seq
        };
        if stalled {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "command not acknowledged; unblocking queue"
            );
            advance_queue(&inner, Some(timeout));
        }
    });
}

/// Reconnect-forever loop. Transport errors are never surfaced to callers;
/// a fresh session is the sole recovery path.
async fn supervisor_loop(
    config: ConnectionConfig,
    inner: Arc<Mutex<Inner>>,
    options: ConnectionOptions,
) {
    let addr = format!("{}:{}", config.host, config.port);
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                tracing::info!(addr = %addr, "connected to processor");
                run_session(stream, &config, &inner, &options).await;
                tracing::warn!(addr = %addr, "session ended; reconnecting");
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "connect failed; retrying");
            }
        }

        {
            let mut guard = inner.lock().unwrap();
            guard.writer = None;
            guard.busy = true;
            guard.phase = LoginPhase::AwaitingLogin;
        }

        if let Some(delay) = options.reconnect_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Drive one TCP session until it ends.
async fn run_session(
    stream: TcpStream,
    config: &ConnectionConfig,
    inner: &Arc<Mutex<Inner>>,
    options: &ConnectionOptions,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Command>();

    {
        let mut guard = inner.lock().unwrap();
        guard.writer = Some(writer_tx.clone());
        // Nothing transmits until the new session reports ready.
        guard.busy = true;
        guard.phase = LoginPhase::AwaitingLogin;
    }

    let write_task = tokio::spawn(async move {
        while let Some(command) = writer_rx.recv().await {
            tracing::debug!(command = command.as_str(), "sending");
            if let Err(e) = write_half.write_all(command.to_wire().as_bytes()).await {
                tracing::error!(error = %e, "write failed");
                break;
            }
        }
    });

    let mut decoder = Decoder::new();
    let mut buf = [0u8; 1024];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("connection closed by processor");
                break;
            }
            Ok(n) => {
                for item in decoder.feed(&buf[..n]) {
                    match item {
                        Ok(message) => {
                            handle_message(message, config, inner, options, &writer_tx)
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed line");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "read failed");
                break;
            }
        }
    }

    write_task.abort();
}

fn handle_message(
    message: ServerMessage,
    config: &ConnectionConfig,
    inner: &Arc<Mutex<Inner>>,
    options: &ConnectionOptions,
    writer: &mpsc::UnboundedSender<Command>,
) {
    match message {
        ServerMessage::LoginPrompt => {
            tracing::debug!("login prompt; sending username");
            inner.lock().unwrap().phase = LoginPhase::AwaitingPassword;
            let _ = writer.send(Command::raw(config.username.clone()));
        }
        ServerMessage::PasswordPrompt => {
            tracing::debug!("password prompt; sending password");
            let _ = writer.send(Command::raw(config.password.clone()));
        }
        ServerMessage::IdlePrompt => {
            {
                let mut guard = inner.lock().unwrap();
                if guard.phase != LoginPhase::Ready {
                    guard.phase = LoginPhase::Ready;
                    tracing::info!("session ready");
                } else {
                    tracing::debug!("processor idle");
                }
            }
            advance_queue(inner, options.command_timeout);
        }
        ServerMessage::Status(event) => {
            tracing::debug!(
                integration_id = event.integration_id,
                action_id = event.action_id,
                "status event"
            );
            route_event(inner, event);
        }
        ServerMessage::Unknown(line) => {
            tracing::trace!(line = %line, "ignoring line");
        }
    }
}

/// Deliver an event to the subscribers registered for its integration id,
/// pruning any that have gone away.
fn route_event(inner: &Arc<Mutex<Inner>>, event: StatusEvent) {
    let integration_id = event.integration_id;
    let mut guard = inner.lock().unwrap();
    let drained = match guard.routes.get_mut(&integration_id) {
        Some(senders) => {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            senders.is_empty()
        }
        None => {
            tracing::trace!(integration_id, "no subscriber for event");
            return;
        }
    };
    if drained {
        guard.routes.remove(&integration_id);
    }
}
