//! One identity's connection to the game server.
//!
//! The server streams bytes with no framing and no request/response
//! correlation, so a response is whatever arrives before the stream
//! goes quiet. A background reader task drains the transport into a
//! shared buffer; foreground operations capture from that buffer with
//! a burst-aware wait-for-silence loop. While no command capture is in
//! flight, buffered bytes are forwarded to an optional ambient channel
//! instead, so unsolicited output (says, pages, channel chatter) is
//! never mistaken for a command response and never delivered twice.
//!
//! All login/command operations serialize on one async mutex per
//! session. The buffer and the command-mode flag sit behind their own
//! std mutex shared with the reader task, with a [`Notify`] as the
//! new-data signal. Locks are never held across an await.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::classify::{classify_login, creation_succeeded, LoginVerdict};
use crate::error::{GatewayError, Result};
use crate::output::recover_text;
use crate::transport::{BoxedReader, Connector};

const READ_CHUNK: usize = 4096;

/// Nap after a zero-length read so a closed transport cannot spin the
/// reader task. The next operation notices the dead link and redials.
const ZERO_READ_BACKOFF: Duration = Duration::from_millis(50);

/// Timing knobs for the quiescent capture protocol.
///
/// Base waits differ per operation because the server answers `create`
/// slower than a plain command. The capture deadline extends by
/// `extend_window` every time a burst arrives, bounded by
/// `capture_ceiling` so a stream that never goes quiet cannot hold a
/// command forever.
#[derive(Debug, Clone)]
pub struct QuiescenceTuning {
    /// Wait for the greeting burst after connecting.
    pub banner_wait: Duration,
    /// Base wait after a `connect` attempt.
    pub login_wait: Duration,
    /// Base wait after a `create` attempt.
    pub create_wait: Duration,
    /// Base wait after an ordinary command.
    pub command_wait: Duration,
    /// Longest single wait on the new-data signal.
    pub poll_interval: Duration,
    /// Deadline extension granted per arriving burst.
    pub extend_window: Duration,
    /// Nap when a wakeup produced no data.
    pub idle_nap: Duration,
    /// Non-destructive buffer peek before the first login attempt.
    pub peek_wait: Duration,
    /// Hard upper bound on one capture, extensions included.
    pub capture_ceiling: Duration,
}

impl Default for QuiescenceTuning {
    fn default() -> Self {
        Self {
            banner_wait: Duration::from_millis(600),
            login_wait: Duration::from_millis(800),
            create_wait: Duration::from_millis(900),
            command_wait: Duration::from_millis(600),
            poll_interval: Duration::from_millis(120),
            extend_window: Duration::from_millis(180),
            idle_nap: Duration::from_millis(30),
            peek_wait: Duration::from_millis(50),
            capture_ceiling: Duration::from_secs(10),
        }
    }
}

/// Per-session connection settings, shared by every session a registry
/// creates.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Game server host.
    pub host: String,
    /// Game server port.
    pub port: u16,
    /// Idle span after which the sweep may evict the session.
    pub idle_timeout: Duration,
    /// Capture timing.
    pub tuning: QuiescenceTuning,
}

/// Result of [`RemoteSession::ensure_logged_in`].
#[derive(Debug, Clone, Default)]
pub struct LoginOutcome {
    /// Concatenated capture text from all attempts; empty on success.
    pub diagnostics: String,
    /// Whether a fresh account was created along the way.
    pub created_account: bool,
}

impl LoginOutcome {
    fn authenticated(created_account: bool) -> Self {
        Self {
            diagnostics: String::new(),
            created_account,
        }
    }
}

/// State owned by the foreground side: transport write half, reader
/// task handle, authentication flag. Guarded by the session's
/// operation mutex.
struct Link {
    writer: Option<crate::transport::BoxedWriter>,
    reader_task: Option<JoinHandle<()>>,
    authenticated: bool,
}

impl Link {
    fn is_open(&self) -> bool {
        self.writer.is_some()
            && self
                .reader_task
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }
}

/// Buffer state shared between the reader task and captures.
struct BufState {
    data: Vec<u8>,
    command_mode: bool,
    ambient: Option<mpsc::Sender<String>>,
}

/// Reader-task side of a session: buffer, new-data signal, last-I/O
/// clock.
struct Shared {
    buf: StdMutex<BufState>,
    data_ready: Notify,
    epoch: Instant,
    last_io_ms: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            buf: StdMutex::new(BufState {
                data: Vec::new(),
                command_mode: false,
                ambient: None,
            }),
            data_ready: Notify::new(),
            epoch: Instant::now(),
            last_io_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_io_ms.store(ms, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_io_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }

    /// Append read bytes. When no capture is in flight and an ambient
    /// channel is registered, the whole buffer is drained and handed
    /// back for ambient delivery instead.
    fn append(&self, bytes: &[u8]) -> Option<(mpsc::Sender<String>, Vec<u8>)> {
        let mut buf = self.buf.lock().ok()?;
        buf.data.extend_from_slice(bytes);
        if !buf.command_mode {
            if let Some(sender) = buf.ambient.clone() {
                let drained = mem::take(&mut buf.data);
                return Some((sender, drained));
            }
        }
        None
    }

    fn take_buffer(&self) -> Vec<u8> {
        self.buf
            .lock()
            .map(|mut buf| mem::take(&mut buf.data))
            .unwrap_or_default()
    }

    fn peek_text(&self) -> String {
        self.buf
            .lock()
            .map(|buf| recover_text(&buf.data))
            .unwrap_or_default()
    }

    fn set_command_mode(&self, on: bool) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.command_mode = on;
        }
    }

    /// Clear buffered bytes and leave command mode. The ambient channel
    /// survives so a reconnect keeps delivering to the same consumer.
    fn reset(&self) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.data.clear();
            buf.command_mode = false;
        }
    }
}

/// Flips the session into command mode for the lifetime of a capture,
/// restoring ambient dispatch on drop even if the capture is cancelled.
struct CommandModeGuard<'a> {
    shared: &'a Shared,
}

impl Drop for CommandModeGuard<'_> {
    fn drop(&mut self) {
        self.shared.set_command_mode(false);
    }
}

/// A persistent, exclusively-owned connection to the game server for
/// one chat identity.
///
/// The transport dials lazily: construction is cheap and performs no
/// I/O. Login and command execution serialize on an internal mutex, so
/// concurrent chat events for the same identity queue up rather than
/// interleaving their captures.
pub struct RemoteSession {
    identity: String,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    link: Mutex<Link>,
    shared: Arc<Shared>,
}

impl RemoteSession {
    /// Create a session for `identity`. No connection is opened yet.
    pub fn new(identity: impl Into<String>, config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            identity: identity.into(),
            config,
            connector,
            link: Mutex::new(Link {
                writer: None,
                reader_task: None,
                authenticated: false,
            }),
            shared: Arc::new(Shared::new()),
        }
    }

    /// The chat identity this session belongs to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether a transport is open and its reader task alive.
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_open()
    }

    /// Whether a login has been classified as successful on the
    /// current connection.
    pub async fn is_authenticated(&self) -> bool {
        self.link.lock().await.authenticated
    }

    /// Time since the transport last moved bytes in either direction.
    pub fn idle_for(&self) -> Duration {
        self.shared.idle_for()
    }

    /// Whether the session has been idle past its configured timeout.
    pub fn is_idle(&self) -> bool {
        self.shared.idle_for() > self.config.idle_timeout
    }

    /// Register a channel for unsolicited remote output. Any bytes
    /// already buffered outside a capture are flushed to it
    /// immediately. A full channel drops the burst rather than stall
    /// the reader task.
    pub fn set_ambient_sender(&self, sender: mpsc::Sender<String>) {
        let pending = {
            let Ok(mut buf) = self.shared.buf.lock() else {
                return;
            };
            buf.ambient = Some(sender.clone());
            if !buf.command_mode && !buf.data.is_empty() {
                Some(mem::take(&mut buf.data))
            } else {
                None
            }
        };
        if let Some(bytes) = pending {
            let text = recover_text(&bytes);
            if !text.trim().is_empty() && sender.try_send(text).is_err() {
                debug!("session {}: ambient channel full; dropping backlog", self.identity);
            }
        }
    }

    /// Open the transport if it is not already open. Idempotent.
    ///
    /// Starts the background reader task and drains the greeting
    /// banner so it cannot pollute the first command capture.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await
    }

    /// Make sure this session is logged in as `account`.
    ///
    /// Already-authenticated sessions return immediately. Otherwise the
    /// buffer is peeked non-destructively for signs of an established
    /// in-game session, then a `connect` is attempted, then (when
    /// `auto_create` is set) a `create` followed by a second `connect`.
    /// On failure the concatenated capture text of every attempt comes
    /// back as diagnostics for the caller to surface.
    pub async fn ensure_logged_in(
        &self,
        account: &str,
        password: &str,
        auto_create: bool,
    ) -> Result<LoginOutcome> {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await?;

        if link.authenticated {
            return Ok(LoginOutcome::authenticated(false));
        }

        let _mode = self.enter_command_mode();

        // A client that dropped and redialed may land straight back in
        // the game. Peek without consuming so a real login attempt
        // still sees the same text.
        let _ = timeout(self.config.tuning.peek_wait, self.shared.data_ready.notified()).await;
        let probe = self.shared.peek_text();
        if !probe.is_empty() && classify_login(&probe) == LoginVerdict::Accepted {
            debug!("session {}: already in game, skipping login", self.identity);
            link.authenticated = true;
            return Ok(LoginOutcome::authenticated(false));
        }

        self.send_line(&mut link, &format!("connect {account} {password}"))
            .await?;
        let first = self.capture_text(self.config.tuning.login_wait).await;
        if classify_login(&first).is_authenticated() {
            debug!("session {}: login accepted", self.identity);
            link.authenticated = true;
            return Ok(LoginOutcome::authenticated(false));
        }

        if !auto_create {
            return Ok(LoginOutcome {
                diagnostics: first,
                created_account: false,
            });
        }

        self.send_line(&mut link, &format!("create {account} {password}"))
            .await?;
        let second = self.capture_text(self.config.tuning.create_wait).await;
        let created = creation_succeeded(&second);

        self.send_line(&mut link, &format!("connect {account} {password}"))
            .await?;
        let third = self.capture_text(self.config.tuning.login_wait).await;
        if classify_login(&third).is_authenticated() {
            debug!(
                "session {}: login accepted after create (created={})",
                self.identity, created
            );
            link.authenticated = true;
            return Ok(LoginOutcome::authenticated(created));
        }

        Ok(LoginOutcome {
            diagnostics: format!("{first}{second}{third}"),
            created_account: created,
        })
    }

    /// Send one command line and capture its quiescent response.
    ///
    /// Empty commands are a no-op. The capture owns the shared buffer
    /// for its whole duration; ambient dispatch resumes afterwards.
    pub async fn run_command(&self, command: &str) -> Result<String> {
        let command = command.trim_end_matches(|c| c == '\r' || c == '\n');
        if command.is_empty() {
            return Ok(String::new());
        }

        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await?;

        let _mode = self.enter_command_mode();
        self.send_line(&mut link, command).await?;
        Ok(self.capture_text(self.config.tuning.command_wait).await)
    }

    /// Close the transport and stop the reader task, waiting for its
    /// termination. The session survives and reconnects lazily on the
    /// next operation, unauthenticated.
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if let Some(task) = link.reader_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut writer) = link.writer.take() {
            let _ = writer.shutdown().await;
        }
        link.authenticated = false;
        self.shared.reset();
        debug!("session {}: closed", self.identity);
    }

    async fn connect_locked(&self, link: &mut Link) -> Result<()> {
        if link.is_open() {
            return Ok(());
        }

        // Drop stale halves left over from a dead connection.
        if let Some(task) = link.reader_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut writer) = link.writer.take() {
            let _ = writer.shutdown().await;
        }
        link.authenticated = false;
        self.shared.reset();

        debug!(
            "session {}: connecting to {}:{}",
            self.identity, self.config.host, self.config.port
        );
        let pair = self
            .connector
            .open(&self.config.host, self.config.port)
            .await?;
        link.writer = Some(pair.writer);
        link.reader_task = Some(tokio::spawn(reader_task(
            pair.reader,
            Arc::clone(&self.shared),
        )));
        self.shared.touch();

        // Servers greet new connections with a banner burst.
        let _mode = self.enter_command_mode();
        let banner = self.capture(self.config.tuning.banner_wait).await;
        trace!("session {}: drained {} banner bytes", self.identity, banner.len());
        Ok(())
    }

    fn enter_command_mode(&self) -> CommandModeGuard<'_> {
        self.shared.set_command_mode(true);
        CommandModeGuard {
            shared: &self.shared,
        }
    }

    async fn send_line(&self, link: &mut Link, line: &str) -> Result<()> {
        let mut payload = Vec::with_capacity(line.len() + 2);
        payload.extend_from_slice(line.as_bytes());
        payload.extend_from_slice(b"\r\n");

        let result = match link.writer.as_mut() {
            Some(writer) => match writer.write_all(&payload).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            },
            None => return Err(GatewayError::NotConnected),
        };

        match result {
            Ok(()) => {
                self.shared.touch();
                Ok(())
            }
            Err(e) => {
                warn!("session {}: write failed: {}", self.identity, e);
                // Dead writer. Drop the link so the next operation
                // redials instead of writing into the void again.
                if let Some(task) = link.reader_task.take() {
                    task.abort();
                }
                link.writer = None;
                link.authenticated = false;
                Err(e.into())
            }
        }
    }

    /// Wait-for-silence capture: collect bursts until the stream stays
    /// quiet past the deadline. Each burst extends the deadline by the
    /// extension window, up to the hard ceiling.
    async fn capture(&self, base_wait: Duration) -> Vec<u8> {
        let t = &self.config.tuning;
        let start = Instant::now();
        let hard_stop = start + t.capture_ceiling;
        let mut deadline = (start + base_wait).min(hard_stop);
        let mut collected: Vec<u8> = Vec::new();

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = t.poll_interval.min(deadline - now);
            let _ = timeout(wait, self.shared.data_ready.notified()).await;

            let drained = self.shared.take_buffer();
            if drained.is_empty() {
                tokio::time::sleep(t.idle_nap).await;
            } else {
                collected.extend_from_slice(&drained);
                deadline = deadline.max(Instant::now() + t.extend_window).min(hard_stop);
            }
        }

        collected
    }

    async fn capture_text(&self, base_wait: Duration) -> String {
        let bytes = self.capture(base_wait).await;
        recover_text(&bytes)
    }
}

/// Background task draining the transport into the shared buffer.
async fn reader_task(mut reader: BoxedReader, shared: Arc<Shared>) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                // EOF, or a transport reporting "nothing yet".
                tokio::time::sleep(ZERO_READ_BACKOFF).await;
            }
            Ok(n) => {
                trace!("session reader: read {} bytes", n);
                shared.touch();
                if let Some((sender, bytes)) = shared.append(&chunk[..n]) {
                    let text = recover_text(&bytes);
                    if !text.trim().is_empty() && sender.try_send(text).is_err() {
                        debug!("session reader: ambient channel full; dropping burst");
                    }
                }
                shared.data_ready.notify_one();
            }
            Err(e) => {
                debug!("session reader: read failed: {}", e);
                return;
            }
        }
    }
}
