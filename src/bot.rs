//! The bot engine: lifecycle, reader/writer tasks, dispatch, shutdown.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_rustls::rustls::ClientConfig;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info};

use crate::caps::{CapEngine, CapState};
use crate::codec::LineCodec;
use crate::conn::{self, BoxedReader, BoxedWriter, Conn, DialFn};
use crate::error::{BotError, Result};
use crate::handler::Handler;
use crate::limiter::ReplyLimiter;
use crate::message::Message;
use crate::prefix::Prefix;
use crate::session;
use crate::triggers;

/// Capacity of the outgoing queue.
const OUTGOING_QUEUE_LEN: usize = 16;

/// Callback run in its own task after a successful session hijack, for
/// restoring state the handoff does not carry.
pub type HijackAfterFn = Box<dyn Fn(Bot) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One logical IRC session.
///
/// Cheap to clone; every clone shares the same session. Handlers receive a
/// clone, so they can issue commands from their own tasks.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<Inner>,
}

struct Inner {
    // Configuration, immutable after build.
    host: String,
    nick: String,
    realname: String,
    password: String,
    channels: Vec<String>,
    ssl: bool,
    sasl: bool,
    hijack_session: bool,
    msg_safety_buffer: bool,
    throttle_delay: Duration,
    ping_timeout: Duration,
    limit_replies: bool,
    reply_message_limit: u32,
    reply_interval: Duration,
    dial: Option<DialFn>,
    tls_config: Option<Arc<ClientConfig>>,
    hijack_after: Option<HijackAfterFn>,
    started: Instant,

    // Session state.
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
    current_nick: Mutex<String>,
    // Read on every outgoing byte-budget calculation, written rarely.
    prefix: RwLock<Prefix>,
    caps: tokio::sync::Mutex<CapState>,
    outgoing: Mutex<mpsc::Sender<String>>,
    outgoing_rx: Mutex<Option<mpsc::Receiver<String>>>,
    close_tx: Mutex<watch::Sender<bool>>,
    joined_tx: Mutex<watch::Sender<bool>>,
    join_once: AtomicBool,
    closing: AtomicBool,
    hijacked: AtomicBool,
    reconnecting: AtomicBool,
    limiter: Mutex<Option<Arc<ReplyLimiter>>>,
    /// OS descriptor of the live TCP socket, for the handoff path.
    conn_fd: Mutex<Option<i32>>,
    /// OS descriptor of the underlying socket (TLS included), so the close
    /// latch can tear the connection down synchronously.
    socket_fd: Mutex<Option<i32>>,
}

impl Bot {
    /// Start building a bot for `host` (a `host:port` string) with `nick`.
    pub fn builder(host: impl Into<String>, nick: impl Into<String>) -> BotBuilder {
        BotBuilder::new(host.into(), nick.into())
    }

    /// Append a handler. Built-in handlers are registered first; the
    /// registry is append-only for the life of the bot.
    pub fn add_trigger<H: Handler + 'static>(&self, handler: H) {
        write(&self.inner.handlers).push(Arc::new(handler));
    }

    /// Connect and run the session. Blocks until the connection ends.
    ///
    /// Returns `Ok(true)` when the session was handed off to a successor
    /// process; callers looping over `run` should break on that to avoid
    /// ping-ponging between two instances.
    pub async fn run(&self) -> Result<bool> {
        debug!("starting bot tasks");
        self.reset().await;

        let mut conn = None;
        if self.inner.hijack_session {
            if self.inner.ssl {
                error!("can't hijack a TLS session");
                return Err(BotError::HijackOverTls);
            }
            // The handoff exchange uses blocking reads; keep it off the
            // async worker threads.
            let (host, nick) = (self.inner.host.clone(), self.inner.nick.clone());
            let resumed =
                tokio::task::spawn_blocking(move || session::hijack_session(&host, &nick))
                    .await
                    .map_err(|e| BotError::Handoff(format!("hijack task: {}", e)))??;
            if let Some(resumed) = resumed {
                info!("resumed session from previous instance");
                self.set_prefix(resumed.prefix);
                self.inner.caps.lock().await.restore(resumed.enabled);
                self.inner.reconnecting.store(true, Ordering::SeqCst);
                resumed.stream.set_nonblocking(true)?;
                conn = Some(Conn::Tcp(TcpStream::from_std(resumed.stream)?));
            }
        }

        let conn = match conn {
            Some(c) => c,
            None => {
                let c = conn::dial(
                    &self.inner.host,
                    self.inner.ssl,
                    self.inner.dial.as_ref(),
                    self.inner.tls_config.clone(),
                )
                .await?;
                info!(host = %self.inner.host, "connected successfully");
                c
            }
        };

        *lock(&self.inner.conn_fd) = conn.raw_fd();
        *lock(&self.inner.socket_fd) = conn.socket_fd();

        if self.inner.limit_replies {
            *lock(&self.inner.limiter) = Some(Arc::new(ReplyLimiter::new(
                self.inner.reply_message_limit,
                self.inner.reply_interval,
            )));
        }

        let outgoing_rx = lock(&self.inner.outgoing_rx)
            .take()
            .ok_or(BotError::AlreadyRunning)?;
        let (reader_close, writer_close, listener_close) = {
            let close_tx = lock(&self.inner.close_tx);
            (
                close_tx.subscribe(),
                close_tx.subscribe(),
                close_tx.subscribe(),
            )
        };
        let (read_half, write_half) = conn.split();

        let reader = tokio::spawn(read_loop(self.clone(), read_half, reader_close));
        let writer = tokio::spawn(write_loop(
            self.clone(),
            write_half,
            outgoing_rx,
            writer_close,
        ));
        let listener = if self.conn_fd().is_some() {
            Some(tokio::spawn(session::handoff_listener(
                self.clone(),
                listener_close,
            )))
        } else {
            None
        };

        if self.inner.reconnecting.load(Ordering::SeqCst) {
            if let Some(callback) = &self.inner.hijack_after {
                tokio::spawn(callback(self.clone()));
            }
        } else if self.inner.sasl {
            self.sasl_register().await;
        } else {
            self.standard_register().await;
        }

        let _ = reader.await;
        let _ = writer.await;
        if let Some(listener) = listener {
            let _ = listener.await;
        }

        *lock(&self.inner.limiter) = None;
        info!("disconnected");
        Ok(self.inner.hijacked.load(Ordering::SeqCst))
    }

    /// Close the session. Safe to call from any task; the second and later
    /// calls are no-ops.
    pub fn close(&self) {
        self.close_from("", None);
    }

    pub(crate) fn close_from(&self, fault: &str, err: Option<&BotError>) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            debug!("already closing");
            return;
        }
        if let Some(e) = err {
            error!(side = fault, error = %e, "session fault");
        }
        // Tear the socket down before nudging the writer, so the sentinel
        // (or anything still queued) can only ever hit a dead connection.
        // After a handoff the descriptor belongs to the successor and must
        // not be touched at the OS level.
        if !self.inner.hijacked.load(Ordering::SeqCst) {
            if let Some(fd) = *lock(&self.inner.socket_fd) {
                shutdown_socket(fd);
            }
        }
        // A writer blocked on the queue wakes on the sentinel and then
        // observes the latch.
        let _ = lock(&self.inner.outgoing).try_send("PING".to_string());
        lock(&self.inner.close_tx).send_replace(true);
    }

    /// Whether the close latch has fired.
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// The `host:port` this bot was built for.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// The configured nick. The server-confirmed nick may differ after a
    /// forced rename; see [`Bot::current_nick`].
    pub fn nick(&self) -> &str {
        &self.inner.nick
    }

    /// The nick as last acknowledged by the server.
    pub fn current_nick(&self) -> String {
        lock(&self.inner.current_nick).clone()
    }

    /// The bot's own prefix as the server sees it.
    ///
    /// Until the first self-join is observed this is a conservative guess
    /// with a worst-case host, so byte budgets stay safe.
    pub fn prefix(&self) -> Prefix {
        read(&self.inner.prefix).clone()
    }

    /// Adjust parts of the bot's prefix; empty strings leave the part
    /// unchanged.
    pub fn prefix_change(&self, name: &str, user: &str, host: &str) {
        let mut prefix = write(&self.inner.prefix);
        if !name.is_empty() {
            prefix.nick = name.to_string();
        }
        if !user.is_empty() {
            prefix.user = user.to_string();
        }
        if !host.is_empty() {
            prefix.host = host.to_string();
        }
    }

    /// Time since this bot was created.
    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Wait until the auto-join wave of the current run has fired.
    pub async fn joined(&self) {
        let mut rx = lock(&self.inner.joined_tx).subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // Internal surface for commands, triggers and the session handoff.

    pub(crate) fn cap_state(&self) -> &tokio::sync::Mutex<CapState> {
        &self.inner.caps
    }

    pub(crate) fn channels(&self) -> &[String] {
        &self.inner.channels
    }

    pub(crate) fn msg_safety_buffer(&self) -> bool {
        self.inner.msg_safety_buffer
    }

    pub(crate) fn limit_replies(&self) -> bool {
        self.inner.limit_replies
    }

    pub(crate) fn limiter(&self) -> Option<Arc<ReplyLimiter>> {
        lock(&self.inner.limiter).clone()
    }

    pub(crate) fn outgoing_sender(&self) -> mpsc::Sender<String> {
        lock(&self.inner.outgoing).clone()
    }

    pub(crate) fn conn_fd(&self) -> Option<i32> {
        *lock(&self.inner.conn_fd)
    }

    pub(crate) fn set_prefix(&self, prefix: Prefix) {
        *write(&self.inner.prefix) = prefix;
    }

    pub(crate) fn set_current_nick(&self, nick: &str) {
        *lock(&self.inner.current_nick) = nick.to_string();
    }

    pub(crate) fn mark_hijacked(&self) {
        self.inner.hijacked.store(true, Ordering::SeqCst);
    }

    /// Claims the once-per-run join wave. True for the first caller only.
    pub(crate) fn begin_join_wave(&self) -> bool {
        !self.inner.join_once.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn fire_joined(&self) {
        lock(&self.inner.joined_tx).send_replace(true);
    }

    /// Fan a message out to every handler, one task per handler. The reader
    /// does not wait for any of them.
    fn dispatch(&self, msg: Message) {
        let msg = Arc::new(msg);
        let handlers: Vec<Arc<dyn Handler>> = read(&self.inner.handlers).clone();
        for handler in handlers {
            let bot = self.clone();
            let msg = Arc::clone(&msg);
            tokio::spawn(async move {
                handler.handle(&bot, &msg).await;
            });
        }
    }

    /// Per-run state that must not leak between sessions.
    async fn reset(&self) {
        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.hijacked.store(false, Ordering::SeqCst);
        self.inner.reconnecting.store(false, Ordering::SeqCst);
        self.inner.join_once.store(false, Ordering::SeqCst);
        self.inner.caps.lock().await.reset();

        let (tx, rx) = mpsc::channel(OUTGOING_QUEUE_LEN);
        *lock(&self.inner.outgoing) = tx;
        *lock(&self.inner.outgoing_rx) = Some(rx);
        *lock(&self.inner.close_tx) = watch::channel(false).0;
        *lock(&self.inner.joined_tx) = watch::channel(false).0;
        *lock(&self.inner.conn_fd) = None;
        *lock(&self.inner.socket_fd) = None;
    }

    async fn standard_register(&self) {
        self.send("CAP LS").await;
        if !self.inner.password.is_empty() {
            self.send(format!("PASS {}", self.inner.password)).await;
        }
        debug!("sending standard registration");
        self.send_user_command().await;
        self.set_nick(&self.inner.nick).await;
    }

    async fn sasl_register(&self) {
        {
            let mut caps = self.inner.caps.lock().await;
            caps.enable_sasl();
            caps.set_sasl_credentials(&self.inner.nick, &self.inner.password);
        }
        debug!("beginning sasl authentication");
        self.send("CAP LS").await;
        self.set_nick(&self.inner.nick).await;
        self.send_user_command().await;
    }

    async fn send_user_command(&self) {
        self.send(format!(
            "USER {} 0 * :{}",
            self.inner.nick, self.inner.realname
        ))
        .await;
    }

    /// Drain whatever is sitting in the outgoing queue. Unit-test hook.
    #[cfg(test)]
    pub(crate) fn drain_outgoing(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(rx) = lock(&self.inner.outgoing_rx).as_mut() {
            while let Ok(line) = rx.try_recv() {
                out.push(line);
            }
        }
        out
    }
}

impl fmt::Display for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Server: {}, Channels: {:?}, Nick: {}",
            self.inner.host,
            self.inner.channels,
            self.current_nick()
        )
    }
}

/// Level-triggered teardown of the live socket. The stream halves still
/// own the descriptor and release it when their tasks drop them; shutdown
/// makes pending reads return EOF and further writes fail immediately.
#[cfg(unix)]
fn shutdown_socket(fd: i32) {
    unsafe { libc::shutdown(fd, libc::SHUT_RDWR) };
}

#[cfg(not(unix))]
fn shutdown_socket(_fd: i32) {}

async fn read_loop(bot: Bot, reader: BoxedReader, mut close_rx: watch::Receiver<bool>) {
    let mut frames = FramedRead::new(reader, LineCodec::new());
    loop {
        // The read deadline is re-armed before every scan; a server that
        // goes silent past the ping timeout ends the session.
        let next = tokio::select! {
            _ = close_rx.changed() => break,
            res = timeout(bot.inner.ping_timeout, frames.next()) => res,
        };
        match next {
            Err(_elapsed) => {
                let err = BotError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "no data from server within the ping timeout",
                ));
                bot.close_from("incoming", Some(&err));
                break;
            }
            Ok(None) => {
                bot.close_from("incoming", None);
                break;
            }
            Ok(Some(Err(e))) => {
                bot.close_from("incoming", Some(&e));
                break;
            }
            Ok(Some(Ok(line))) => {
                debug!(host = %bot.inner.host, raw = %line, "incoming");
                if let Some(msg) = Message::parse(&line) {
                    bot.dispatch(msg);
                }
            }
        }
    }
}

async fn write_loop(
    bot: Bot,
    writer: BoxedWriter,
    mut rx: mpsc::Receiver<String>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut sink = FramedWrite::new(writer, LineCodec::new());
    loop {
        let item = tokio::select! {
            _ = close_rx.changed() => break,
            item = rx.recv() => item,
        };
        let Some(line) = item else { break };
        debug!(host = %bot.inner.host, raw = %line, "outgoing");
        if let Err(e) = sink.send(line).await {
            bot.close_from("outgoing", Some(&e));
            break;
        }
        // Unconditional, so the outbound rate is bounded no matter how many
        // handlers are enqueueing.
        sleep(bot.inner.throttle_delay).await;
    }
}

/// Configuration for a [`Bot`], consumed by [`BotBuilder::build`].
pub struct BotBuilder {
    host: String,
    nick: String,
    realname: Option<String>,
    password: String,
    channels: Vec<String>,
    ssl: bool,
    sasl: bool,
    hijack_session: bool,
    msg_safety_buffer: bool,
    throttle_delay: Duration,
    ping_timeout: Duration,
    limit_replies: bool,
    reply_message_limit: u32,
    reply_interval: Duration,
    dial: Option<DialFn>,
    tls_config: Option<Arc<ClientConfig>>,
    hijack_after: Option<HijackAfterFn>,
}

impl BotBuilder {
    fn new(host: String, nick: String) -> Self {
        Self {
            host,
            nick,
            realname: None,
            password: String::new(),
            channels: vec!["#test".to_string()],
            ssl: false,
            sasl: false,
            hijack_session: false,
            msg_safety_buffer: false,
            throttle_delay: Duration::from_millis(300),
            ping_timeout: Duration::from_secs(300),
            limit_replies: false,
            reply_message_limit: 5,
            reply_interval: Duration::from_secs(10),
            dial: None,
            tls_config: None,
            hijack_after: None,
        }
    }

    /// Real name sent during registration. Defaults to the nick.
    pub fn realname(mut self, realname: impl Into<String>) -> Self {
        self.realname = Some(realname.into());
        self
    }

    /// Server password, sent as `PASS` during standard registration.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Channels to join after the welcome. `"#name:key"` joins with a key.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Connect over TLS.
    pub fn ssl(mut self) -> Self {
        self.ssl = true;
        self
    }

    /// Authenticate with SASL PLAIN using the nick as account name.
    pub fn sasl_auth(mut self, password: impl Into<String>) -> Self {
        self.sasl = true;
        self.password = password.into();
        self
    }

    /// Try to take over a running instance's session on startup.
    pub fn hijack_session(mut self) -> Self {
        self.hijack_session = true;
        self
    }

    /// Run `callback` in its own task after a successful session hijack.
    pub fn hijack_after<F>(mut self, callback: F) -> Self
    where
        F: Fn(Bot) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.hijack_after = Some(Box::new(callback));
        self
    }

    /// Reserve ten extra bytes of the line budget. Set this if long
    /// messages get truncated on the receiving end.
    pub fn msg_safety_buffer(mut self) -> Self {
        self.msg_safety_buffer = true;
        self
    }

    /// Minimum gap between two outgoing writes. Default 300 ms.
    pub fn throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Maximum time between incoming data before the session is considered
    /// dead. Default 300 s.
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Rate-limit `reply` to `limit` messages per `interval`, dropping the
    /// excess. Default when enabled: 5 per 10 s.
    pub fn limit_replies(mut self, limit: u32, interval: Duration) -> Self {
        self.limit_replies = true;
        self.reply_message_limit = limit;
        self.reply_interval = interval;
        self
    }

    /// Replace the plaintext dialer.
    pub fn dial_fn(mut self, dial: DialFn) -> Self {
        self.dial = Some(dial);
        self
    }

    /// Replace the TLS client configuration.
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Build the bot and register the built-in handlers.
    pub fn build(self) -> Bot {
        let user: String = self.nick.chars().take(9).collect();
        // Worst-case host so the byte budget is conservative until the
        // server advertises our real prefix.
        let host_pad = 157usize
            .saturating_sub(self.nick.len())
            .saturating_sub(user.len());
        let initial_prefix = Prefix::new(self.nick.clone(), user, "*".repeat(host_pad));

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_LEN);
        let realname = self.realname.unwrap_or_else(|| self.nick.clone());

        let bot = Bot {
            inner: Arc::new(Inner {
                host: self.host,
                nick: self.nick.clone(),
                realname,
                password: self.password,
                channels: self.channels,
                ssl: self.ssl,
                sasl: self.sasl,
                hijack_session: self.hijack_session,
                msg_safety_buffer: self.msg_safety_buffer,
                throttle_delay: self.throttle_delay,
                ping_timeout: self.ping_timeout,
                limit_replies: self.limit_replies,
                reply_message_limit: self.reply_message_limit,
                reply_interval: self.reply_interval,
                dial: self.dial,
                tls_config: self.tls_config,
                hijack_after: self.hijack_after,
                started: Instant::now(),
                handlers: RwLock::new(Vec::new()),
                current_nick: Mutex::new(self.nick),
                prefix: RwLock::new(initial_prefix),
                caps: tokio::sync::Mutex::new(CapState::default()),
                outgoing: Mutex::new(outgoing_tx),
                outgoing_rx: Mutex::new(Some(outgoing_rx)),
                close_tx: Mutex::new(watch::channel(false).0),
                joined_tx: Mutex::new(watch::channel(false).0),
                join_once: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                hijacked: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                limiter: Mutex::new(None),
                conn_fd: Mutex::new(None),
                socket_fd: Mutex::new(None),
            }),
        };

        bot.add_trigger(triggers::ping_pong());
        bot.add_trigger(triggers::join_channels());
        bot.add_trigger(triggers::capture_prefix());
        bot.add_trigger(triggers::track_nick());
        bot.add_trigger(triggers::nick_error());
        bot.add_trigger(CapEngine);
        bot.add_trigger(triggers::sasl_fail());
        bot.add_trigger(triggers::sasl_success());
        bot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let bot = Bot::builder("irc.example.org:6667", "mybot").build();
        assert_eq!(bot.host(), "irc.example.org:6667");
        assert_eq!(bot.nick(), "mybot");
        assert_eq!(bot.current_nick(), "mybot");
        assert_eq!(bot.channels(), ["#test"]);
        assert!(!bot.is_closing());
    }

    #[test]
    fn test_initial_prefix_is_conservative() {
        let bot = Bot::builder("irc.example.org:6667", "mybot").build();
        let prefix = bot.prefix();
        assert_eq!(prefix.nick, "mybot");
        assert_eq!(prefix.user, "mybot");
        // nick (5) + user (5) leaves 147 bytes of host padding.
        assert_eq!(prefix.host.len(), 147);
    }

    #[test]
    fn test_long_nick_truncates_initial_user() {
        let bot = Bot::builder("h:1", "averylongnickname").build();
        assert_eq!(bot.prefix().user, "averylong");
    }

    #[test]
    fn test_prefix_change_partial() {
        let bot = Bot::builder("h:1", "nick").build();
        bot.set_prefix(Prefix::new("nick", "user", "host"));
        bot.prefix_change("newnick", "", "");
        assert_eq!(bot.prefix(), Prefix::new("newnick", "user", "host"));
        bot.prefix_change("", "u2", "h2");
        assert_eq!(bot.prefix(), Prefix::new("newnick", "u2", "h2"));
    }

    #[test]
    fn test_display() {
        let bot = Bot::builder("irc.example.org:6667", "mybot")
            .channels(["#a", "#b"])
            .build();
        assert_eq!(
            bot.to_string(),
            "Server: irc.example.org:6667, Channels: [\"#a\", \"#b\"], Nick: mybot"
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let bot = Bot::builder("h:1", "nick").build();
        bot.close();
        assert!(bot.is_closing());
        // Second close takes the already-closing path without panicking.
        bot.close();
        assert!(bot.is_closing());
    }

    #[tokio::test]
    async fn test_join_wave_claims_once() {
        let bot = Bot::builder("h:1", "nick").build();
        assert!(bot.begin_join_wave());
        assert!(!bot.begin_join_wave());
    }

    #[tokio::test]
    async fn test_joined_resolves_after_fire() {
        let bot = Bot::builder("h:1", "nick").build();
        let waiter = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.joined().await })
        };
        bot.fire_joined();
        waiter.await.expect("joined waiter should complete");
    }

    #[tokio::test]
    async fn test_uptime_advances() {
        let bot = Bot::builder("h:1", "nick").build();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(bot.uptime() >= Duration::from_millis(5));
    }
}
