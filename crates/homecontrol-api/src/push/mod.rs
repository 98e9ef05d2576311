//! Push event channel with automatic session recovery.
//!
//! Opens the gateway's event WebSocket and forwards every change
//! notification, in delivery order, through a bounded [`mpsc`] channel to
//! a single consumer. Connection handling is driven by the pure
//! [`PushMachine`]; this module only carries out its effects.
//!
//! When the socket fails, a fresh session is established (locally when a
//! LAN address is cached, else through the cloud) and swapped into the
//! shared [`SessionSlot`](crate::rpc::SessionSlot) so RPC callers pick it
//! up. Failed attempts back off from 16s to at most an hour, forever,
//! until [`PushChannel::disconnect`] is called.
//!
//! ```rust,ignore
//! let (push, mut rx) = PushChannel::start(rpc, establisher, local_addr, PushConfig::default());
//! push.wait_until_established(DEFAULT_ESTABLISH_TIMEOUT).await?;
//!
//! while let Some(notification) = rx.recv().await {
//!     println!("{:?} changed", notification.uid());
//! }
//! ```

mod machine;
mod sequence;

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::rpc::RpcClient;
use crate::session::{Session, SessionEstablisher};

pub use machine::{Backoff, ConnectionState, Effect, PushEvent, PushMachine, ReconnectConfig};
pub use sequence::{SEQUENCE_KEY, SequenceTracker};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENTS_PATH: &str = "/remote/events/";
const TOPICS: &str = "com/prosyst/mbs/services/fim/FunctionalItemEvent/PROPERTY_CHANGED,\
                      com/prosyst/mbs/services/fim/FunctionalItemEvent/UNREGISTERED";
const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// How long callers wait for the channel by default.
pub const DEFAULT_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(600);

// ── PushConfig ───────────────────────────────────────────────────────

/// Keep-alive and reconnect settings.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Interval between keep-alive pings. Default: 30s.
    pub ping_interval: Duration,
    /// How long a ping may stay unanswered. Default: 5s.
    pub pong_timeout: Duration,
    /// Watchdog check period while open. Default: 1s.
    pub watchdog_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── PushNotification ─────────────────────────────────────────────────

/// One change notification as sent by the gateway.
///
/// Only `properties` is interpreted; keys are the gateway's dotted names
/// (`uid`, `property.name`, `property.value.new`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct PushNotification {
    pub properties: serde_json::Map<String, Value>,
}

impl PushNotification {
    /// Uid of the functional item the notification is about.
    pub fn uid(&self) -> Option<&str> {
        self.properties.get("uid").and_then(Value::as_str)
    }

    /// Name of the changed property.
    pub fn property_name(&self) -> Option<&str> {
        self.properties.get("property.name").and_then(Value::as_str)
    }

    /// The new property value.
    pub fn new_value(&self) -> Option<&Value> {
        self.properties.get("property.value.new")
    }

    /// Gateway sequence number.
    pub fn sequence(&self) -> Option<u64> {
        self.properties.get(SEQUENCE_KEY).and_then(Value::as_u64)
    }
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to the running push channel.
pub struct PushChannel {
    state: watch::Receiver<ConnectionState>,
    established: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    /// Spawn the channel task and return its handle plus the notification
    /// receiver. The first connection attempt happens asynchronously.
    pub fn start(
        rpc: RpcClient,
        establisher: Arc<SessionEstablisher>,
        local_addr: Option<SocketAddrV4>,
        config: PushConfig,
    ) -> (Self, mpsc::Receiver<PushNotification>) {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (established_tx, established_rx) = watch::channel(false);
        let (ping_tx, _) = watch::channel(None);
        let cancel = CancellationToken::new();

        let driver = Driver {
            machine: PushMachine::new(config.reconnect.clone()),
            config,
            rpc,
            establisher,
            local_addr,
            notifications: notify_tx,
            state: state_tx,
            established: established_tx,
            ping_outstanding: ping_tx,
            sequence: SequenceTracker::new(),
            socket: None,
            watchdog: None,
        };
        let task = tokio::spawn(driver.run(cancel.clone()));

        let channel = Self {
            state: state_rx,
            established: established_rx,
            cancel,
            task: Some(task),
        };
        (channel, notify_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_established(&self) -> bool {
        *self.established.borrow()
    }

    /// Wait until the socket is open.
    ///
    /// Fails with [`Error::GatewayOffline`] when `timeout` runs out first
    /// or the channel has stopped.
    pub async fn wait_until_established(&self, timeout: Duration) -> Result<(), Error> {
        let mut rx = self.established.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|established| *established)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::offline("push channel stopped")),
            Err(_) => Err(Error::offline(format!(
                "push channel not established within {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Close the channel. Interrupts a pending backoff sleep; no reconnect
    /// happens afterwards.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Disconnect and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "push channel task ended abnormally");
            }
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Driver ───────────────────────────────────────────────────────────

struct Watchdog {
    handle: JoinHandle<()>,
    tripped: CancellationToken,
}

/// Background task state. Owns the socket and the state machine.
struct Driver {
    machine: PushMachine,
    config: PushConfig,
    rpc: RpcClient,
    establisher: Arc<SessionEstablisher>,
    local_addr: Option<SocketAddrV4>,
    notifications: mpsc::Sender<PushNotification>,
    state: watch::Sender<ConnectionState>,
    established: watch::Sender<bool>,
    /// When the unanswered keep-alive ping was sent.
    ping_outstanding: watch::Sender<Option<Instant>>,
    sequence: SequenceTracker,
    socket: Option<WsStream>,
    watchdog: Option<Watchdog>,
}

impl Driver {
    async fn run(mut self, cancel: CancellationToken) {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            () = self.drive() => {}
        }
        self.close().await;
        debug!("push channel task exiting");
    }

    /// Feed events into the machine and carry out its effects.
    async fn drive(&mut self) {
        let mut event = PushEvent::ConnectRequested;
        loop {
            let effects = self.machine.handle(event);
            self.state.send_replace(self.machine.state());

            let mut next = None;
            for effect in effects {
                if let Some(ev) = self.apply(effect).await {
                    next = Some(ev);
                }
            }

            event = match next {
                Some(ev) => ev,
                None if self.machine.state().is_open() => self.read_until_error().await,
                None => {
                    debug!(state = %self.machine.state(), "push channel has nothing left to do");
                    return;
                }
            };
        }
    }

    async fn close(&mut self) {
        for effect in self.machine.handle(PushEvent::CloseRequested) {
            // Close effects never produce a follow-up event.
            let _ = self.apply(effect).await;
        }
        self.state.send_replace(self.machine.state());
        info!("push channel closed");
    }

    async fn apply(&mut self, effect: Effect) -> Option<PushEvent> {
        trace!(?effect, "push effect");
        match effect {
            Effect::OpenSocket => return Some(self.open_socket().await),
            Effect::CloseSocket => self.close_socket().await,
            Effect::StartWatchdog => self.start_watchdog(),
            Effect::StopWatchdog => {
                if let Some(watchdog) = self.watchdog.take() {
                    watchdog.handle.abort();
                }
            }
            Effect::MarkEstablished => {
                self.established.send_replace(true);
            }
            Effect::MarkNotEstablished => {
                self.established.send_replace(false);
            }
            Effect::MarkReachable => self.establisher.gateway().set_online(true),
            Effect::MarkUnreachable => self.establisher.gateway().set_online(false),
            Effect::ResetSequence => {
                self.sequence.reset();
                self.ping_outstanding.send_replace(None);
            }
            Effect::RestoreSession => return Some(self.restore_session().await),
            Effect::ScheduleReconnect(delay) => {
                info!(delay_secs = delay.as_secs(), "sleeping before next reconnect attempt");
                tokio::time::sleep(delay).await;
                return Some(PushEvent::BackoffElapsed);
            }
            Effect::RefreshSession => {
                let rpc = self.rpc.clone();
                tokio::spawn(async move {
                    if let Err(e) = rpc.refresh_session().await {
                        debug!(error = %e, "session refresh failed");
                    }
                });
            }
        }
        None
    }

    // ── Effects ──────────────────────────────────────────────────────

    async fn open_socket(&mut self) -> PushEvent {
        let session = self.rpc.session();
        match connect(&session, self.establisher.gateway().id()).await {
            Ok(stream) => {
                self.socket = Some(stream);
                PushEvent::Opened
            }
            Err(e) => {
                warn!(error = %e, "push channel could not be opened");
                PushEvent::TransportError
            }
        }
    }

    async fn close_socket(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };
        match tokio::time::timeout(self.config.pong_timeout, socket.close(None)).await {
            Ok(Ok(())) => debug!("push socket closed"),
            Ok(Err(e)) => debug!(error = %e, "push socket close failed"),
            Err(_) => debug!("push socket close timed out"),
        }
    }

    fn start_watchdog(&mut self) {
        let ping_rx = self.ping_outstanding.subscribe();
        let tripped = CancellationToken::new();
        let trip = tripped.clone();
        let period = self.config.watchdog_interval;
        let pong_timeout = self.config.pong_timeout;

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                let overdue = ping_rx
                    .borrow()
                    .is_some_and(|sent| sent.elapsed() > pong_timeout);
                if overdue {
                    trip.cancel();
                    return;
                }
            }
        });

        if let Some(old) = self.watchdog.replace(Watchdog { handle, tripped }) {
            old.handle.abort();
        }
    }

    async fn restore_session(&mut self) -> PushEvent {
        info!("trying to reconnect to the gateway");
        match self.establisher.establish(self.local_addr).await {
            Ok(session) => {
                info!(local = session.is_local(), "session restored");
                self.rpc.session_slot().store(Arc::new(session));
                PushEvent::SessionRestored
            }
            Err(e) if e.is_transient() => {
                info!(error = %e, "gateway still unreachable");
                PushEvent::SessionFailed
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "session cannot be restored without intervention, still retrying");
                PushEvent::SessionFailed
            }
            Err(e) => {
                warn!(error = %e, "session could not be restored");
                PushEvent::SessionFailed
            }
        }
    }

    /// Read frames until the socket fails. Returns early with
    /// [`PushEvent::Pong`] whenever a keep-alive answer arrives.
    async fn read_until_error(&mut self) -> PushEvent {
        let Some(socket) = self.socket.as_mut() else {
            return PushEvent::TransportError;
        };
        let tripped = self
            .watchdog
            .as_ref()
            .map(|w| w.tripped.clone())
            .unwrap_or_default();
        let period = self.config.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                () = tripped.cancelled() => {
                    let err = Error::PongTimeout {
                        timeout_secs: self.config.pong_timeout.as_secs(),
                    };
                    warn!(error = %err, "push channel lost");
                    return PushEvent::TransportError;
                }
                _ = ping.tick() => {
                    if let Err(e) = socket.send(tungstenite::Message::Ping(Vec::new().into())).await {
                        warn!(error = %e, "keep-alive ping failed");
                        return PushEvent::TransportError;
                    }
                    self.ping_outstanding.send_replace(Some(Instant::now()));
                }
                frame = socket.next() => match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        forward(&text, &mut self.sequence, &self.notifications).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("keep-alive pong");
                        self.ping_outstanding.send_replace(None);
                        return PushEvent::Pong;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let err = frame.map_or_else(
                            || Error::WebSocketClosed { code: 1005, reason: String::new() },
                            |cf| Error::WebSocketClosed {
                                code: cf.code.into(),
                                reason: cf.reason.to_string(),
                            },
                        );
                        warn!(error = %err, "push channel lost");
                        return PushEvent::TransportError;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "push channel lost");
                        return PushEvent::TransportError;
                    }
                    None => {
                        warn!("push channel stream ended");
                        return PushEvent::TransportError;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Event socket URL for a session base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`. Events are limited to
/// property changes and removals of this gateway's items or of items
/// carrying no gateway id at all.
pub fn events_url(base: &Url, gateway_id: &str) -> Result<Url, Error> {
    let mut url = base.join(EVENTS_PATH)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot derive WebSocket URL from {base}")))?;
    url.set_query(Some(&format!(
        "topics={TOPICS}&filter=(|(GW_ID={gateway_id})(!(GW_ID=*)))"
    )));
    Ok(url)
}

/// Open the event socket, forwarding the session cookies.
async fn connect(session: &Session, gateway_id: &str) -> Result<WsStream, Error> {
    let url = events_url(session.base_url(), gateway_id)?;
    info!(url = %url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(cookie) = session.cookie_header() {
        request = request.with_header("Cookie", cookie);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    info!("push channel connected");
    Ok(stream)
}

/// Parse a text frame, track its sequence number and hand it on.
async fn forward(
    text: &str,
    sequence: &mut SequenceTracker,
    notifications: &mpsc::Sender<PushNotification>,
) {
    let notification: PushNotification = match serde_json::from_str(text) {
        Ok(n) => n,
        Err(e) => {
            debug!(error = %e, "ignoring unparsable push message");
            return;
        }
    };

    if let Some(number) = notification.sequence() {
        sequence.observe(number);
    }

    if notifications.send(notification).await.is_err() {
        debug!("no consumer for push notifications");
    }
}

// ── Tests ────────────────────────────────────────────────────────────
