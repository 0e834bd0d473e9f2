//! The hub connection.
//!
//! A [`HubConnection`] keeps exactly one session open to the hub. Inbound
//! bytes are framed and handed to an [`InboundHandler`] in arrival order;
//! outbound messages are newline-terminated and written in send order.
//!
//! Any terminal socket event (peer close, read/write error, idle timeout,
//! receive buffer overflow under [`OverflowPolicy::DropConnection`]) tears the
//! session down and schedules exactly one reconnect after a fixed delay. This
//! repeats indefinitely until [`HubConnection::disconnect`] is called, which
//! also cancels a pending reconnect.

use bytes::{BufMut, Bytes, BytesMut};
use hubwire_protocol::{FrameDecoder, DEFAULT_MAX_BUFFER_SIZE, DELIMITER};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::traits::{
    BoxedStream, ConnectionState, Connector, InboundHandler, TransportError,
};

/// Default hub host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default hub port.
pub const DEFAULT_PORT: u16 = 50005;

/// Default delay between a terminal socket event and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK_SIZE: usize = 4096;

/// What to do when the receive buffer exceeds its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the buffered bytes and keep the session.
    #[default]
    DropBuffer,
    /// Tear the session down and reconnect.
    DropConnection,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Hub host. Must not be empty.
    pub host: String,
    /// Hub port.
    pub port: u16,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Tear the session down after this long without traffic.
    pub idle_timeout: Option<Duration>,
    /// Receive buffer limit; `None` leaves it unbounded.
    pub max_buffer_size: Option<usize>,
    /// Receive buffer overflow policy.
    pub overflow_policy: OverflowPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: None,
            max_buffer_size: Some(DEFAULT_MAX_BUFFER_SIZE),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Configuration for `host:port` with defaults for everything else.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    fn decoder(&self) -> FrameDecoder {
        match self.max_buffer_size {
            Some(limit) => FrameDecoder::with_limit(limit),
            None => FrameDecoder::unbounded(),
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    /// `disconnect()` was requested.
    Shutdown,
    /// Terminal socket event; reconnect.
    Failed(TransportError),
}

/// State shared between the handle and the current connection loop.
struct SessionSlot {
    /// Bumped by every `connect()`. Only the loop started with the current
    /// generation may touch the writer queue or the connection state.
    generation: u64,
    /// Writer queue of the live session, if any.
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    slot: Mutex<SessionSlot>,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `update` under the slot lock if `generation` is still current.
    fn if_current(&self, generation: u64, update: impl FnOnce(&mut SessionSlot)) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation {
            return false;
        }
        update(&mut slot);
        true
    }

    fn set_run_state(&self, generation: u64, state: ConnectionState) {
        self.if_current(generation, |_| self.set_state(state));
    }
}

/// A running connection loop.
struct Worker {
    generation: u64,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the connection loop. Dropped with the last [`HubConnection`] handle.
struct Control {
    worker: Mutex<Option<Worker>>,
}

impl Control {
    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            debug!("Last handle dropped, stopping hub connection");
            worker.task.abort();
        }
    }
}

/// A self-healing session with the hub.
///
/// Cloning is cheap; all clones share the same session. Dropping the last
/// clone stops the background loop.
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<Inner>,
    control: Arc<Control>,
}

impl HubConnection {
    /// Create a connection. Nothing happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state,
                slot: Mutex::new(SessionSlot {
                    generation: 0,
                    outbound: None,
                }),
            }),
            control: Arc::new(Control {
                worker: Mutex::new(None),
            }),
        }
    }

    /// The connection configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether a session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start connecting in the background.
    ///
    /// Every message framed off the wire is passed to `handler`, in order.
    /// Connect failures are logged and retried; they are never returned.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidHost`] if the host is empty (no
    /// attempt is made and nothing is retried), or
    /// [`TransportError::AlreadyStarted`] if the connection is running.
    pub fn connect<H>(&self, handler: H) -> Result<(), TransportError>
    where
        H: InboundHandler + 'static,
    {
        if self.inner.config.host.trim().is_empty() {
            error!("Invalid host configuration");
            return Err(TransportError::InvalidHost);
        }

        let mut worker = self.control.worker();
        if worker.as_ref().is_some_and(|w| !w.task.is_finished()) {
            return Err(TransportError::AlreadyStarted);
        }

        let generation = {
            let mut slot = self.inner.slot();
            slot.generation += 1;
            slot.outbound = None;
            slot.generation
        };

        let (shutdown, cancelled) = watch::channel(false);
        let handler: Arc<dyn InboundHandler> = Arc::new(handler);
        let task = tokio::spawn(run(Arc::clone(&self.inner), handler, generation, cancelled));

        *worker = Some(Worker {
            generation,
            shutdown,
            task,
        });

        Ok(())
    }

    /// Stop the session and cancel any pending reconnect.
    ///
    /// Resolves once the background task has exited; the state is then
    /// [`ConnectionState::Disconnected`] unless `connect` was called again
    /// in the meantime.
    pub async fn disconnect(&self) {
        let worker = self.control.worker().take();
        let Some(worker) = worker else {
            return;
        };

        worker.shutdown.send_replace(true);
        if let Err(e) = worker.task.await {
            error!(error = %e, "Hub connection task failed");
        }

        self.inner.if_current(worker.generation, |slot| {
            slot.outbound = None;
            self.inner.set_state(ConnectionState::Disconnected);
        });
    }

    /// Hand `message` to the transport, followed by the newline delimiter.
    ///
    /// Returning `Ok` means the message was queued on the live session, not
    /// that the hub received it. Nothing is buffered while disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if no session is established.
    pub fn send(&self, message: &str) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            warn!(state = %self.state(), "Cannot send: connection not available");
            return Err(TransportError::NotConnected);
        }

        let slot = self.inner.slot();
        let Some(queue) = slot.outbound.as_ref() else {
            warn!("Cannot send: connection not available");
            return Err(TransportError::NotConnected);
        };

        let mut line = BytesMut::with_capacity(message.len() + 1);
        line.put_slice(message.as_bytes());
        line.put_u8(DELIMITER);

        queue
            .send(line.freeze())
            .map_err(|_| TransportError::NotConnected)?;

        debug!(message = %message, "Sent to hub");
        Ok(())
    }
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connector", &self.inner.connector.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Connection loop: connect, run the session, wait out the delay, repeat.
async fn run(
    inner: Arc<Inner>,
    handler: Arc<dyn InboundHandler>,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let host = inner.config.host.clone();
    let port = inner.config.port;

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        inner.set_run_state(generation, ConnectionState::Connecting);
        info!(host = %host, port, "Connecting to hub");

        let attempt = tokio::time::timeout(
            inner.config.connect_timeout,
            inner.connector.connect(&host, port),
        );

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            result = attempt => result,
        };

        let failure = match connected {
            Ok(Ok(stream)) => {
                info!(host = %host, port, "Connected to hub");
                match session(&inner, generation, stream, handler.as_ref(), &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Failed(e) => e,
                }
            }
            Ok(Err(e)) => e,
            Err(_) => TransportError::ConnectTimeout(inner.config.connect_timeout),
        };

        match failure {
            TransportError::ConnectionClosed => warn!("Disconnected from hub"),
            e => error!(error = %e, "Connection error"),
        }

        inner.set_run_state(generation, ConnectionState::Reconnecting);
        info!(
            host = %host,
            port,
            delay = ?inner.config.reconnect_delay,
            "Reconnecting to hub"
        );

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
    }

    inner.if_current(generation, |slot| {
        slot.outbound = None;
        inner.set_state(ConnectionState::Disconnected);
    });
    info!(host = %host, port, "Hub connection stopped");
}

/// Drive one established session until it ends.
async fn session(
    inner: &Inner,
    generation: u64,
    stream: BoxedStream,
    handler: &dyn InboundHandler,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (queue, mut outbound) = mpsc::unbounded_channel::<Bytes>();

    let installed = inner.if_current(generation, |slot| {
        slot.outbound = Some(queue);
        inner.set_state(ConnectionState::Connected);
    });
    if !installed {
        return SessionEnd::Shutdown;
    }

    let mut decoder = inner.config.decoder();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    // Counts from the last inbound read; outbound writes do not reset it.
    let idle_timeout = inner.config.idle_timeout;
    let idle = tokio::time::sleep(idle_timeout.unwrap_or(Duration::ZERO));
    tokio::pin!(idle);

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => break SessionEnd::Shutdown,

            Some(line) = outbound.recv() => {
                if let Err(e) = writer.write_all(&line).await {
                    break SessionEnd::Failed(e.into());
                }
            }

            read = reader.read(&mut chunk) => match read {
                Ok(0) => break SessionEnd::Failed(TransportError::ConnectionClosed),
                Ok(n) => {
                    if let Some(timeout) = idle_timeout {
                        idle.as_mut().reset(tokio::time::Instant::now() + timeout);
                    }
                    decoder.feed(&chunk[..n]);
                    if let Err(e) = deliver(&mut decoder, handler, inner.config.overflow_policy) {
                        break SessionEnd::Failed(e);
                    }
                }
                Err(e) => break SessionEnd::Failed(e.into()),
            },

            _ = &mut idle, if idle_timeout.is_some() => {
                let timeout = idle_timeout.unwrap_or_default();
                warn!(timeout = ?timeout, "Connection timeout");
                break SessionEnd::Failed(TransportError::IdleTimeout(timeout));
            }
        }
    };

    inner.if_current(generation, |slot| slot.outbound = None);
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Error closing hub stream");
    }

    end
}

/// Hand every complete message in the decoder to the handler.
fn deliver(
    decoder: &mut FrameDecoder,
    handler: &dyn InboundHandler,
    policy: OverflowPolicy,
) -> Result<(), TransportError> {
    loop {
        match decoder.next_message() {
            Ok(Some(message)) => handler.on_message(&message),
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, policy = ?policy, "Receive buffer overflow");
                return match policy {
                    OverflowPolicy::DropBuffer => Ok(()),
                    OverflowPolicy::DropConnection => Err(e.into()),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::DuplexStream;
    use tokio::time::Instant;

    /// Hands one end of an in-memory pipe to the connection and the other to the test.
    struct MockConnector {
        attempts: Mutex<Vec<Instant>>,
        refuse: AtomicBool,
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    impl MockConnector {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
            let (peers, rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                attempts: Mutex::new(Vec::new()),
                refuse: AtomicBool::new(false),
                peers,
            });
            (connector, rx)
        }

        fn refusing() -> Arc<Self> {
            let (connector, _) = Self::new();
            connector.refuse.store(true, Ordering::SeqCst);
            connector
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _host: &str, _port: u16) -> Result<BoxedStream, TransportError> {
            self.attempts.lock().unwrap().push(Instant::now());
            if self.refuse.load(Ordering::SeqCst) {
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
            }
            let (client, peer) = tokio::io::duplex(64 * 1024);
            let _ = self.peers.send(peer);
            Ok(Box::new(client))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |m: &str| sink.lock().unwrap().push(m.to_string()))
    }

    async fn wait_for(connection: &HubConnection, target: ConnectionState) {
        let mut rx = connection.watch_state();
        tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == target))
            .await
            .expect("state not reached")
            .expect("state channel closed");
    }

    async fn read_line(peer: &mut DuplexStream) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            peer.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\n' {
                return String::from_utf8(out).unwrap();
            }
            out.push(byte[0]);
        }
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(matches!(
            connection.send("{\"deviceType\":\"Switch\",\"id\":1,\"command\":\"power\"}"),
            Err(TransportError::NotConnected)
        ));
        assert!(connector.attempts().is_empty());
        assert!(peers.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_host_never_attempted() {
        let (connector, _peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::new("", 50005), connector.clone());

        assert!(matches!(
            connection.connect(|_: &str| {}),
            Err(TransportError::InvalidHost)
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(connector.attempts().is_empty());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_appends_delimiter() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector);
        connection.connect(|_: &str| {}).unwrap();

        let mut peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        connection.send("first").unwrap();
        connection.send("second").unwrap();
        assert_eq!(read_line(&mut peer).await, "first");
        assert_eq!(read_line(&mut peer).await, "second");

        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_inbound_messages_in_order() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector);
        let (seen, handler) = collector();
        connection.connect(handler).unwrap();

        let mut peer = peers.recv().await.unwrap();
        peer.write_all(b"{\"a\":1}\n{\"a\":2}\n{\"a\"").await.unwrap();
        peer.write_all(b":3}\n\n{\"a\":4}").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().len() < 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["{\"a\":1}", "{\"a\":2}", "{\"a\":3}", "{\"a\":4}"]
        );
        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_scheduled_after_fixed_delay() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        let closed_at = Instant::now();
        drop(peer);
        wait_for(&connection, ConnectionState::Reconnecting).await;

        tokio::time::sleep_until(closed_at + Duration::from_millis(4_900)).await;
        assert_eq!(connector.attempts().len(), 1, "no attempt before the delay");

        tokio::time::sleep_until(closed_at + Duration::from_millis(5_500)).await;
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2, "exactly one reconnect attempt");
        assert!(attempts[1] - closed_at >= DEFAULT_RECONNECT_DELAY);

        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_indefinitely_without_backoff() {
        let connector = MockConnector::refusing();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        tokio::time::sleep(Duration::from_millis(22_500)).await;

        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 5);
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], DEFAULT_RECONNECT_DELAY);
        }
        assert_eq!(connection.state(), ConnectionState::Reconnecting);

        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = MockConnector::refusing();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        wait_for(&connection, ConnectionState::Reconnecting).await;
        connection.disconnect().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connected() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let _peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        connection.disconnect().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.attempts().len(), 1);
        assert!(matches!(connection.send("x"), Err(TransportError::NotConnected)));

        // A stopped connection can be started again.
        connection.connect(|_: &str| {}).unwrap();
        let _peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;
        assert_eq!(connector.attempts().len(), 2);
        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let (connector, _peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector);
        connection.connect(|_: &str| {}).unwrap();
        assert!(matches!(
            connection.connect(|_: &str| {}),
            Err(TransportError::AlreadyStarted)
        ));
        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_drop_buffer_keeps_session() {
        let (connector, mut peers) = MockConnector::new();
        let config = ConnectionConfig {
            max_buffer_size: Some(32),
            ..Default::default()
        };
        let connection = HubConnection::new(config, connector.clone());
        let (seen, handler) = collector();
        connection.connect(handler).unwrap();

        let mut peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        peer.write_all(&[b'{'; 64]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        peer.write_all(b"{\"ok\":true}\n").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["{\"ok\":true}"]);
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts().len(), 1);
        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_drop_connection_reconnects() {
        let (connector, mut peers) = MockConnector::new();
        let config = ConnectionConfig {
            max_buffer_size: Some(32),
            overflow_policy: OverflowPolicy::DropConnection,
            ..Default::default()
        };
        let connection = HubConnection::new(config, connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let mut peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        peer.write_all(&[b'{'; 64]).await.unwrap();
        wait_for(&connection, ConnectionState::Reconnecting).await;

        let _second = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;
        assert_eq!(connector.attempts().len(), 2);
        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_reconnects() {
        let (connector, mut peers) = MockConnector::new();
        let config = ConnectionConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let connection = HubConnection::new(config, connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let _peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;
        wait_for(&connection, ConnectionState::Reconnecting).await;

        let _second = peers.recv().await.unwrap();
        assert_eq!(connector.attempts().len(), 2);
        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_ignores_outbound_traffic() {
        let (connector, mut peers) = MockConnector::new();
        let config = ConnectionConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let connection = HubConnection::new(config, connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let _silent_peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;
        let connected_at = Instant::now();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(9)).await;
            connection.send("{}").unwrap();
        }
        assert_eq!(connection.state(), ConnectionState::Connected);

        wait_for(&connection, ConnectionState::Reconnecting).await;
        let idle_for = connected_at.elapsed();
        assert!(idle_for >= Duration::from_secs(30), "timed out early: {idle_for:?}");
        assert!(idle_for < Duration::from_secs(31), "timed out late: {idle_for:?}");

        let _second = peers.recv().await.unwrap();
        assert_eq!(connector.attempts().len(), 2);
        connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_traffic_resets_idle_timeout() {
        let (connector, mut peers) = MockConnector::new();
        let config = ConnectionConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let connection = HubConnection::new(config, connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let mut peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            peer.write_all(b"{\"a\":1}\n").await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts().len(), 1);
        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_during_disconnect_keeps_new_session() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let _first = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;

        let stopping = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.disconnect().await })
        };
        tokio::task::yield_now().await;

        // The old loop may still be winding down.
        connection.connect(|_: &str| {}).unwrap();
        stopping.await.unwrap();

        let mut second = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts().len(), 2);
        connection.send("after restart").unwrap();
        assert_eq!(read_line(&mut second).await, "after restart");

        connection.disconnect().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_stops_reconnecting() {
        let connector = MockConnector::refusing();
        let connection = HubConnection::new(ConnectionConfig::default(), connector.clone());
        connection.connect(|_: &str| {}).unwrap();

        let clone = connection.clone();
        wait_for(&connection, ConnectionState::Reconnecting).await;
        drop(connection);

        // A remaining clone keeps the loop alive.
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(connector.attempts().len(), 2);

        drop(clone);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_dropping_last_handle_closes_session() {
        let (connector, mut peers) = MockConnector::new();
        let connection = HubConnection::new(ConnectionConfig::default(), connector);
        connection.connect(|_: &str| {}).unwrap();

        let mut peer = peers.recv().await.unwrap();
        wait_for(&connection, ConnectionState::Connected).await;
        drop(connection);

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
            .await
            .expect("session not closed");
        assert_eq!(read.unwrap(), 0);
    }
}
