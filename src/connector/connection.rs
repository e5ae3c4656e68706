//! Connector
//!
//! Single responsibility: own the one WebSocket session with the STP service.
//!
//! # State Machine
//!
//! ```text
//!  Disconnected ──connect──► Connecting ──Register ack──► Open
//!       ▲                        │                         │ │
//!       └────── failure ─────────┘                         │ │
//!       ▲                                                  │ │
//!       ├────────────── socket error (reported) ───────────┘ │
//!       │                                                    │ unexpected close
//!       │                                                    ▼
//!       └──── reconnect failed (reported once) ◄──── Reconnecting ──► Open
//! ```
//!
//! `disconnect()` moves through `Closing` to `Disconnected` and never triggers
//! a reconnect.
//!
//! # Reconnection Policy
//!
//! One attempt per unexpected close, reusing the remembered service name,
//! solvables, machine id, and the session id the service assigned last time.
//! If that attempt fails the observer hears about it once and the connector
//! stays down until the application calls `connect()` again.
//!
//! # Inbound Routing
//!
//! One reader task per socket pulls frames in order. `RequestResponse`
//! envelopes go to the correlator; everything else goes to the observer.
//! The reader only holds a `Weak` reference, so dropping the last `Connector`
//! ends it.

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::correlator::Correlator;
use super::protocol::{
    decode_reply, registered_session_id, Envelope, RegisterParams, METHOD_REGISTER,
    METHOD_REQUEST_RESPONSE,
};
use super::timeout::{effective_timeout, race, DEFAULT_TIMEOUT};
use super::transport::{self, Inbound, Transport, WsSink, WsStream};
use crate::error::StpError;
use crate::identity;

/// Transport state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    Closing,
}

/// Receives everything the connector does not consume itself.
///
/// Called from the reader task, one frame at a time, in arrival order.
pub trait ConnectionObserver: Send + Sync {
    /// An inbound envelope that is not a request reply.
    fn on_notification(&self, envelope: Envelope);

    /// The connection failed outside of any caller's operation.
    fn on_connection_error(&self, error: &StpError);
}

/// Configuration for the connector.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// STP service WebSocket URL
    pub url: String,
    /// Language/runtime tag sent in Register
    pub language: String,
    /// Fixed machine id; generated once per connector when unset
    pub machine_id: Option<String>,
    /// Timeout for calls that do not supply one
    pub default_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9555".to_string(),
            language: "Rust".to_string(),
            machine_id: None,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// What the last successful registration announced.
#[derive(Debug, Clone)]
struct Registration {
    service_name: String,
    solvables: Vec<String>,
    session_id: String,
}

/// The live socket.
struct Link {
    generation: u64,
    sink: Arc<Mutex<WsSink>>,
    reader: JoinHandle<()>,
}

struct Shared {
    config: ConnectorConfig,
    machine_id: String,
    state: RwLock<ConnectionState>,
    link: Mutex<Option<Link>>,
    generation: AtomicU64,
    registration: RwLock<Option<Registration>>,
    /// Serializes connect attempts
    connect_lock: Mutex<()>,
    correlator: Correlator,
    observer: Arc<dyn ConnectionObserver>,
    reconnect_attempts: AtomicU32,
}

/// Handle to the STP session. Cheap to clone; all clones share one socket.
#[derive(Clone)]
pub struct Connector {
    shared: Arc<Shared>,
}

impl Connector {
    pub fn new(config: ConnectorConfig, observer: Arc<dyn ConnectionObserver>) -> Self {
        let machine_id = config
            .machine_id
            .clone()
            .unwrap_or_else(identity::machine_id);

        Self {
            shared: Arc::new(Shared {
                config,
                machine_id,
                state: RwLock::new(ConnectionState::Disconnected),
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
                registration: RwLock::new(None),
                connect_lock: Mutex::new(()),
                correlator: Correlator::new(),
                observer,
                reconnect_attempts: AtomicU32::new(0),
            }),
        }
    }

    /// Connect and register, returning the session id.
    ///
    /// Returns the existing session id without re-registering when already open.
    ///
    /// # Errors
    /// - `ConnectFailed` when the socket cannot be opened
    /// - `Registration` when the service rejects Register
    /// - `Timeout` when the whole sequence exceeds `timeout`
    pub async fn connect(
        &self,
        service_name: &str,
        solvables: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<String, StpError> {
        let timeout = self.timeout_for(timeout);
        let shared = Arc::clone(&self.shared);
        let service_name = service_name.to_string();

        race("connect", timeout, async move {
            shared
                .establish(service_name, solvables, timeout, ConnectionState::Connecting)
                .await
        })
        .await
    }

    /// Close the session. A no-op when already disconnected.
    pub async fn disconnect(&self, timeout: Option<Duration>) -> Result<(), StpError> {
        let timeout = self.timeout_for(timeout);
        let shared = Arc::clone(&self.shared);
        race("disconnect", timeout, async move { shared.shutdown().await }).await
    }

    /// Send a fire-and-forget envelope.
    pub async fn inform(&self, envelope: Envelope, timeout: Option<Duration>) -> Result<(), StpError> {
        let timeout = self.timeout_for(timeout);
        let shared = Arc::clone(&self.shared);

        race("inform", timeout, async move {
            shared.ensure_open().await?;
            debug!(method = %envelope.method, "Sending notification");
            let frame = envelope.encode()?;
            shared.send_frame(frame).await
        })
        .await
    }

    /// Send a correlated request and wait for the service's result.
    ///
    /// # Errors
    /// - `NotConnected` unless the connection is open
    /// - `Timeout` when no reply arrives in time
    /// - `Application` carrying the service's payload on `success: false`
    pub async fn request(&self, envelope: Envelope, timeout: Option<Duration>) -> Result<Value, StpError> {
        let timeout = self.timeout_for(timeout);
        self.shared.ensure_open().await?;
        self.shared.issue(&envelope, timeout).await
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Session id assigned by the service at the last registration.
    pub async fn session_id(&self) -> Option<String> {
        self.shared
            .registration
            .read()
            .await
            .as_ref()
            .map(|r| r.session_id.clone())
    }

    pub fn machine_id(&self) -> &str {
        &self.shared.machine_id
    }

    /// How many automatic reconnects have been attempted.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Requests still waiting for a reply.
    pub async fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count().await
    }

    fn timeout_for(&self, requested: Option<Duration>) -> Duration {
        effective_timeout(requested, self.shared.config.default_timeout)
    }
}

impl Shared {
    async fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write().await;
        if *current != state {
            debug!(from = ?*current, to = ?state, "Connection state change");
            *current = state;
        }
    }

    async fn ensure_open(&self) -> Result<(), StpError> {
        if *self.state.read().await == ConnectionState::Open {
            Ok(())
        } else {
            Err(StpError::NotConnected)
        }
    }

    /// Open a socket and register on it; `transitional` is the state shown meanwhile.
    async fn establish(
        self: Arc<Self>,
        service_name: String,
        solvables: Vec<String>,
        timeout: Duration,
        transitional: ConnectionState,
    ) -> Result<String, StpError> {
        let _guard = self.connect_lock.lock().await;

        let current = *self.state.read().await;
        if current == ConnectionState::Open {
            if let Some(registration) = self.registration.read().await.as_ref() {
                debug!(session_id = %registration.session_id, "Already connected");
                return Ok(registration.session_id.clone());
            }
        }
        // A disconnect that got the lock first wins over a pending reconnect.
        if transitional == ConnectionState::Reconnecting && current != ConnectionState::Reconnecting {
            debug!(state = ?current, "Reconnect abandoned, connection closed meanwhile");
            return Err(StpError::Closed("Disconnected before reconnect".into()));
        }

        self.set_state(transitional).await;

        info!(
            url = %self.config.url,
            service_name = %service_name,
            solvables = ?solvables,
            "Connecting to STP service"
        );

        let reconnecting = transitional == ConnectionState::Reconnecting;
        match self
            .open_and_register(&service_name, &solvables, timeout, reconnecting)
            .await
        {
            Ok(session_id) => {
                *self.registration.write().await = Some(Registration {
                    service_name,
                    solvables,
                    session_id: session_id.clone(),
                });
                self.set_state(ConnectionState::Open).await;
                info!(session_id = %session_id, "STP session registered");
                Ok(session_id)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to STP service");
                self.drop_link().await;
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    async fn open_and_register(
        self: &Arc<Self>,
        service_name: &str,
        solvables: &[String],
        timeout: Duration,
        reconnecting: bool,
    ) -> Result<String, StpError> {
        let transport = Transport::connect(&self.config.url).await?;
        let (sink, stream) = transport.split();
        self.install_link(sink, stream).await;

        let previous = if reconnecting {
            self.registration
                .read()
                .await
                .as_ref()
                .map(|r| r.session_id.clone())
        } else {
            None
        };
        let session_id = previous.unwrap_or_else(|| identity::client_name(service_name));

        let register = Envelope::with_params(
            METHOD_REGISTER,
            &RegisterParams {
                service_name: service_name.to_string(),
                language: self.config.language.clone(),
                solvables: solvables.to_vec(),
                machine_id: self.machine_id.clone(),
                session_id: session_id.clone(),
            },
        )?;

        let result = self.issue(&register, timeout).await.map_err(|e| match e {
            StpError::Application(detail) => StpError::Registration(describe(&detail)),
            other => other,
        })?;

        Ok(registered_session_id(&result).unwrap_or(session_id))
    }

    /// Make a fresh socket current, retiring any previous one.
    async fn install_link(self: &Arc<Self>, sink: WsSink, stream: WsStream) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let reader = tokio::spawn(reader_loop(Arc::downgrade(self), generation, stream));

        let previous = self.link.lock().await.replace(Link {
            generation,
            sink: Arc::new(Mutex::new(sink)),
            reader,
        });
        if let Some(old) = previous {
            retire(old).await;
        }
    }

    async fn drop_link(&self) {
        // Bump first so the retiring reader's close is recognised as stale.
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(old) = self.link.lock().await.take() {
            retire(old).await;
        }
    }

    async fn send_frame(&self, frame: String) -> Result<(), StpError> {
        let sink = self
            .link
            .lock()
            .await
            .as_ref()
            .map(|link| Arc::clone(&link.sink))
            .ok_or(StpError::NotConnected)?;

        let mut sink = sink.lock().await;
        transport::send_text(&mut sink, frame).await
    }

    async fn issue(&self, envelope: &Envelope, timeout: Duration) -> Result<Value, StpError> {
        self.correlator
            .issue(envelope, timeout, |frame| self.send_frame(frame))
            .await
    }

    async fn shutdown(self: Arc<Self>) -> Result<(), StpError> {
        // A Register in flight holds the connect lock; cut it short.
        let state = *self.state.read().await;
        if matches!(state, ConnectionState::Connecting | ConnectionState::Reconnecting) {
            self.correlator
                .fail_method(METHOD_REGISTER, || {
                    StpError::Closed("Disconnected by client".into())
                })
                .await;
        }

        let _guard = self.connect_lock.lock().await;

        if *self.state.read().await == ConnectionState::Disconnected && self.link.lock().await.is_none() {
            debug!("Disconnect requested while already disconnected");
            return Ok(());
        }

        info!("Disconnecting from STP service");
        self.set_state(ConnectionState::Closing).await;
        self.drop_link().await;
        self.correlator.fail_all("Disconnected by client").await;
        self.set_state(ConnectionState::Disconnected).await;
        Ok(())
    }

    async fn handle_frame(&self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        if envelope.method == METHOD_REQUEST_RESPONSE {
            match decode_reply(&envelope) {
                Ok(reply) => {
                    let cookie = reply.cookie;
                    if !self.correlator.resolve(reply).await {
                        debug!(cookie = cookie, "Dropping reply for unknown cookie");
                    }
                }
                Err(e) => warn!(error = %e, "Dropping malformed reply"),
            }
        } else {
            self.observer.on_notification(envelope);
        }
    }

    /// The reader for `generation` has stopped.
    async fn handle_link_end(self: Arc<Self>, generation: u64, failure: Option<String>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation = generation, "Stale link ended");
            return;
        }
        let state = *self.state.read().await;
        match state {
            ConnectionState::Open => {}
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                // Register is in flight on this link and can no longer be answered.
                let reason = failure
                    .unwrap_or_else(|| "Connection closed during registration".to_string());
                warn!(error = %reason, "STP connection lost while registering");
                self.correlator
                    .fail_method(METHOD_REGISTER, || StpError::Transport(reason.clone()))
                    .await;
                return;
            }
            state => {
                debug!(generation = generation, state = ?state, "Link ended outside the open state");
                return;
            }
        }

        match failure {
            Some(diagnostic) => {
                error!(error = %diagnostic, "STP connection failed");
                self.set_state(ConnectionState::Disconnected).await;
                self.release_own_link().await;
                self.observer
                    .on_connection_error(&StpError::Transport(diagnostic));
            }
            None => {
                let Some(registration) = self.registration.read().await.clone() else {
                    self.set_state(ConnectionState::Disconnected).await;
                    return;
                };
                warn!("STP service closed the connection, attempting one reconnect");
                self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                self.set_state(ConnectionState::Reconnecting).await;
                // Runs apart from the reader so replacing the link cannot abort it.
                tokio::spawn(self.reconnect(registration));
            }
        }
    }

    /// Called from the reader of the current link: drop the link without
    /// aborting the task we are running on.
    async fn release_own_link(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let link = self.link.lock().await.take();
        // Dropping the JoinHandle detaches the reader; dropping the sink closes the socket.
        drop(link);
    }

    /// Boxed to break the reader -> reconnect -> reader future type cycle.
    fn reconnect(self: Arc<Self>, registration: Registration) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let timeout = effective_timeout(None, self.config.default_timeout);
            let shared = Arc::clone(&self);
            let result = race("reconnect", timeout, async move {
                shared
                    .establish(
                        registration.service_name,
                        registration.solvables,
                        timeout,
                        ConnectionState::Reconnecting,
                    )
                    .await
            })
            .await;

            match result {
                Ok(session_id) => info!(session_id = %session_id, "Reconnected to STP service"),
                Err(StpError::Closed(reason)) => {
                    debug!(reason = %reason, "Reconnect dropped after client disconnect");
                }
                Err(e) => {
                    error!(error = %e, "Reconnect failed, giving up");
                    if *self.state.read().await != ConnectionState::Open {
                        self.set_state(ConnectionState::Disconnected).await;
                    }
                    self.observer
                        .on_connection_error(&StpError::ReconnectFailed(e.to_string()));
                }
            }
        })
    }
}

async fn retire(link: Link) {
    debug!(generation = link.generation, "Retiring link");
    link.reader.abort();
    let mut sink = link.sink.lock().await;
    if let Err(e) = transport::close(&mut sink).await {
        debug!(error = %e, "Close on retired link failed");
    }
}

/// Reader loop - runs in a spawned task, one per socket.
async fn reader_loop(shared: Weak<Shared>, generation: u64, mut stream: WsStream) {
    debug!(generation = generation, "Reader loop started");

    let failure = loop {
        match transport::recv_text(&mut stream).await {
            Inbound::Text(text) => {
                let Some(strong) = shared.upgrade() else {
                    return;
                };
                strong.handle_frame(&text).await;
            }
            Inbound::Closed => break None,
            Inbound::Failed(diagnostic) => break Some(diagnostic),
        }
    };

    debug!(generation = generation, "Reader loop ended");

    if let Some(shared) = shared.upgrade() {
        shared.handle_link_end(generation, failure).await;
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.reader.abort();
            debug!(generation = link.generation, "Connector dropped, reader aborted");
        }
    }
}

/// Human-readable form of a rejection payload.
fn describe(detail: &Value) -> String {
    match detail {
        Value::String(message) => message.clone(),
        Value::Null => "no reason given".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NullObserver;

    impl ConnectionObserver for NullObserver {
        fn on_notification(&self, _envelope: Envelope) {}
        fn on_connection_error(&self, _error: &StpError) {}
    }

    fn unreachable_connector() -> Connector {
        let config = ConnectorConfig {
            url: "ws://127.0.0.1:1".to_string(),
            machine_id: Some("machine-1".to_string()),
            ..Default::default()
        };
        Connector::new(config, Arc::new(NullObserver))
    }

    #[test]
    fn test_connector_config_default() {
        let config = ConnectorConfig::default();
        assert_eq!(config.url, "ws://localhost:9555");
        assert_eq!(config.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_machine_id_generated_once() {
        let connector = Connector::new(ConnectorConfig::default(), Arc::new(NullObserver));
        let id = connector.machine_id().to_string();
        assert!(!id.is_empty());
        assert_eq!(connector.clone().machine_id(), id);
    }

    #[test]
    fn test_configured_machine_id_is_used() {
        assert_eq!(unreachable_connector().machine_id(), "machine-1");
    }

    #[tokio::test]
    async fn test_inform_when_disconnected() {
        let connector = unreachable_connector();
        let envelope = Envelope::new("SendPenDown", json!({})).unwrap();
        assert!(matches!(
            connector.inform(envelope, None).await,
            Err(StpError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_request_when_disconnected() {
        let connector = unreachable_connector();
        let envelope = Envelope::new("HasActiveScenario", json!({})).unwrap();
        assert!(matches!(
            connector.request(envelope, None).await,
            Err(StpError::NotConnected)
        ));
        assert_eq!(connector.pending_requests().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_when_already_closed_is_noop() {
        let connector = unreachable_connector();
        connector.disconnect(None).await.unwrap();
        assert_eq!(connector.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let connector = unreachable_connector();
        let result = connector
            .connect("Sample", vec![], Some(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(StpError::ConnectFailed(_))));
        assert_eq!(connector.state().await, ConnectionState::Disconnected);
        assert!(connector.session_id().await.is_none());
    }

    #[derive(Default)]
    struct CountingObserver {
        errors: AtomicU32,
    }

    impl ConnectionObserver for CountingObserver {
        fn on_notification(&self, _envelope: Envelope) {}
        fn on_connection_error(&self, _error: &StpError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect_is_abandoned() {
        let connector = unreachable_connector();

        // Disconnect won the lock: the state is no longer Reconnecting.
        let result = Arc::clone(&connector.shared)
            .establish(
                "Sample".to_string(),
                vec![],
                Duration::from_secs(5),
                ConnectionState::Reconnecting,
            )
            .await;

        // Closed, not ConnectFailed: no socket was opened.
        assert!(matches!(result, Err(StpError::Closed(_))));
        assert_eq!(connector.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_abandoned_reconnect_is_not_reported() {
        let observer = Arc::new(CountingObserver::default());
        let config = ConnectorConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let connector = Connector::new(config, observer.clone());

        let registration = Registration {
            service_name: "Sample".to_string(),
            solvables: vec![],
            session_id: "session-1".to_string(),
        };
        Arc::clone(&connector.shared).reconnect(registration).await;

        assert_eq!(observer.errors.load(Ordering::SeqCst), 0);
        assert_eq!(connector.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_failure_is_reported_once() {
        let observer = Arc::new(CountingObserver::default());
        let config = ConnectorConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let connector = Connector::new(config, observer.clone());
        connector
            .shared
            .set_state(ConnectionState::Reconnecting)
            .await;

        let registration = Registration {
            service_name: "Sample".to_string(),
            solvables: vec![],
            session_id: "session-1".to_string(),
        };
        Arc::clone(&connector.shared).reconnect(registration).await;

        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
        assert_eq!(connector.state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_describe_rejection() {
        assert_eq!(describe(&json!("bad name")), "bad name");
        assert_eq!(describe(&Value::Null), "no reason given");
        assert_eq!(describe(&json!({"code": 4})), r#"{"code":4}"#);
    }
}
