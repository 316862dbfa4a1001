//! Bridge client for the host scheduler
//!
//! Maintains one logical connection to the host's Unix socket and exposes a
//! `call(method, params)` primitive. Responses are matched to callers by
//! request id, so any number of calls may be in flight and the host may
//! answer them in any order.
//!
//! The connection is established lazily on the first call. Concurrent
//! callers that find the bridge disconnected all await the same connect
//! attempt, so at most one socket is ever being opened. When the socket
//! drops, every request still waiting on it is rejected and the next call
//! reconnects.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map as JsonObject, Value as JsonValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scheduler_bridge_protocol::{
    encode_line, BridgeRequest, BridgeResponse, LineReader, SchedulerMethod, CONVERSATION_ID_KEY,
};

use crate::config::{BridgeConfig, CONNECT_TIMEOUT};
use crate::error::{BridgeError, BridgeResult};
use crate::tools::SchedulerRpc;

/// Opens the byte stream to the host scheduler
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by a successful connect
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new stream
    async fn connect(&self) -> std::io::Result<Self::Stream>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String {
        "scheduler".to_string()
    }
}

/// Connects to a Unix domain socket path
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    /// Create a connector for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Socket path this connector dials
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for UnixConnector {
    type Stream = UnixStream;

    async fn connect(&self) -> std::io::Result<UnixStream> {
        UnixStream::connect(&self.path).await
    }

    fn endpoint(&self) -> String {
        self.path().display().to_string()
    }
}

type Waiter = oneshot::Sender<BridgeResult<JsonValue>>;
type ConnectAttempt = Shared<BoxFuture<'static, BridgeResult<Arc<Connection>>>>;

/// One in-flight request awaiting its response line
struct PendingRequest {
    generation: u64,
    method: SchedulerMethod,
    waiter: Waiter,
}

enum ConnectionState {
    Disconnected,
    Connecting(ConnectAttempt),
    Connected(Arc<Connection>),
    Closed,
}

/// A live socket session
struct Connection {
    generation: u64,
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    async fn write_line(&self, line: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line).await?;
        writer.flush().await
    }

    /// Stop the reader task and close the write side.
    ///
    /// The socket itself is released once the last handle to this
    /// connection goes away.
    async fn shut_down(&self) {
        let reader = lock(&self.reader).take();
        if let Some(reader) = reader {
            reader.abort();
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(generation = self.generation, "Error shutting down scheduler socket: {}", e);
        }
    }
}

/// Removes a request's pending entry however its call ends
struct Registration<'a> {
    pending: &'a Mutex<HashMap<u64, PendingRequest>>,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

struct ClientInner<C> {
    connector: C,
    token: String,
    conversation_id: i64,
    connect_timeout: Duration,
    state: Mutex<ConnectionState>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    connect_attempts: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Connector> ClientInner<C> {
    async fn establish(self: Arc<Self>) -> BridgeResult<Arc<Connection>> {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        let endpoint = self.connector.endpoint();
        debug!(%endpoint, "Connecting to scheduler");

        let outcome = match tokio::time::timeout(self.connect_timeout, self.connector.connect()).await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(BridgeError::Connect(e.to_string())),
            Err(_) => Err(BridgeError::ConnectTimeout {
                seconds: self.connect_timeout.as_secs(),
            }),
        };

        let mut state = lock(&self.state);
        if matches!(*state, ConnectionState::Closed) {
            return Err(BridgeError::Closed);
        }

        match outcome {
            Ok(stream) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                let (read_half, write_half) = tokio::io::split(stream);
                let connection = Arc::new(Connection {
                    generation,
                    writer: AsyncMutex::new(Box::new(write_half)),
                    reader: Mutex::new(None),
                });

                let handle = tokio::spawn(Arc::clone(&self).read_loop(generation, read_half));
                *lock(&connection.reader) = Some(handle);
                *state = ConnectionState::Connected(Arc::clone(&connection));

                info!(%endpoint, generation, "Connected to scheduler");
                Ok(connection)
            }
            Err(e) => {
                *state = ConnectionState::Disconnected;
                warn!(%endpoint, "Scheduler connection failed: {}", e);
                Err(e)
            }
        }
    }

    async fn read_loop(self: Arc<Self>, generation: u64, reader: ReadHalf<C::Stream>) {
        let mut lines = LineReader::new(reader);
        let reason = loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.dispatch_line(&line),
                Ok(None) => break "closed by host".to_string(),
                Err(e) => break e.to_string(),
            }
        };
        self.drop_connection(generation, &reason);
    }

    /// Settle the pending request a response line refers to
    fn dispatch_line(&self, line: &str) {
        let response: BridgeResponse = match serde_json::from_str(line) {
            Ok(response) => response,
            Err(e) => {
                warn!("Dropping unparseable scheduler line: {}", e);
                return;
            }
        };

        let Some(id) = response.id else {
            warn!("Dropping scheduler line without an id");
            return;
        };

        let pending = lock(&self.pending).remove(&id);
        let Some(pending) = pending else {
            warn!(id, "Dropping scheduler response for unknown request id");
            return;
        };

        let outcome = response.into_outcome().map_err(BridgeError::Remote);
        match &outcome {
            Ok(_) => debug!(id, method = %pending.method, "Scheduler request succeeded"),
            Err(e) => debug!(id, method = %pending.method, "Scheduler request rejected: {}", e),
        }
        // The caller may have given up; nothing else to do then.
        let _ = pending.waiter.send(outcome);
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&*lock(&self.state), ConnectionState::Connected(c) if c.generation == generation)
    }

    fn drop_connection(&self, generation: u64, reason: &str) {
        {
            let mut state = lock(&self.state);
            let current =
                matches!(&*state, ConnectionState::Connected(c) if c.generation == generation);
            if current {
                *state = ConnectionState::Disconnected;
            }
        }

        let failed = self.fail_pending(Some(generation), &BridgeError::ConnectionClosed);
        info!(generation, failed, "Scheduler connection lost: {}", reason);
    }

    /// Reject pending requests of one connection, or all of them
    fn fail_pending(&self, generation: Option<u64>, error: &BridgeError) -> usize {
        let failed: Vec<PendingRequest> = {
            let mut pending = lock(&self.pending);
            let (failed, kept): (Vec<_>, Vec<_>) = pending
                .drain()
                .partition(|(_, entry)| generation.map_or(true, |g| entry.generation == g));
            pending.extend(kept);
            failed.into_iter().map(|(_, entry)| entry).collect()
        };

        let count = failed.len();
        for entry in failed {
            let _ = entry.waiter.send(Err(error.clone()));
        }
        count
    }
}

/// Client half of the scheduler bridge.
///
/// Cheap to clone; clones share the connection and the pending table.
///
/// # Example
///
/// ```no_run
/// use scheduler_bridge::client::{BridgeClient, UnixConnector};
/// use scheduler_bridge_protocol::SchedulerMethod;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), scheduler_bridge::BridgeError> {
/// let client = BridgeClient::new(UnixConnector::new("/tmp/scheduler.sock"), "token", 12);
/// let tasks = client.call(SchedulerMethod::List, json!({})).await?;
/// println!("{}", tasks);
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct BridgeClient<C = UnixConnector> {
    inner: Arc<ClientInner<C>>,
}

impl<C> Clone for BridgeClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`BridgeClient`]
#[derive(Debug)]
pub struct BridgeClientBuilder<C> {
    connector: C,
    token: String,
    conversation_id: i64,
    connect_timeout: Duration,
}

impl<C: Connector> BridgeClientBuilder<C> {
    /// Shared secret sent with each request
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Conversation injected into every request's params
    pub fn conversation_id(mut self, conversation_id: i64) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Override the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the client. No connection is made until the first call.
    pub fn build(self) -> BridgeClient<C> {
        BridgeClient {
            inner: Arc::new(ClientInner {
                connector: self.connector,
                token: self.token,
                conversation_id: self.conversation_id,
                connect_timeout: self.connect_timeout,
                state: Mutex::new(ConnectionState::Disconnected),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(0),
                connect_attempts: AtomicU64::new(0),
            }),
        }
    }
}

impl BridgeClient<UnixConnector> {
    /// Client for the socket, token and conversation in `config`
    pub fn from_config(config: &BridgeConfig) -> Self {
        BridgeClient::builder(UnixConnector::new(&config.socket_path))
            .token(config.token.clone())
            .conversation_id(config.conversation_id)
            .connect_timeout(config.connect_timeout)
            .build()
    }
}

impl<C: Connector> BridgeClient<C> {
    /// Start building a client around `connector`
    pub fn builder(connector: C) -> BridgeClientBuilder<C> {
        BridgeClientBuilder {
            connector,
            token: String::new(),
            conversation_id: 0,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Client with the default connect timeout
    pub fn new(connector: C, token: impl Into<String>, conversation_id: i64) -> Self {
        Self::builder(connector)
            .token(token)
            .conversation_id(conversation_id)
            .build()
    }

    /// Connect if not already connected.
    ///
    /// Concurrent callers share a single connect attempt and all observe its
    /// outcome.
    pub async fn ensure_connection(&self) -> BridgeResult<()> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> BridgeResult<Arc<Connection>> {
        let attempt = {
            let mut state = lock(&self.inner.state);
            match &*state {
                ConnectionState::Connected(connection) => return Ok(Arc::clone(connection)),
                ConnectionState::Connecting(attempt) => attempt.clone(),
                ConnectionState::Closed => return Err(BridgeError::Closed),
                ConnectionState::Disconnected => {
                    let attempt = Arc::clone(&self.inner).establish().boxed().shared();
                    *state = ConnectionState::Connecting(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Issue one RPC and wait for its response.
    ///
    /// `params` must be a JSON object (or `null`); the conversation id is
    /// always added to it.
    pub async fn call(&self, method: SchedulerMethod, params: JsonValue) -> BridgeResult<JsonValue> {
        let params = self.scoped_params(params)?;
        let connection = self.connection().await?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = BridgeRequest {
            id,
            method,
            token: self.inner.token.clone(),
            params,
        };
        let line = encode_line(&request).map_err(|e| BridgeError::Encode(e.to_string()))?;

        let (waiter, response) = oneshot::channel();
        lock(&self.inner.pending).insert(
            id,
            PendingRequest {
                generation: connection.generation,
                method,
                waiter,
            },
        );
        let registration = Registration {
            pending: &self.inner.pending,
            id,
        };

        // The connection may have dropped between lookup and registration.
        if !self.inner.is_current(connection.generation) {
            return Err(BridgeError::ConnectionClosed);
        }

        debug!(id, %method, "Sending scheduler request");
        if let Err(e) = connection.write_line(&line).await {
            drop(registration);
            self.inner
                .drop_connection(connection.generation, &format!("write failed: {}", e));
            connection.shut_down().await;
            return Err(BridgeError::Write(e.to_string()));
        }

        let outcome = response.await.unwrap_or(Err(BridgeError::ConnectionClosed));
        drop(registration);
        outcome
    }

    fn scoped_params(&self, params: JsonValue) -> BridgeResult<JsonValue> {
        let mut map = match params {
            JsonValue::Object(map) => map,
            JsonValue::Null => JsonObject::new(),
            other => {
                return Err(BridgeError::Encode(format!(
                    "params must be a JSON object, got {}",
                    other
                )))
            }
        };
        map.insert(
            CONVERSATION_ID_KEY.to_string(),
            JsonValue::from(self.inner.conversation_id),
        );
        Ok(JsonValue::Object(map))
    }

    /// Shut the client down.
    ///
    /// Closes the socket, rejects everything still pending and makes later
    /// calls fail with [`BridgeError::Closed`].
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *lock(&self.inner.state), ConnectionState::Closed);

        if let ConnectionState::Connected(connection) = previous {
            connection.shut_down().await;
        }

        let failed = self.inner.fail_pending(None, &BridgeError::Closed);
        info!(failed, "Scheduler bridge closed");
    }

    /// Whether a live connection exists
    pub fn is_connected(&self) -> bool {
        matches!(&*lock(&self.inner.state), ConnectionState::Connected(_))
    }

    /// Requests still waiting for a response
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Number of connect attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<C: Connector> SchedulerRpc for BridgeClient<C> {
    async fn call(&self, method: SchedulerMethod, params: JsonValue) -> BridgeResult<JsonValue> {
        BridgeClient::call(self, method, params).await
    }
}
