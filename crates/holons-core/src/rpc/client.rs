//! Duplex holon-rpc client over a WebSocket link.
//!
//! The client dials a `ws://` / `wss://` endpoint that negotiates the
//! `holon-rpc` subprotocol, then runs per link *generation*:
//!
//! - a receive loop that classifies each text frame and either resolves a
//!   pending call or dispatches an inbound request to a registered handler;
//! - a heartbeat loop that probes the peer with `rpc.heartbeat` and aborts
//!   the link when a probe fails.
//!
//! When a generation ends for any reason other than [`HolonRpcClient::close`],
//! every pending call fails with [`HolonsError::ConnectionClosed`] and a single
//! reconnect loop reopens the link with exponential backoff. The handler
//! registry, the id counter and the outbound send path outlive generations.
//!
//! # Thread Safety
//!
//! All outbound frames (calls, heartbeats, replies) go through one tokio
//! `Mutex` around the sink, so frames never interleave on the wire. The link
//! bookkeeping sits behind a std `Mutex` that is never held across an await.

use super::pending::PendingCalls;
use super::protocol::{as_object, id_key, Envelope, RpcErrorObject, RpcRequest, RpcResponse};
use super::registry::{Handler, HandlerRegistry};
use crate::cancel::CancellationToken;
use crate::config::{ClientConfig, ProtocolConfig};
use crate::{HolonsError, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Grace period for the close handshake on an explicit `close()`.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Reconnecting,
}

/// Duplex holon-rpc client.
///
/// Dropping the client stops its background tasks; call [`close`](Self::close)
/// first for a graceful close frame.
pub struct HolonRpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    handlers: HandlerRegistry,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    outbound: tokio::sync::Mutex<Option<Outbound>>,
    link: Mutex<Link>,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped by every close; a reconnect loop or open started under an
    /// older epoch must not install a link.
    epoch_tx: watch::Sender<u64>,
    closed: AtomicBool,
    reconnect_running: AtomicBool,
    reconnect_attempt: AtomicU32,
}

struct Outbound {
    generation: u64,
    sink: WsSink,
}

#[derive(Default)]
struct Link {
    endpoint: Option<Url>,
    generation: u64,
    cancel: Option<CancellationToken>,
    receive_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl Default for HolonRpcClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl std::fmt::Debug for HolonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HolonRpcClient")
            .field("state", &self.state())
            .field("endpoint", &self.endpoint())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl HolonRpcClient {
    /// Create a closed client with the given timings.
    pub fn new(config: ClientConfig) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Closed);
        let (epoch_tx, _epoch_rx) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                handlers: HandlerRegistry::new(),
                pending: Arc::new(PendingCalls::new()),
                next_id: AtomicU64::new(0),
                outbound: tokio::sync::Mutex::new(None),
                link: Mutex::new(Link::default()),
                state_tx,
                epoch_tx,
                closed: AtomicBool::new(true),
                reconnect_running: AtomicBool::new(false),
                reconnect_attempt: AtomicU32::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Endpoint of the last `connect`.
    pub fn endpoint(&self) -> Option<Url> {
        self.inner.link().endpoint.clone()
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Methods that server-initiated calls may reach.
    pub fn registered_methods(&self) -> Vec<String> {
        self.inner.handlers.methods()
    }

    /// Install or replace the async closure serving `method`.
    ///
    /// Safe before or after `connect`; registrations survive reconnects.
    pub fn register<F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.inner.handlers.register(method, handler)
    }

    /// Install or replace a handler object serving `method`.
    pub fn register_handler(&self, method: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.inner.handlers.register_handler(method, handler)
    }

    /// Dial `url` and wait for the link to open.
    ///
    /// Any previous connection is closed first. Fails with
    /// [`HolonsError::Protocol`] when the peer does not negotiate the
    /// `holon-rpc` subprotocol and with [`HolonsError::Timeout`] when the
    /// connect timeout elapses.
    pub async fn connect(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(HolonsError::invalid_argument("url is required"));
        }
        let endpoint = parse_endpoint(url)?;

        self.inner.close().await;

        let inner = &self.inner;
        inner.link().endpoint = Some(endpoint.clone());
        let epoch = inner.epoch();
        inner.reconnect_attempt.store(0, Ordering::SeqCst);
        inner.closed.store(false, Ordering::SeqCst);
        inner.set_state(ConnectionState::Connecting);
        info!("Connecting holon-rpc client to {}", endpoint);

        let timeout = inner.config.connect_timeout;
        let opened = match tokio::time::timeout(timeout, inner.open_socket(epoch)).await {
            Ok(result) => result,
            Err(_) => Err(HolonsError::Timeout(timeout)),
        };

        if let Err(e) = opened {
            warn!("holon-rpc connect to {} failed: {}", endpoint, e);
            inner.close().await;
            return Err(e);
        }
        Ok(())
    }

    /// Call `method` on the peer and wait for its result.
    ///
    /// Waits up to the connect timeout for an open link, then up to
    /// `timeout` (default: the configured request timeout) for the
    /// response. `params` and the result are JSON objects; anything else is
    /// sent or returned as `{}`.
    pub async fn invoke(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.inner.call(method, params, timeout, None).await
    }

    /// Like [`invoke`](Self::invoke), failing with [`HolonsError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn invoke_with_cancel(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.inner.call(method, params, timeout, Some(cancel)).await
    }

    /// Close the connection. Idempotent; never triggers a reconnect.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

impl Drop for HolonRpcClient {
    fn drop(&mut self) {
        let (cancel, tasks) = self.inner.begin_close();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        for task in tasks {
            task.abort();
        }
        self.inner.pending.fail_all(|| HolonsError::ConnectionClosed);
    }
}

impl Inner {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("holon-rpc state {:?} -> {:?}", previous, state);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn epoch(&self) -> u64 {
        *self.epoch_tx.borrow()
    }

    /// Open a socket to the stored endpoint and install a new generation,
    /// unless the client was closed or reconnected since `epoch`.
    async fn open_socket(self: &Arc<Self>, epoch: u64) -> Result<()> {
        if self.is_closed() || self.epoch() != epoch {
            return Err(HolonsError::ClientClosed);
        }
        let endpoint = self
            .link()
            .endpoint
            .clone()
            .ok_or_else(|| HolonsError::invalid_argument("endpoint is not set"))?;

        let mut request = endpoint.as_str().into_client_request()?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(ProtocolConfig::SUBPROTOCOL),
        );

        let (mut ws, response) = connect_async(request).await.map_err(|e| match e {
            WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(_)) => {
                subprotocol_error()
            }
            other => HolonsError::from(other),
        })?;

        let negotiated = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok());
        if negotiated != Some(ProtocolConfig::SUBPROTOCOL) {
            let frame = CloseFrame {
                code: CloseCode::Protocol,
                reason: "missing holon-rpc subprotocol".into(),
            };
            let _ = ws.close(Some(frame)).await;
            return Err(subprotocol_error());
        }

        let (sink, source) = ws.split();

        let mut outbound = self.outbound.lock().await;
        let mut link = self.link();
        // begin_close bumps the epoch before taking the link lock, so a close
        // either rejects this open here or retires the generation it installs.
        if self.is_closed() || self.epoch() != epoch {
            return Err(HolonsError::ClientClosed);
        }

        let retired = link.cancel.take();
        if let Some(previous) = &retired {
            previous.cancel();
        }

        link.generation += 1;
        let generation = link.generation;
        let cancel = CancellationToken::new();
        *outbound = Some(Outbound { generation, sink });
        link.cancel = Some(cancel.clone());
        link.receive_task = Some(tokio::spawn(Arc::clone(self).receive_loop(
            source,
            generation,
            cancel.clone(),
        )));
        link.heartbeat_task = Some(tokio::spawn(Arc::clone(self).heartbeat_loop(cancel)));
        drop(link);
        drop(outbound);

        // The retired generation's disconnect pass is stale now, so its
        // calls are failed here.
        if retired.is_some() {
            let failed = self.pending.fail_all(|| HolonsError::ConnectionClosed);
            info!(
                "holon-rpc generation {} replaced a live link ({} pending calls failed)",
                generation, failed
            );
        }

        self.reconnect_attempt.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Open);
        info!(
            "holon-rpc link open to {} (generation {})",
            endpoint, generation
        );
        Ok(())
    }

    async fn receive_loop(
        self: Arc<Self>,
        mut source: WsSource,
        generation: u64,
        cancel: CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("holon-rpc receive loop {} cancelled", generation);
                    break;
                }
                frame = source.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_incoming(text.as_str()).await,
                Some(Ok(Message::Close(frame))) => {
                    debug!("holon-rpc peer closed the link: {:?}", frame);
                    break;
                }
                // Binary payloads are not part of the protocol; ping/pong are
                // answered by the codec.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("holon-rpc receive error: {}", e);
                    break;
                }
                None => break,
            }
        }

        self.handle_disconnect(generation).await;
    }

    async fn heartbeat_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if self.is_closed() {
                return;
            }

            let probe = self
                .call(
                    ProtocolConfig::HEARTBEAT_METHOD,
                    json!({}),
                    Some(self.config.heartbeat_timeout),
                    Some(&cancel),
                )
                .await;

            match probe {
                Ok(_) => debug!("holon-rpc heartbeat acknowledged"),
                Err(HolonsError::Cancelled) => return,
                Err(e) => {
                    warn!("holon-rpc heartbeat failed, aborting link: {}", e);
                    cancel.cancel();
                    return;
                }
            }
        }
    }

    async fn handle_incoming(&self, text: &str) {
        match Envelope::parse(text) {
            Some(Envelope::Request(request)) => self.handle_request(request).await,
            Some(Envelope::Response(response)) => self.handle_response(response),
            None => debug!("Dropping frame that is not a holon-rpc envelope"),
        }
    }

    async fn handle_request(&self, request: RpcRequest) {
        let RpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        if jsonrpc != ProtocolConfig::JSONRPC_VERSION || method.trim().is_empty() {
            if let Some(id) = id {
                self.reply_error(id, RpcErrorObject::invalid_request("invalid request"))
                    .await;
            }
            return;
        }

        if method == ProtocolConfig::HEARTBEAT_METHOD {
            if let Some(id) = id {
                self.reply(RpcResponse::success(id, json!({}))).await;
            }
            return;
        }

        if let Some(id) = &id {
            let from_server = id_key(id)
                .map(|key| key.starts_with(ProtocolConfig::SERVER_ID_PREFIX))
                .unwrap_or(false);
            if !from_server {
                self.reply_error(
                    id.clone(),
                    RpcErrorObject::invalid_request("server request id must start with 's'"),
                )
                .await;
                return;
            }
        }

        let Some(handler) = self.handlers.get(&method) else {
            if let Some(id) = id {
                self.reply_error(id, RpcErrorObject::method_not_found(&method))
                    .await;
            }
            return;
        };

        debug!("Dispatching inbound holon-rpc call {}", method);
        let outcome = AssertUnwindSafe(handler.call(params)).catch_unwind().await;

        let Some(id) = id else {
            return;
        };
        let response = match outcome {
            Ok(Ok(result)) => RpcResponse::success(id, result),
            Ok(Err(e)) => RpcResponse::failure(id, e.to_rpc_error()),
            Err(panic) => RpcResponse::failure(
                id,
                RpcErrorObject::new(ProtocolConfig::HANDLER_FAULT, panic_message(&*panic)),
            ),
        };
        self.reply(response).await;
    }

    fn handle_response(&self, response: RpcResponse) {
        let Some(id) = id_key(&response.id) else {
            return;
        };

        let outcome = match response.error {
            Some(error) => Err(HolonsError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
            None => Ok(as_object(response.result.unwrap_or(Value::Null))),
        };

        if !self.pending.resolve(&id, outcome) {
            debug!("Dropping response for unknown call id {}", id);
        }
    }

    async fn reply(&self, response: RpcResponse) {
        if let Err(e) = self.send_envelope(&response).await {
            debug!("Failed to send holon-rpc reply: {}", e);
        }
    }

    async fn reply_error(&self, id: Value, error: RpcErrorObject) {
        self.reply(RpcResponse::failure(id, error)).await;
    }

    /// The single outbound path shared by calls, heartbeats and replies.
    async fn send_envelope<T: Serialize>(&self, envelope: &T) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        let mut outbound = self.outbound.lock().await;
        let out = outbound.as_mut().ok_or(HolonsError::NotConnected)?;
        out.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        if method.trim().is_empty() {
            return Err(HolonsError::invalid_argument("method is required"));
        }
        if let Some(token) = cancel {
            token.check()?;
        }

        self.wait_open(cancel).await?;

        let id = format!(
            "{}{}",
            ProtocolConfig::CLIENT_ID_PREFIX,
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        let timeout = timeout.unwrap_or(self.config.request_timeout);
        let (rx, _guard) = self.pending.register(&id)?;

        let request = RpcRequest::new(Some(id.clone()), method, params);
        self.send_envelope(&request).await?;
        debug!("holon-rpc call {} sent ({})", id, method);

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            outcome = tokio::time::timeout(timeout, rx) => match outcome {
                Ok(Ok(result)) => result,
                // The slot was dropped without an answer.
                Ok(Err(_)) => Err(HolonsError::ConnectionClosed),
                Err(_) => Err(HolonsError::Timeout(timeout)),
            },
            _ = cancelled => Err(HolonsError::Cancelled),
        }
    }

    /// Wait, bounded by the connect timeout, for the link to be open.
    async fn wait_open(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let mut state_rx = self.state_tx.subscribe();
        let current = *state_rx.borrow_and_update();
        match current {
            ConnectionState::Open => return Ok(()),
            ConnectionState::Closed => return Err(HolonsError::ClientClosed),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
        }

        let settled = async {
            state_rx
                .wait_for(|state| {
                    matches!(state, ConnectionState::Open | ConnectionState::Closed)
                })
                .await
                .map(|state| *state)
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            settled = tokio::time::timeout(self.config.connect_timeout, settled) => match settled {
                Ok(Ok(ConnectionState::Open)) => Ok(()),
                Ok(_) => Err(HolonsError::ClientClosed),
                // Still no link after the connect timeout.
                Err(_) => Err(HolonsError::ConnectionClosed),
            },
            _ = cancelled => Err(HolonsError::Cancelled),
        }
    }

    /// Tear down one generation after its receive loop ended.
    async fn handle_disconnect(self: &Arc<Self>, generation: u64) {
        let cancel = {
            let mut link = self.link();
            if link.generation != generation || link.cancel.is_none() {
                // Already retired by close() or by a newer generation.
                return;
            }
            link.receive_task = None;
            link.heartbeat_task = None;
            link.cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let closed = self.is_closed();
        if !closed {
            self.set_state(ConnectionState::Reconnecting);
        }

        {
            let mut outbound = self.outbound.lock().await;
            if outbound
                .as_ref()
                .is_some_and(|out| out.generation == generation)
            {
                *outbound = None;
            }
        }

        let failed = self.pending.fail_all(|| HolonsError::ConnectionClosed);
        info!(
            "holon-rpc link lost (generation {}, {} pending calls failed)",
            generation, failed
        );

        if !closed {
            self.start_reconnect_loop();
        }
    }

    /// Start the reconnect loop unless one is already running.
    fn start_reconnect_loop(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        if self.reconnect_running.swap(true, Ordering::SeqCst) {
            debug!("holon-rpc reconnect loop already running");
            return;
        }

        let inner = Arc::clone(self);
        let epoch = self.epoch();
        tokio::spawn(async move {
            inner.reconnect_loop(epoch).await;
            inner.reconnect_running.store(false, Ordering::SeqCst);
            // A link lost between the successful reopen and clearing the flag
            // found the loop still marked as running.
            if !inner.is_closed() && inner.state() == ConnectionState::Reconnecting {
                inner.start_reconnect_loop();
            }
        });
    }

    async fn reconnect_loop(self: &Arc<Self>, epoch: u64) {
        let mut epoch_rx = self.epoch_tx.subscribe();

        while !self.is_closed() && self.epoch() == epoch {
            let attempt = self.reconnect_attempt.fetch_add(1, Ordering::SeqCst);
            let delay = self.config.reconnect.delay(attempt);
            debug!("holon-rpc reconnect attempt {} in {:?}", attempt + 1, delay);

            let superseded = async {
                let _ = epoch_rx.wait_for(|current| *current != epoch).await;
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = superseded => {
                    debug!("holon-rpc reconnect loop superseded by close or connect");
                    return;
                }
            }
            if self.is_closed() || self.epoch() != epoch {
                return;
            }

            let timeout = self.config.connect_timeout;
            match tokio::time::timeout(timeout, self.open_socket(epoch)).await {
                Ok(Ok(())) => {
                    info!("holon-rpc link re-established after {} attempts", attempt + 1);
                    return;
                }
                Ok(Err(e)) => warn!("holon-rpc reconnect attempt {} failed: {}", attempt + 1, e),
                Err(_) => warn!(
                    "holon-rpc reconnect attempt {} timed out after {:?}",
                    attempt + 1,
                    timeout
                ),
            }
        }
    }

    /// Mark the client closed and detach the current generation.
    fn begin_close(&self) -> (Option<CancellationToken>, Vec<JoinHandle<()>>) {
        self.closed.store(true, Ordering::SeqCst);
        self.epoch_tx.send_modify(|epoch| *epoch += 1);
        let (cancel, tasks) = {
            let mut link = self.link();
            link.generation += 1;
            let tasks = [link.receive_task.take(), link.heartbeat_task.take()]
                .into_iter()
                .flatten()
                .collect();
            (link.cancel.take(), tasks)
        };
        self.set_state(ConnectionState::Closed);
        (cancel, tasks)
    }

    async fn close(&self) {
        let (cancel, tasks) = self.begin_close();
        if let Some(cancel) = &cancel {
            cancel.cancel();
        }

        let outbound = self.outbound.lock().await.take();
        if let Some(mut out) = outbound {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "client close".into(),
            };
            let graceful = async {
                out.sink.send(Message::Close(Some(frame))).await?;
                out.sink.close().await
            };
            match tokio::time::timeout(CLOSE_GRACE, graceful).await {
                Ok(Ok(())) => debug!("holon-rpc close frame sent"),
                Ok(Err(e)) => debug!("holon-rpc close frame failed: {}", e),
                Err(_) => debug!("holon-rpc close frame timed out"),
            }
        }

        for task in tasks {
            // Cancelled above; a JoinError only means the task panicked.
            let _ = task.await;
        }

        let failed = self.pending.fail_all(|| HolonsError::ConnectionClosed);
        if cancel.is_some() {
            info!("holon-rpc client closed ({} pending calls failed)", failed);
        }
    }
}

fn parse_endpoint(url: &str) -> Result<Url> {
    let endpoint = Url::parse(url)?;
    match endpoint.scheme() {
        "ws" | "wss" => Ok(endpoint),
        _ => Err(HolonsError::UnsupportedScheme {
            uri: url.to_string(),
        }),
    }
}

fn subprotocol_error() -> HolonsError {
    HolonsError::Protocol {
        message: format!(
            "server did not negotiate {} subprotocol",
            ProtocolConfig::SUBPROTOCOL
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_is_closed() {
        let client = HolonRpcClient::default();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.endpoint().is_none());
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn test_register_before_connect() {
        let client = HolonRpcClient::default();
        client
            .register("client.v1.Client/Hello", |_params: Value| async {
                Ok(json!({}))
            })
            .unwrap();
        assert_eq!(client.registered_methods(), vec!["client.v1.Client/Hello"]);
    }

    #[tokio::test]
    async fn test_invoke_on_closed_client_fails() {
        let client = HolonRpcClient::default();
        let result = client.invoke("echo.v1.Echo/Ping", json!({}), None).await;
        assert!(matches!(result, Err(HolonsError::ClientClosed)));
    }

    #[tokio::test]
    async fn test_invoke_with_cancelled_token_fails_fast() {
        let client = HolonRpcClient::default();
        let token = CancellationToken::new();
        token.cancel();
        let result = client
            .invoke_with_cancel("echo.v1.Echo/Ping", json!({}), None, &token)
            .await;
        assert!(matches!(result, Err(HolonsError::Cancelled)));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_requires_method() {
        let client = HolonRpcClient::default();
        let result = client.invoke(" ", json!({}), None).await;
        assert!(matches!(result, Err(HolonsError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_urls() {
        let client = HolonRpcClient::default();
        assert!(matches!(
            client.connect("").await,
            Err(HolonsError::InvalidArgument { .. })
        ));
        assert!(matches!(
            client.connect("http://127.0.0.1:1/rpc").await,
            Err(HolonsError::UnsupportedScheme { .. })
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_to_dead_endpoint_fails_and_stays_closed() {
        let client = HolonRpcClient::new(
            ClientConfig::default().with_connect_timeout(Duration::from_secs(2)),
        );
        let result = client.connect("ws://127.0.0.1:1/rpc").await;
        assert!(result.is_err());
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = HolonRpcClient::default();
        client.close().await;
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "handler panicked");
    }
}
