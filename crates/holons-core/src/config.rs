//! Centralized configuration for the holons SDK.
//!
//! Constant tables for transport defaults and the holon-rpc wire protocol,
//! plus the tunable timings of a [`crate::rpc::HolonRpcClient`].

use crate::rpc::backoff::ReconnectPolicy;
use std::time::Duration;

/// Transport addressing defaults.
pub struct TransportConfig;

impl TransportConfig {
    /// Transport URI used when no `--listen` / `--port` flag is given.
    pub const DEFAULT_URI: &'static str = "tcp://:9090";
    pub const DEFAULT_TCP_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_TCP_PORT: u16 = 9090;
    pub const DEFAULT_WS_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_WS_PORT: u16 = 80;
    pub const DEFAULT_WSS_PORT: u16 = 443;
    pub const DEFAULT_WS_PATH: &'static str = "/grpc";
    pub const SCHEME_SEPARATOR: &'static str = "://";
}

/// holon-rpc wire protocol constants.
pub struct ProtocolConfig;

impl ProtocolConfig {
    pub const JSONRPC_VERSION: &'static str = "2.0";
    /// Subprotocol the remote must echo during the WebSocket handshake.
    pub const SUBPROTOCOL: &'static str = "holon-rpc";
    pub const HEARTBEAT_METHOD: &'static str = "rpc.heartbeat";
    pub const CLIENT_ID_PREFIX: &'static str = "c";
    pub const SERVER_ID_PREFIX: &'static str = "s";

    // Error codes
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const HANDLER_FAULT: i32 = 13;
}

/// Timings for a holon-rpc client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between two `rpc.heartbeat` probes.
    pub heartbeat_interval: Duration,
    /// Deadline for a single heartbeat probe.
    pub heartbeat_timeout: Duration,
    /// Bound on dialing and on waiting for the link to be open.
    pub connect_timeout: Duration,
    /// Default deadline of an `invoke` without an explicit timeout.
    pub request_timeout: Duration,
    /// Backoff applied between reconnect attempts.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(15_000),
            heartbeat_timeout: Duration::from_millis(5_000),
            connect_timeout: Duration::from_millis(10_000),
            request_timeout: Duration::from_millis(10_000),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
