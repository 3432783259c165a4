//! holon-rpc: duplex JSON-RPC 2.0 over WebSocket.
//!
//! Both ends of a holon-rpc link may initiate calls. Ids name the side that
//! issued a call: `c<N>` for the client, `s<N>` for the server.
//!
//! # Architecture
//!
//! - **Client**: Dials the server, issues calls, serves server-initiated calls
//! - **Protocol**: Envelope types and frame classification shared by both sides
//! - **Registry**: Handlers for server-initiated calls
//! - **Pending**: Correlation of in-flight calls with their responses
//! - **Backoff**: Reconnect delay policy

pub mod backoff;
pub mod client;
pub mod pending;
pub mod protocol;
pub mod registry;

pub use backoff::ReconnectPolicy;
pub use client::{ConnectionState, HolonRpcClient};
pub use pending::{PendingCalls, PendingGuard};
pub use protocol::{Envelope, RpcErrorObject, RpcRequest, RpcResponse};
pub use registry::{Handler, HandlerRegistry};
