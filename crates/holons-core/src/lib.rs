//! Holons - transport plumbing and the holon-rpc client for holon processes.
//!
//! This crate provides two pieces that holons share:
//!
//! - [`transport`]: parse transport URIs (`tcp://`, `unix://`, `stdio://`,
//!   `mem://`, `ws://`, `wss://`) and open the matching listener.
//! - [`rpc`]: a duplex JSON-RPC 2.0 client over WebSocket with heartbeats,
//!   automatic reconnection and handlers for server-initiated calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use holons::{HolonRpcClient, ClientConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> holons::Result<()> {
//!     let client = HolonRpcClient::new(ClientConfig::default());
//!     client.register("client.v1.Client/Hello", |params| async move {
//!         let name = params["name"].as_str().unwrap_or_default().to_string();
//!         Ok(json!({ "message": format!("hello {}", name) }))
//!     })?;
//!
//!     client.connect("ws://127.0.0.1:8080/rpc").await?;
//!     let reply = client.invoke("echo.v1.Echo/Ping", json!({"message": "hi"}), None).await?;
//!     println!("{}", reply);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod rpc;
pub mod serve;
pub mod transport;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::{ClientConfig, ProtocolConfig, TransportConfig};
pub use error::{HolonsError, Result};
pub use rpc::{ConnectionState, Handler, HolonRpcClient, ReconnectPolicy};
pub use serve::{listen_uri, parse_flags};
pub use transport::{listen, parse_uri, scheme, Listener, Scheme, TransportDescriptor};
