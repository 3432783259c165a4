//! Method-name to handler mapping for server-initiated calls.
//!
//! Registrations are additive and last-write-wins per method. The registry
//! belongs to the client object, so it survives every reconnect.

use crate::{HolonsError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// Handler for one inbound holon-rpc method.
///
/// Implemented for any `Fn(Value) -> impl Future<Output = Result<Value>>`,
/// so async closures register directly. Returning
/// [`HolonsError::Rpc`] replies with that exact code/message/data; any other
/// error replies with the generic handler fault code.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle a call. `params` is always a JSON object owned by the handler.
    async fn call(&self, params: Value) -> Result<Value>;
}

#[async_trait::async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, params: Value) -> Result<Value> {
        (self)(params).await
    }
}

/// Concurrent handler registry.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace an async closure for `method`.
    pub fn register<F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_handler(method, Arc::new(handler))
    }

    /// Install or replace the handler for `method`.
    pub fn register_handler(&self, method: &str, handler: Arc<dyn Handler>) -> Result<()> {
        if method.trim().is_empty() {
            return Err(HolonsError::invalid_argument("method is required"));
        }
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(method.to_string(), handler);
        Ok(())
    }

    /// Look up a handler; the lock is released before the caller awaits it.
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(method)
            .cloned()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        methods.sort();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
