//! Method routing.
//!
//! An [Invoker] is anything that can dispatch `(service, method, stream)` to
//! code. A [Handler] is an invoker that also advertises its service and
//! method ids so a [Mux] can index it. The mux holds a two-level map from
//! service id to method id to handler, plus an ordered fallback chain of
//! invokers consulted when the map misses.

use crate::stream::ArcStream;
use async_trait::async_trait;
use starpc_core::error::RpcErr;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Dispatch interface for rpc service methods.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke the method matching the service and method id.
    /// Returns `Ok(false)` if not found. An empty service id matches any
    /// service that has the method.
    async fn invoke_method(
        &self, service_id: &str, method_id: &str, strm: ArcStream,
    ) -> Result<bool, RpcErr>;
}

pub type ArcInvoker = Arc<dyn Invoker>;

/// A user-supplied implementation of a service's methods.
pub trait Handler: Invoker {
    /// The id of the service.
    fn service_id(&self) -> &str;

    /// The list of method ids the service serves.
    fn method_ids(&self) -> Vec<&str>;
}

pub type ArcHandler = Arc<dyn Handler>;

type MuxMethods = HashMap<String, ArcHandler>;

/// The default handler registry.
///
/// Dispatch takes the shared side of the lock; registration takes the
/// exclusive side, so a register racing a dispatch is observed atomically.
pub struct Mux {
    /// Consulted in order when the service map misses.
    fallback: Vec<ArcInvoker>,
    services: RwLock<HashMap<String, MuxMethods>>,
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl Mux {
    pub fn new() -> Self {
        Self { fallback: Vec::new(), services: RwLock::new(HashMap::new()) }
    }

    /// Construct a mux with a list of fallback invokers, tried in order when
    /// the service/method is not found on this mux.
    pub fn with_fallback(fallback: Vec<ArcInvoker>) -> Self {
        Self { fallback, services: RwLock::new(HashMap::new()) }
    }

    /// Register a handler under every method id it advertises.
    pub fn register(&self, handler: ArcHandler) -> Result<(), RpcErr> {
        let service_id = handler.service_id().to_string();
        if service_id.is_empty() {
            return Err(RpcErr::EmptyServiceID);
        }
        let method_ids: Vec<String> =
            handler.method_ids().into_iter().map(|m| m.to_string()).collect();

        let mut services = self.services.write().unwrap();
        let methods = services.entry(service_id).or_default();
        for method_id in method_ids {
            if !method_id.is_empty() {
                methods.insert(method_id, handler.clone());
            }
        }
        Ok(())
    }

    pub fn has_service(&self, service_id: &str) -> bool {
        if service_id.is_empty() {
            return false;
        }
        let services = self.services.read().unwrap();
        services.get(service_id).map(|m| !m.is_empty()).unwrap_or(false)
    }

    pub fn has_service_method(&self, service_id: &str, method_id: &str) -> bool {
        if service_id.is_empty() || method_id.is_empty() {
            return false;
        }
        let services = self.services.read().unwrap();
        services.get(service_id).map(|m| m.contains_key(method_id)).unwrap_or(false)
    }

    fn lookup(&self, service_id: &str, method_id: &str) -> Option<ArcHandler> {
        let services = self.services.read().unwrap();
        if service_id.is_empty() {
            // first match wins; the iteration order is unspecified
            services.values().find_map(|methods| methods.get(method_id).cloned())
        } else {
            services.get(service_id).and_then(|methods| methods.get(method_id)).cloned()
        }
    }
}

#[async_trait]
impl Invoker for Mux {
    async fn invoke_method(
        &self, service_id: &str, method_id: &str, strm: ArcStream,
    ) -> Result<bool, RpcErr> {
        // the lock is released before the handler runs
        if let Some(handler) = self.lookup(service_id, method_id) {
            return handler.invoke_method(service_id, method_id, strm).await;
        }

        for invoker in &self.fallback {
            let handled = invoker.invoke_method(service_id, method_id, strm.clone()).await?;
            if handled {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::CommonRpc;
    use crate::stream::MsgStream;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        service: String,
        methods: Vec<String>,
        hits: AtomicUsize,
    }

    impl CountingHandler {
        fn new(service: &str, methods: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                service: service.to_string(),
                methods: methods.iter().map(|m| m.to_string()).collect(),
                hits: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Invoker for CountingHandler {
        async fn invoke_method(
            &self, _service_id: &str, method_id: &str, _strm: ArcStream,
        ) -> Result<bool, RpcErr> {
            if !self.methods.iter().any(|m| m == method_id) {
                return Ok(false);
            }
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    impl Handler for CountingHandler {
        fn service_id(&self) -> &str {
            &self.service
        }

        fn method_ids(&self) -> Vec<&str> {
            self.methods.iter().map(|m| m.as_str()).collect()
        }
    }

    fn dummy_stream() -> ArcStream {
        Arc::new(MsgStream::new(Arc::new(CommonRpc::new("t", "t", None)), None))
    }

    #[test]
    fn test_register_and_query() {
        let mux = Mux::new();
        let handler = CountingHandler::new("echo.Echoer", &["Echo", "EchoServerStream"]);
        mux.register(handler).expect("register");

        assert!(mux.has_service("echo.Echoer"));
        assert!(!mux.has_service("missing"));
        assert!(!mux.has_service(""));
        assert!(mux.has_service_method("echo.Echoer", "Echo"));
        assert!(mux.has_service_method("echo.Echoer", "EchoServerStream"));
        assert!(!mux.has_service_method("echo.Echoer", "Nope"));
    }

    #[test]
    fn test_register_empty_service() {
        let mux = Mux::new();
        let handler = CountingHandler::new("", &["Echo"]);
        assert_eq!(mux.register(handler), Err(RpcErr::EmptyServiceID));
    }

    #[test]
    fn test_invoke_and_empty_service_match() {
        let mux = Mux::new();
        let handler = CountingHandler::new("echo.Echoer", &["Echo"]);
        mux.register(handler.clone()).expect("register");

        block_on(async {
            assert!(mux.invoke_method("echo.Echoer", "Echo", dummy_stream()).await.expect("found"));
            // empty service id matches on method name
            assert!(mux.invoke_method("", "Echo", dummy_stream()).await.expect("found"));
            assert!(!mux.invoke_method("echo.Echoer", "Nope", dummy_stream()).await.expect("miss"));
            assert!(!mux.invoke_method("other.Svc", "Echo", dummy_stream()).await.expect("miss"));
        });
        assert_eq!(handler.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fallback_order() {
        let miss = CountingHandler::new("a.Svc", &["Other"]);
        let hit = CountingHandler::new("b.Svc", &["Target"]);
        let mux = Mux::with_fallback(vec![miss.clone() as ArcInvoker, hit.clone() as ArcInvoker]);

        block_on(async {
            assert!(mux.invoke_method("", "Target", dummy_stream()).await.expect("fallback"));
            assert!(!mux.invoke_method("", "Gone", dummy_stream()).await.expect("exhausted"));
        });
        assert_eq!(miss.hits.load(Ordering::SeqCst), 0);
        assert_eq!(hit.hits.load(Ordering::SeqCst), 1);
    }
}
