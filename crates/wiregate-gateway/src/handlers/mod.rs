//! Built-in handlers.
//!
//! Applications register their own handlers next to these through
//! [`HandlerRegistry::builder`].

pub mod demo;
pub mod system;

use std::sync::Arc;

use crate::connections::ConnectionRegistry;
use crate::registry::{HandlerRegistry, HandlerRegistryBuilder};
use crate::Result;

pub use demo::{DemoHandler, User, UserStore, DEFAULT_NAMESPACE, DEMO_ACTION};
pub use system::{SystemHandler, SystemInfo, SYSTEM_ACTION, SYSTEM_NAMESPACE};

/// Add the built-in handlers to `builder`.
///
/// `paths` restricts the demo handler; the system handler accepts any path.
pub fn register_builtin(
    builder: HandlerRegistryBuilder,
    namespace: &str,
    paths: &[&str],
    connections: Arc<ConnectionRegistry>,
) -> HandlerRegistryBuilder {
    builder
        .register(SystemHandler::descriptor(connections))
        .register(DemoHandler::descriptor(
            namespace,
            paths,
            Arc::new(UserStore::new()),
        ))
}

/// Registry holding only the built-in handlers.
pub fn builtin_registry(
    namespace: &str,
    paths: &[&str],
    connections: Arc<ConnectionRegistry>,
) -> Result<HandlerRegistry> {
    register_builtin(HandlerRegistry::builder(), namespace, paths, connections).build()
}
