//! Gateway introspection methods.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::connections::ConnectionRegistry;
use crate::error::GatewayError;
use crate::handler::{Arguments, CallContext, Handler, Reply};
use crate::registry::{HandlerDescriptor, MethodDescriptor};
use crate::Result;

/// Namespace the system handler is registered under.
pub const SYSTEM_NAMESPACE: &str = "wiregate";

/// Action name of the system handler.
pub const SYSTEM_ACTION: &str = "System";

/// Gateway info returned by `info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Gateway name.
    pub name: String,
    /// Gateway version.
    pub version: String,
    /// Platform (macos, linux, windows).
    pub platform: String,
    /// Architecture.
    pub arch: String,
    /// Open WebSocket connections.
    pub connections: usize,
}

/// Per-call system handler.
pub struct SystemHandler {
    connections: Arc<ConnectionRegistry>,
}

impl SystemHandler {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    /// Descriptor registering this handler under `wiregate.System`, callable from any path.
    pub fn descriptor(connections: Arc<ConnectionRegistry>) -> HandlerDescriptor {
        HandlerDescriptor::new(SYSTEM_NAMESPACE, SYSTEM_ACTION, move || {
            Box::new(SystemHandler::new(Arc::clone(&connections)))
        })
        .any_path()
        .method(MethodDescriptor::new("ping").unencrypted())
        .method(MethodDescriptor::new("info"))
    }
}

#[async_trait]
impl Handler for SystemHandler {
    async fn invoke(&mut self, method: &str, _args: Arguments, _ctx: &CallContext) -> Result<Reply> {
        match method {
            "ping" => Ok(json!({
                "pong": true,
                "timestamp": Utc::now().timestamp_millis(),
            })
            .into()),
            "info" => {
                debug!("System info request");
                let info = SystemInfo {
                    name: "wiregate".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    platform: std::env::consts::OS.to_string(),
                    arch: std::env::consts::ARCH.to_string(),
                    connections: self.connections.len(),
                };
                Ok(serde_json::to_value(info)?.into())
            }
            _ => Err(GatewayError::ServiceNotFound),
        }
    }
}
