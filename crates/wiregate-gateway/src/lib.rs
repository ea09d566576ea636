//! RPC gateway for wiregate.
//!
//! This crate provides:
//! - A request dispatcher over an explicitly registered handler table
//! - An optional encryption envelope (RSA-OAEP handshake, AES-CTR payloads)
//! - A WebSocket session registry with per-connection encrypted broadcast
//! - HTTP and WebSocket transports on axum

pub mod api;
pub mod binding;
pub mod connections;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod validation;

pub use api::{ApiDescriptor, SignedApi};
pub use connections::{ConnectionEntry, ConnectionRegistry, Outbound};
pub use dispatcher::Dispatcher;
pub use envelope::EnvelopeCodec;
pub use error::{ErrorCode, GatewayError};
pub use handler::{Arguments, CallContext, Handler, Reply};
pub use protocol::{CallRequest, CallResponse, CallResult, Command, Instruction};
pub use registry::{
    Constraint, HandlerDescriptor, HandlerRegistry, MethodDescriptor, ParamSpec, ParamType,
};
pub use server::{Gateway, GatewayState};
pub use session::{HttpSession, HttpSessionStore};
pub use validation::{ConstraintValidator, ParamValidator};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
