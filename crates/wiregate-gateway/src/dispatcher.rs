//! Request dispatcher.
//!
//! Resolves a call to a handler and method, binds and checks its arguments,
//! invokes a fresh handler instance and normalizes the outcome. Every failure,
//! panics included, becomes a failed [`CallResult`]; nothing escapes
//! [`Dispatcher::dispatch`].

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::binding;
use crate::error::{ErrorCode, GatewayError};
use crate::handler::{CallContext, Reply};
use crate::protocol::{CallRequest, CallResponse, CallResult};
use crate::registry::HandlerRegistry;
use crate::validation::{ConstraintValidator, ParamValidator};
use crate::Result;

/// Dispatches calls against a fixed handler registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    validator: Arc<dyn ParamValidator>,
    encryption_required: bool,
    expose_errors: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.registry.len())
            .field("encryption_required", &self.encryption_required)
            .field("expose_errors", &self.expose_errors)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher using the constraint validator.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            validator: Arc::new(ConstraintValidator),
            encryption_required: false,
            expose_errors: false,
        }
    }

    /// Replace the parameter validator.
    pub fn with_validator(mut self, validator: Arc<dyn ParamValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Reject plain calls to methods that expect encryption.
    pub fn with_encryption_required(mut self, required: bool) -> Self {
        self.encryption_required = required;
        self
    }

    /// Report internal failure detail to callers.
    pub fn with_expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    /// The handler registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Whether internal failure detail reaches callers.
    pub fn expose_errors(&self) -> bool {
        self.expose_errors
    }

    /// Dispatch one call. Always returns a response carrying the call's tid.
    pub async fn dispatch(&self, request: &CallRequest, ctx: &CallContext) -> CallResponse {
        let outcome = AssertUnwindSafe(self.execute(request, ctx))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(err)) => {
                match err.code() {
                    ErrorCode::GeneralError => warn!(
                        "Call {}.{}.{} failed: {}",
                        request.namespace, request.action, request.method, err
                    ),
                    _ => debug!(
                        "Call {}.{}.{} rejected: {}",
                        request.namespace, request.action, request.method, err
                    ),
                }
                CallResult::from_error(&err, self.expose_errors)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(
                    "Handler panicked in {}.{}.{}: {}",
                    request.namespace, request.action, request.method, detail
                );
                let msg = if self.expose_errors {
                    detail
                } else {
                    ErrorCode::GeneralError.message().to_string()
                };
                CallResult::failure(ErrorCode::GeneralError, msg)
            }
        };

        CallResponse::for_request(request, result)
    }

    /// Dispatch a batch. Each call gets its own response, in request order,
    /// regardless of how its siblings fare.
    pub async fn dispatch_batch(&self, requests: &[CallRequest], ctx: &CallContext) -> Vec<CallResponse> {
        join_all(requests.iter().map(|request| self.dispatch(request, ctx))).await
    }

    async fn execute(&self, request: &CallRequest, ctx: &CallContext) -> Result<Reply> {
        if let Some(reason) = &request.malformed {
            return Err(GatewayError::Protocol(reason.clone()));
        }

        let handler = self
            .registry
            .resolve(&request.namespace, &request.action)
            .ok_or(GatewayError::ServiceNotFound)?;

        if !handler.allows_path(&ctx.source_path) {
            debug!(
                "{}.{} not reachable from {}",
                handler.namespace, handler.action, ctx.source_path
            );
            return Err(GatewayError::ServiceNotFound);
        }

        if handler.requires_session && !ctx.has_active_session() {
            debug!("{}.{} requires an active session", handler.namespace, handler.action);
            return Err(GatewayError::ServiceNotFound);
        }

        let method = handler
            .find_method(&request.method)
            .ok_or(GatewayError::ServiceNotFound)?;

        if self.encryption_required && method.encrypt && !request.encrypted {
            return Err(GatewayError::EncryptionRequired(format!(
                "{}.{}.{} only accepts encrypted calls",
                handler.namespace, handler.action, method.name
            )));
        }

        let args = binding::bind(method, &request.data)?;
        binding::check_required(method, &args)?;

        if method.validate {
            let violations = self.validator.validate(method, &args);
            if !violations.is_empty() {
                return Err(GatewayError::ValidationFailed {
                    code: method.failure_code,
                    message: violations.join("\n").trim().to_string(),
                });
            }
        }

        let mut instance = handler.acquire();
        instance.invoke(&method.name, args, ctx).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
