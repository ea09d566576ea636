//! Handler trait and the values that flow through a call.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::protocol::CallResult;
use crate::session::HttpSession;
use crate::Result;

/// A unit of callable methods.
///
/// A fresh instance is created for every call and released afterwards, so
/// implementations may keep per-call state in `self` and need not be `Sync`.
#[async_trait]
pub trait Handler: Send {
    /// Invoke `method` with bound arguments.
    async fn invoke(&mut self, method: &str, args: Arguments, ctx: &CallContext) -> Result<Reply>;

    /// Called exactly once when the instance is released.
    fn release(&mut self) {}
}

/// Arguments bound to a method's parameters, one slot per parameter.
///
/// Absent arguments are `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Value>,
}

impl Arguments {
    /// Wrap bound values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of parameter slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no parameter slots.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `index`, or `None` if absent.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    /// String argument.
    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Integer argument.
    pub fn i64(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_i64)
    }

    /// Float argument.
    pub fn f64(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(Value::as_f64)
    }

    /// Boolean argument.
    pub fn bool(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(Value::as_bool)
    }

    /// List argument.
    pub fn list(&self, index: usize) -> Option<&Vec<Value>> {
        self.get(index).and_then(Value::as_array)
    }

    /// Deserialize the argument at `index` into `T`.
    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        self.get(index)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| GatewayError::Conversion(e.to_string()))
    }

    /// Iterate over all slots, absent ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Take the bound values.
    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

/// What a handler returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No value: reported as a bare success.
    Empty,
    /// A fully formed result, passed through unchanged.
    Result(CallResult),
    /// Any other value, wrapped as the success payload.
    Value(Value),
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<CallResult> for Reply {
    fn from(result: CallResult) -> Self {
        Self::Result(result)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl Reply {
    /// Normalize into the result sent to the caller.
    pub fn into_result(self) -> CallResult {
        match self {
            Self::Empty => CallResult::success(),
            Self::Result(result) => result,
            Self::Value(value) => CallResult::success().with_data(value),
        }
    }
}

/// Per-call context passed explicitly to handlers.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// HTTP-level session bound to the caller, if any.
    pub session: Option<Arc<HttpSession>>,

    /// WebSocket connection the call arrived on, if any.
    pub connection_id: Option<String>,

    /// Request path the call arrived on.
    pub source_path: String,
}

impl CallContext {
    /// Create a context for a call arriving on `source_path`.
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            ..Default::default()
        }
    }

    /// Bind an HTTP session.
    pub fn with_session(mut self, session: Option<Arc<HttpSession>>) -> Self {
        self.session = session;
        self
    }

    /// Set the originating connection.
    pub fn with_connection(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    /// Whether a session is bound and still active.
    pub fn has_active_session(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_active())
    }
}

/// A handler instance that is released when dropped.
///
/// Release runs on every exit path, including unwinding out of a panicking
/// handler.
pub struct ScopedHandler {
    inner: Box<dyn Handler>,
}

impl ScopedHandler {
    /// Wrap a freshly created instance.
    pub fn new(inner: Box<dyn Handler>) -> Self {
        Self { inner }
    }
}

impl std::ops::Deref for ScopedHandler {
    type Target = dyn Handler;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl std::ops::DerefMut for ScopedHandler {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedHandler {
    fn drop(&mut self) {
        self.inner.release();
    }
}
