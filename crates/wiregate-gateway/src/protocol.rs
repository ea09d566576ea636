//! Wire types: calls, results, encrypted blocks and WebSocket instructions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use wiregate_crypto::SealedMessage;

use crate::error::{ErrorCode, GatewayError};

/// Frame type carried by every WebSocket instruction.
pub const WS_TYPE: &str = "ws";

/// Default call type.
pub const RPC_TYPE: &str = "rpc";

fn default_rpc_type() -> String {
    RPC_TYPE.to_string()
}

fn default_ws_type() -> String {
    WS_TYPE.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    /// Handler namespace.
    #[serde(default)]
    pub namespace: String,

    /// Handler action.
    #[serde(default)]
    pub action: String,

    /// Method name (case-sensitive).
    #[serde(default)]
    pub method: String,

    /// Transaction ID, echoed back unchanged.
    #[serde(default)]
    pub tid: Value,

    /// Call type, echoed back unchanged.
    #[serde(rename = "type", default = "default_rpc_type")]
    pub kind: String,

    /// Positional arguments.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<Value>,

    /// Whether the arguments arrived encrypted. Never on the wire.
    #[serde(skip)]
    pub encrypted: bool,

    /// Why the entry could not be decoded. Such a call fails on its own.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl CallRequest {
    /// Create a new call.
    pub fn new(
        namespace: impl Into<String>,
        action: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            action: action.into(),
            method: method.into(),
            tid: Value::Null,
            kind: default_rpc_type(),
            data: Vec::new(),
            encrypted: false,
            malformed: None,
        }
    }

    /// Decode one entry of a call list.
    ///
    /// An entry that does not decode still yields a call, carrying whatever
    /// routing fields are readable and marked malformed, so that its siblings
    /// are unaffected.
    pub fn from_entry(entry: Value) -> Self {
        match Self::deserialize(&entry) {
            Ok(call) => call,
            Err(e) => {
                let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
                Self {
                    namespace: text("namespace").unwrap_or_default(),
                    action: text("action").unwrap_or_default(),
                    method: text("method").unwrap_or_default(),
                    tid: entry.get("tid").cloned().unwrap_or(Value::Null),
                    kind: text("type").unwrap_or_else(default_rpc_type),
                    data: Vec::new(),
                    encrypted: false,
                    malformed: Some(e.to_string()),
                }
            }
        }
    }

    /// Decode a call list: an array of entries or a single call object.
    pub fn list_from(value: Value) -> Result<Vec<Self>, GatewayError> {
        match value {
            Value::Array(entries) => Ok(entries.into_iter().map(Self::from_entry).collect()),
            Value::Object(_) => Ok(vec![Self::from_entry(value)]),
            _ => Err(GatewayError::Protocol("expected a call or a list of calls".into())),
        }
    }

    /// Set the transaction ID.
    pub fn with_tid(mut self, tid: impl Into<Value>) -> Self {
        self.tid = tid.into();
        self
    }

    /// Set the arguments.
    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    /// Mark the call as having arrived encrypted.
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }
}

/// Outcome of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Human-readable message.
    #[serde(default)]
    pub msg: Option<String>,

    /// Error code on failure.
    #[serde(default)]
    pub code: Option<ErrorCode>,

    /// Payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl CallResult {
    /// A bare success.
    pub fn success() -> Self {
        Self {
            success: true,
            msg: None,
            code: None,
            data: None,
        }
    }

    /// A failure with a code and message.
    pub fn failure(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: Some(msg.into()),
            code: Some(code),
            data: None,
        }
    }

    /// A failure carrying an error's code and client-safe message.
    pub fn from_error(err: &GatewayError, expose: bool) -> Self {
        Self::failure(err.code(), err.client_message(expose))
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a message.
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }
}

/// Response to one [`CallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub action: String,
    pub method: String,
    pub tid: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub result: CallResult,
}

impl CallResponse {
    /// Build the response for `request`, copying its routing fields.
    pub fn for_request(request: &CallRequest, result: CallResult) -> Self {
        Self {
            action: request.action.clone(),
            method: request.method.clone(),
            tid: request.tid.clone(),
            kind: request.kind.clone(),
            result,
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.result.success
    }
}

/// Encrypted payload: `d` is AES ciphertext, `k` the RSA-wrapped secret on
/// first contact, `iv` an optional per-message IV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlock {
    pub d: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
}

impl EncryptedBlock {
    /// Whether a JSON value looks like an encrypted block rather than a call.
    pub fn matches(value: &Value) -> bool {
        value.get("d").map_or(false, Value::is_string) && value.get("action").is_none()
    }
}

/// Outbound encrypted frame: `{iv, d, cmd: "enc"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFrame {
    pub iv: String,
    pub d: String,
    pub cmd: Command,
}

impl From<SealedMessage> for EncryptedFrame {
    fn from(sealed: SealedMessage) -> Self {
        Self {
            iv: sealed.iv,
            d: sealed.data,
            cmd: Command::Enc,
        }
    }
}

impl From<&EncryptedFrame> for SealedMessage {
    fn from(frame: &EncryptedFrame) -> Self {
        SealedMessage {
            iv: frame.iv.clone(),
            data: frame.d.clone(),
        }
    }
}

/// WebSocket instruction command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    #[serde(alias = "welco")]
    Welcome,
    Api,
    Bye,
    #[serde(alias = "err")]
    Error,
    Data,
    Enc,
    Echo,
}

/// A WebSocket frame in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type", default = "default_ws_type")]
    pub kind: String,

    pub cmd: Command,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    #[serde(rename = "errMsg", default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,

    #[serde(rename = "errId", default, skip_serializing_if = "Option::is_none")]
    pub err_id: Option<String>,
}

impl Instruction {
    /// Create an instruction without data.
    pub fn new(cmd: Command) -> Self {
        Self {
            kind: default_ws_type(),
            cmd,
            data: Value::Null,
            err_msg: None,
            err_id: None,
        }
    }

    /// Attach data.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// An `error` instruction.
    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        let mut instruction = Self::new(Command::Error);
        instruction.err_msg = Some(msg.into());
        instruction.err_id = Some(code.as_str().to_string());
        instruction
    }

    /// A `data` instruction carrying call responses in request order.
    pub fn responses(responses: &[CallResponse]) -> Result<Self, GatewayError> {
        Ok(Self::new(Command::Data).with_data(serde_json::to_value(responses)?))
    }

    /// Whether the frame is addressed to the WebSocket protocol.
    pub fn is_ws(&self) -> bool {
        self.kind == WS_TYPE
    }

    /// Calls batched in a `data` or `enc` instruction.
    pub fn calls(&self) -> Result<Vec<CallRequest>, GatewayError> {
        match &self.data {
            Value::Null => Ok(Vec::new()),
            data => CallRequest::list_from(data.clone()),
        }
    }
}
