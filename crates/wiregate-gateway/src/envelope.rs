//! Envelope codec: strips and applies the optional encryption layer.
//!
//! Inbound, an [`EncryptedBlock`] is opened with the session's crypto state,
//! running the handshake first if the block carries `k` and the session has
//! no state yet. Outbound, any frame sent on a session with crypto state is
//! sealed under a fresh IV as an [`EncryptedFrame`].

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use wiregate_crypto::{encoding, CryptoSlot, KeyStore, SealedMessage, SessionCryptoState};

use crate::error::GatewayError;
use crate::protocol::{CallRequest, EncryptedBlock, EncryptedFrame};
use crate::Result;

/// Calls decoded from an HTTP body.
#[derive(Debug, Clone)]
pub struct HttpCalls {
    pub calls: Vec<CallRequest>,
    /// The body was a JSON array, so the reply must be one too.
    pub batch: bool,
}

/// Encrypts and decrypts payloads against per-session crypto state.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    keys: Arc<KeyStore>,
}

impl EnvelopeCodec {
    /// Create a codec over the process key store.
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    /// The key store.
    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Decrypt a block to text.
    ///
    /// A `k` on a session that already has state is ignored. Ciphertext
    /// without `k` on a session with no state is rejected.
    pub fn open(&self, block: &EncryptedBlock, slot: &CryptoSlot) -> Result<String> {
        let state = match (&block.k, slot.get()) {
            (_, Some(state)) => state,
            (Some(k), None) => slot.get_or_establish(&self.keys, k)?,
            (None, None) => {
                return Err(GatewayError::EncryptionRequired(
                    "no session key established".to_string(),
                ))
            }
        };
        let iv = block
            .iv
            .as_deref()
            .map(encoding::decode_block)
            .transpose()?;
        Ok(state.decrypt_text(&block.d, iv.as_ref())?)
    }

    /// Decode an HTTP body holding one call, a batch, or an encrypted block
    /// whose plaintext is one of those.
    pub fn decode_http(&self, body: &str, slot: &CryptoSlot) -> Result<HttpCalls> {
        let value: Value = serde_json::from_str(body)?;
        if EncryptedBlock::matches(&value) {
            let block: EncryptedBlock = serde_json::from_value(value)?;
            let plain = self.open(&block, slot)?;
            let mut calls = parse_calls(serde_json::from_str(&plain)?)?;
            for call in &mut calls.calls {
                call.encrypted = true;
            }
            return Ok(calls);
        }
        parse_calls(value)
    }

    /// Replace an encrypted call's arguments with their plaintext.
    ///
    /// `data[0]` holds the block. Its plaintext is the argument array, or a
    /// single argument.
    pub fn decrypt_call(&self, request: &mut CallRequest, slot: &CryptoSlot) -> Result<()> {
        let first = request
            .data
            .first()
            .filter(|v| v.is_object())
            .ok_or_else(|| GatewayError::EncryptionRequired("missing encrypted block".to_string()))?;
        let block: EncryptedBlock = serde_json::from_value(first.clone())
            .map_err(|e| GatewayError::EncryptionRequired(e.to_string()))?;

        let plain = self.open(&block, slot)?;
        request.data = match serde_json::from_str::<Value>(&plain)? {
            Value::Array(args) => args,
            single => vec![single],
        };
        request.encrypted = true;
        Ok(())
    }

    /// Serialize `value`, sealing it if the session has crypto state.
    pub fn encode<T: Serialize>(&self, value: &T, slot: &CryptoSlot) -> Result<String> {
        let text = serde_json::to_string(value)?;
        seal(text, slot.get().as_deref())
    }
}

/// Seal `text` under `state`, or pass it through when there is no state.
pub fn seal(text: String, state: Option<&SessionCryptoState>) -> Result<String> {
    match state {
        Some(state) => {
            let frame = EncryptedFrame::from(state.seal(&text)?);
            Ok(serde_json::to_string(&frame)?)
        }
        None => Ok(text),
    }
}

/// Read an outbound frame, opening it with `state` if it is encrypted.
pub fn read_frame(text: &str, state: Option<&SessionCryptoState>) -> Result<Value> {
    let value: Value = serde_json::from_str(text)?;
    let encrypted = value.get("cmd").and_then(Value::as_str) == Some("enc") && value.get("iv").is_some();
    if !encrypted {
        return Ok(value);
    }

    let frame: EncryptedFrame = serde_json::from_value(value)?;
    let state = state.ok_or_else(|| {
        GatewayError::EncryptionRequired("encrypted frame without session key".to_string())
    })?;
    let plain = state.open(&SealedMessage::from(&frame))?;
    Ok(serde_json::from_str(&plain)?)
}

fn parse_calls(value: Value) -> Result<HttpCalls> {
    let batch = value.is_array();
    Ok(HttpCalls {
        calls: CallRequest::list_from(value)?,
        batch,
    })
}

impl From<CallRequest> for HttpCalls {
    fn from(call: CallRequest) -> Self {
        Self {
            calls: vec![call],
            batch: false,
        }
    }
}
