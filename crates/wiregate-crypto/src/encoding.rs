//! Text encodings used on the wire: hex, base64 and header-less PEM.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CryptoError, Result};

/// Text encoding for binary values handed to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Hex,
    Base64,
}

impl TextEncoding {
    /// Encode bytes in this encoding.
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Hex => hex::encode(bytes),
            Self::Base64 => STANDARD.encode(bytes),
        }
    }

    /// Decode text in this encoding.
    pub fn decode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Self::Hex => hex::decode(text.trim()).map_err(|e| CryptoError::Encoding(e.to_string())),
            Self::Base64 => STANDARD
                .decode(text.trim())
                .map_err(|e| CryptoError::Encoding(e.to_string())),
        }
    }

    /// Guess the encoding of `text`. Even-length hex digits win over base64.
    pub fn detect(text: &str) -> Self {
        let text = text.trim();
        if !text.is_empty() && text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self::Hex
        } else {
            Self::Base64
        }
    }
}

/// Decode a hex or base64 value, detecting which one it is.
pub fn decode_auto(text: &str) -> Result<Vec<u8>> {
    TextEncoding::detect(text).decode(text)
}

/// Decode a hex value into a fixed 16-byte block.
pub fn decode_block(text: &str) -> Result<[u8; 16]> {
    let bytes = TextEncoding::Hex.decode(text)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::Encoding(format!("expected 16 bytes, got {}", v.len())))
}

/// Wrap DER bytes in a PEM block with 64-column lines.
pub fn pem_encode(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}

/// Strip PEM armour lines and all whitespace, leaving the bare base64 body.
pub fn flatten_pem(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
        .collect()
}
