//! Hybrid key exchange.
//!
//! The client draws a random IV and AES key, encrypts `iv || key` with the
//! server's RSA public key and sends it as `k` with its first encrypted
//! message. The server recovers the secret once per session and stores the
//! resulting [`SessionCryptoState`] in that session's [`CryptoSlot`].

use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::cipher::SessionCryptoState;
use crate::encoding::{self, TextEncoding};
use crate::error::{CryptoError, Result};
use crate::keys::KeyStore;

/// Recover a session state from an encoded handshake secret.
pub fn establish(keys: &KeyStore, secret: &str) -> Result<SessionCryptoState> {
    let secret = Zeroizing::new(keys.decrypt(secret)?);
    SessionCryptoState::from_secret(&secret)
}

/// Client side of the handshake: encrypt `state`'s secret for the server.
///
/// `public_key` is the server's SPKI, as PEM or flattened base64.
pub fn seal_secret(
    public_key: &str,
    state: &SessionCryptoState,
    encoding: TextEncoding,
) -> Result<String> {
    let der = TextEncoding::Base64.decode(&encoding::flatten_pem(public_key))?;
    let public = RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let secret = Zeroizing::new(state.to_secret());
    let ciphertext = public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &secret[..])
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(encoding.encode(&ciphertext))
}

/// Per-session holder of the symmetric state.
///
/// The first successful handshake wins. Later secrets presented on the same
/// session are ignored and the installed state is returned unchanged.
#[derive(Debug, Default)]
pub struct CryptoSlot {
    state: RwLock<Option<Arc<SessionCryptoState>>>,
}

impl CryptoSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The installed state, if any.
    pub fn get(&self) -> Option<Arc<SessionCryptoState>> {
        self.state.read().clone()
    }

    /// Whether a handshake has completed on this session.
    pub fn is_established(&self) -> bool {
        self.state.read().is_some()
    }

    /// Return the installed state, running the handshake with `secret` if
    /// there is none yet.
    ///
    /// The check and the install happen under this slot's write lock, so two
    /// racing first messages install exactly one state.
    pub fn get_or_establish(&self, keys: &KeyStore, secret: &str) -> Result<Arc<SessionCryptoState>> {
        if let Some(state) = self.get() {
            debug!("Session already has crypto state, ignoring handshake secret");
            return Ok(state);
        }

        let mut slot = self.state.write();
        if let Some(state) = slot.as_ref() {
            return Ok(Arc::clone(state));
        }
        let state = Arc::new(establish(keys, secret)?);
        *slot = Some(Arc::clone(&state));
        debug!("Established session crypto state");
        Ok(state)
    }

    /// Install a state directly unless one is already present.
    ///
    /// Returns the state that ends up installed.
    pub fn install(&self, state: SessionCryptoState) -> Arc<SessionCryptoState> {
        let mut slot = self.state.write();
        match slot.as_ref() {
            Some(existing) => Arc::clone(existing),
            None => {
                let state = Arc::new(state);
                *slot = Some(Arc::clone(&state));
                state
            }
        }
    }

    /// Drop the state when the session ends.
    pub fn clear(&self) {
        self.state.write().take();
    }
}
