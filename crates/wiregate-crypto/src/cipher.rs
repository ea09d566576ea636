//! AES-128-CTR session cipher.
//!
//! The counter block is the full 16-byte IV treated as one 128-bit big-endian
//! integer, which is what Web Crypto's `AES-CTR` with `length: 128` produces.
//! Text is padded with spaces to a whole number of blocks before encryption.

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::TextEncoding;
use crate::error::{CryptoError, Result};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Length of the handshake secret: IV followed by the key.
pub const SECRET_SIZE: usize = 2 * BLOCK_SIZE;

/// Symmetric state of one logical session.
///
/// Established once by the handshake and reused for every later message on the
/// same session.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionCryptoState {
    key: [u8; BLOCK_SIZE],
    iv: [u8; BLOCK_SIZE],
}

impl std::fmt::Debug for SessionCryptoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCryptoState").finish_non_exhaustive()
    }
}

/// An outbound message encrypted under a fresh IV, both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    pub iv: String,
    pub data: String,
}

impl SessionCryptoState {
    /// Build a state from a key and IV.
    pub fn new(key: [u8; BLOCK_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Generate a random state, as a client does before the handshake.
    pub fn generate() -> Self {
        let mut key = [0u8; BLOCK_SIZE];
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Split a 32-byte handshake secret (`iv || key`) into a state.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.len() != SECRET_SIZE {
            return Err(CryptoError::InvalidSecretLength {
                expected: SECRET_SIZE,
                actual: secret.len(),
            });
        }
        let mut iv = [0u8; BLOCK_SIZE];
        let mut key = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&secret[..BLOCK_SIZE]);
        key.copy_from_slice(&secret[BLOCK_SIZE..]);
        Ok(Self { key, iv })
    }

    /// The handshake secret for this state (`iv || key`).
    pub fn to_secret(&self) -> [u8; SECRET_SIZE] {
        let mut secret = [0u8; SECRET_SIZE];
        secret[..BLOCK_SIZE].copy_from_slice(&self.iv);
        secret[BLOCK_SIZE..].copy_from_slice(&self.key);
        secret
    }

    /// The IV fixed at handshake time.
    pub fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }

    /// Apply the keystream in place. CTR mode is its own inverse.
    pub fn apply(&self, iv: &[u8; BLOCK_SIZE], buf: &mut [u8]) -> Result<()> {
        let mut cipher = Aes128Ctr::new_from_slices(&self.key, iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        cipher
            .try_apply_keystream(buf)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Encrypt bytes, returning the ciphertext.
    pub fn encrypt(&self, iv: &[u8; BLOCK_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut buf = plaintext.to_vec();
        self.apply(iv, &mut buf)?;
        Ok(buf)
    }

    /// Decrypt bytes, returning the plaintext.
    pub fn decrypt(&self, iv: &[u8; BLOCK_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let mut buf = ciphertext.to_vec();
        self.apply(iv, &mut buf)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        Ok(buf)
    }

    /// Space-pad `text` to a block multiple and encrypt it to hex.
    pub fn encrypt_text(&self, iv: &[u8; BLOCK_SIZE], text: &str) -> Result<String> {
        let mut bytes = text.as_bytes().to_vec();
        let rem = bytes.len() % BLOCK_SIZE;
        if rem != 0 {
            bytes.resize(bytes.len() + BLOCK_SIZE - rem, b' ');
        }
        self.apply(iv, &mut bytes)?;
        Ok(TextEncoding::Hex.encode(&bytes))
    }

    /// Decrypt hex ciphertext to text.
    ///
    /// Uses the handshake IV unless `iv` overrides it for this one message.
    pub fn decrypt_text(&self, ciphertext: &str, iv: Option<&[u8; BLOCK_SIZE]>) -> Result<String> {
        let bytes = TextEncoding::Hex.decode(ciphertext)?;
        let plain = self.decrypt(iv.unwrap_or(&self.iv), &bytes)?;
        String::from_utf8(plain).map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    /// Encrypt an outbound message under a fresh random IV.
    pub fn seal(&self, text: &str) -> Result<SealedMessage> {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let data = self.encrypt_text(&iv, text)?;
        Ok(SealedMessage {
            iv: TextEncoding::Hex.encode(&iv),
            data,
        })
    }

    /// Decrypt a message produced by [`seal`](Self::seal).
    pub fn open(&self, sealed: &SealedMessage) -> Result<String> {
        let iv = crate::encoding::decode_block(&sealed.iv)?;
        self.decrypt_text(&sealed.data, Some(&iv))
    }
}
