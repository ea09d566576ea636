//! Crypto engine for the wiregate gateway.
//!
//! Holds the process-wide key material (an RSA-OAEP encryption keypair and an
//! ECDSA P-384 signing keypair), runs the hybrid handshake that establishes a
//! per-session AES-128-CTR key, and converts ECDSA signatures between DER and
//! the raw `R || S` form browsers verify.

pub mod cipher;
pub mod encoding;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod transcode;

pub use cipher::{SealedMessage, SessionCryptoState, BLOCK_SIZE};
pub use encoding::TextEncoding;
pub use error::{CryptoError, Result};
pub use handshake::CryptoSlot;
pub use keys::{verify_with_public_key, KeyStore, SignatureFormat, MIN_RSA_KEY_BITS};
pub use transcode::{der_to_raw, raw_to_der, SignatureAlgorithm};
