//! Process-wide key material.
//!
//! One RSA keypair encrypts handshake secrets and may be rotated. One ECDSA
//! P-384 keypair signs the published public keys; it is created on first use
//! and lives as long as the store.

use std::sync::OnceLock;

use parking_lot::RwLock;
use rand::rngs::OsRng;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P384_SHA384_ASN1,
    ECDSA_P384_SHA384_ASN1_SIGNING, ECDSA_P384_SHA384_FIXED,
};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::{debug, info};

use crate::encoding::{self, TextEncoding};
use crate::error::{CryptoError, Result};
use crate::transcode::{self, SignatureAlgorithm};

/// Smallest RSA modulus the store will generate or accept.
pub const MIN_RSA_KEY_BITS: usize = 1024;

/// SubjectPublicKeyInfo header for an uncompressed P-384 point.
const P384_SPKI_PREFIX: [u8; 23] = [
    0x30, 0x76, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05,
    0x2b, 0x81, 0x04, 0x00, 0x22, 0x03, 0x62, 0x00,
];

/// Uncompressed P-384 point length.
const P384_POINT_LEN: usize = 97;

/// Output shape of an ECDSA signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureFormat {
    /// Fixed-length `R || S`, as browsers verify.
    #[default]
    Raw,
    /// ASN.1 DER `SEQUENCE { r, s }`.
    Der,
}

struct EncryptionKeys {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    public_pem: String,
    bits: usize,
}

impl EncryptionKeys {
    fn generate(bits: usize) -> Result<Self> {
        if bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "RSA key size {} is below the minimum of {}",
                bits, MIN_RSA_KEY_BITS
            )));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private(private)
    }

    fn from_private(private: RsaPrivateKey) -> Result<Self> {
        let public = RsaPublicKey::from(&private);
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let bits = rsa::traits::PublicKeyParts::size(&public) * 8;
        Ok(Self {
            private,
            public,
            public_pem,
            bits,
        })
    }
}

struct SigningKeys {
    pair: EcdsaKeyPair,
    public_pem: String,
}

impl SigningKeys {
    fn generate(rng: &SystemRandom) -> Result<Self> {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, rng)
            .map_err(|_| CryptoError::KeyGeneration("ECDSA P-384".to_string()))?;
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, pkcs8.as_ref(), rng)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let mut spki = P384_SPKI_PREFIX.to_vec();
        spki.extend_from_slice(pair.public_key().as_ref());
        let public_pem = encoding::pem_encode("PUBLIC KEY", &spki);

        Ok(Self { pair, public_pem })
    }
}

/// Holder of the gateway's asymmetric keys.
pub struct KeyStore {
    encryption: RwLock<EncryptionKeys>,
    signing: OnceLock<SigningKeys>,
    rng: SystemRandom,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("rsa_bits", &self.rsa_bits())
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Generate both keypairs. Called once at startup.
    pub fn initialize(rsa_bits: usize) -> Result<Self> {
        let store = Self {
            encryption: RwLock::new(EncryptionKeys::generate(rsa_bits)?),
            signing: OnceLock::new(),
            rng: SystemRandom::new(),
        };
        store.signing()?;
        info!("Initialized key store with RSA-{} encryption key", rsa_bits);
        Ok(store)
    }

    /// Build a store around an existing RSA keypair (PKCS#8 private, SPKI public PEM).
    pub fn from_pem(public_pem: &str, private_pem: &str) -> Result<Self> {
        let store = Self {
            encryption: RwLock::new(Self::load_encryption_keys(public_pem, private_pem)?),
            signing: OnceLock::new(),
            rng: SystemRandom::new(),
        };
        store.signing()?;
        info!("Loaded RSA-{} encryption key", store.rsa_bits());
        Ok(store)
    }

    fn load_encryption_keys(public_pem: &str, private_pem: &str) -> Result<EncryptionKeys> {
        let private = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let public = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if RsaPublicKey::from(&private) != public {
            return Err(CryptoError::InvalidKey(
                "public key does not match private key".to_string(),
            ));
        }
        let keys = EncryptionKeys::from_private(private)?;
        if keys.bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::InvalidKey(format!("RSA-{} is too small", keys.bits)));
        }
        Ok(keys)
    }

    /// Replace the encryption keypair with an externally supplied one.
    pub fn install_encryption_keys(&self, public_pem: &str, private_pem: &str) -> Result<()> {
        let keys = Self::load_encryption_keys(public_pem, private_pem)?;
        *self.encryption.write() = keys;
        info!("Installed external encryption key");
        Ok(())
    }

    /// Generate a fresh encryption keypair of the same size.
    ///
    /// The signing keypair is not touched. Sessions that already completed a
    /// handshake keep their symmetric state.
    pub fn rotate(&self) -> Result<()> {
        let bits = self.rsa_bits();
        let keys = EncryptionKeys::generate(bits)?;
        *self.encryption.write() = keys;
        info!("Rotated RSA-{} encryption key", bits);
        Ok(())
    }

    /// Size of the encryption modulus in bits.
    pub fn rsa_bits(&self) -> usize {
        self.encryption.read().bits
    }

    fn signing(&self) -> Result<&SigningKeys> {
        if let Some(keys) = self.signing.get() {
            return Ok(keys);
        }
        let keys = SigningKeys::generate(&self.rng)?;
        // Another caller may have won the race; theirs is kept
        let _ = self.signing.set(keys);
        self.signing
            .get()
            .ok_or_else(|| CryptoError::KeyGeneration("signing key unavailable".to_string()))
    }

    /// Encryption public key as SPKI PEM.
    pub fn encryption_public_key_pem(&self) -> String {
        self.encryption.read().public_pem.clone()
    }

    /// Encryption public key as single-line base64.
    pub fn encryption_public_key(&self) -> String {
        encoding::flatten_pem(&self.encryption.read().public_pem)
    }

    /// Signing public key as SPKI PEM.
    pub fn signing_public_key_pem(&self) -> Result<String> {
        Ok(self.signing()?.public_pem.clone())
    }

    /// Signing public key as single-line base64.
    pub fn signing_public_key(&self) -> Result<String> {
        Ok(encoding::flatten_pem(&self.signing()?.public_pem))
    }

    /// RSA-OAEP (SHA-256) decrypt a hex or base64 encoded value.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let ciphertext = encoding::decode_auto(encoded)?;
        self.encryption
            .read()
            .private
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|e| {
                debug!("RSA decrypt failed: {}", e);
                CryptoError::Decryption("RSA-OAEP".to_string())
            })
    }

    /// RSA-OAEP (SHA-256) encrypt with the store's own public key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encryption
            .read()
            .public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Sign `message` with ECDSA P-384 / SHA-384.
    pub fn sign(&self, message: &[u8], format: SignatureFormat) -> Result<Vec<u8>> {
        let der = self
            .signing()?
            .pair
            .sign(&self.rng, message)
            .map_err(|_| CryptoError::Signing)?;
        match format {
            SignatureFormat::Der => Ok(der.as_ref().to_vec()),
            SignatureFormat::Raw => transcode::der_to_raw(
                der.as_ref(),
                SignatureAlgorithm::EcdsaP384Sha384.raw_len(),
            ),
        }
    }

    /// Verify a signature made by this store's signing key.
    pub fn verify(&self, message: &[u8], signature: &[u8], format: SignatureFormat) -> Result<()> {
        let point = self.signing()?.pair.public_key().as_ref().to_vec();
        verify_point(&point, message, signature, format)
    }

    /// The message a challenge signature covers: challenge, encryption key, signing key.
    pub fn challenge_message(&self, challenge: &str) -> Result<String> {
        Ok(format!(
            "{}{}{}",
            challenge,
            self.encryption_public_key(),
            self.signing_public_key()?
        ))
    }

    /// Sign a client challenge together with both public keys.
    pub fn sign_challenge(
        &self,
        challenge: &str,
        format: SignatureFormat,
        encoding: TextEncoding,
    ) -> Result<String> {
        let message = self.challenge_message(challenge)?;
        let signature = self.sign(message.as_bytes(), format)?;
        Ok(encoding.encode(&signature))
    }
}

fn verify_point(
    point: &[u8],
    message: &[u8],
    signature: &[u8],
    format: SignatureFormat,
) -> Result<()> {
    let alg = match format {
        SignatureFormat::Raw => &ECDSA_P384_SHA384_FIXED,
        SignatureFormat::Der => &ECDSA_P384_SHA384_ASN1,
    };
    UnparsedPublicKey::new(alg, point)
        .verify(message, signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Verify a P-384 signature against a published signing key.
///
/// `public_key` is the SPKI as PEM or as flattened base64.
pub fn verify_with_public_key(
    public_key: &str,
    message: &[u8],
    signature: &[u8],
    format: SignatureFormat,
) -> Result<()> {
    let spki = TextEncoding::Base64.decode(&encoding::flatten_pem(public_key))?;
    if spki.len() != P384_SPKI_PREFIX.len() + P384_POINT_LEN || !spki.starts_with(&P384_SPKI_PREFIX) {
        return Err(CryptoError::InvalidKey("not a P-384 public key".to_string()));
    }
    verify_point(&spki[P384_SPKI_PREFIX.len()..], message, signature, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn store() -> KeyStore {
        KeyStore::initialize(MIN_RSA_KEY_BITS).unwrap()
    }

    #[test]
    fn test_rejects_small_keys() {
        assert!(matches!(
            KeyStore::initialize(512),
            Err(CryptoError::KeyGeneration(_))
        ));
    }

    #[test]
    fn test_rsa_round_trip() {
        let keys = store();
        assert_eq!(keys.rsa_bits(), 1024);

        let secret: Vec<u8> = (0u8..32).collect();
        let ct = keys.encrypt(&secret).unwrap();
        assert_eq!(keys.decrypt(&hex::encode(&ct)).unwrap(), secret);
        assert_eq!(keys.decrypt(&TextEncoding::Base64.encode(&ct)).unwrap(), secret);
    }

    #[test]
    fn test_decrypt_garbage_is_generic() {
        let keys = store();
        let err = keys.decrypt(&hex::encode([0u8; 128])).unwrap_err();
        assert_eq!(err.to_string(), "Decryption failed: RSA-OAEP");
    }

    #[test]
    fn test_public_keys_are_flat() {
        let keys = store();
        let enc = keys.encryption_public_key();
        let ver = keys.signing_public_key().unwrap();
        for key in [&enc, &ver] {
            assert!(!key.contains("-----"));
            assert!(!key.contains('\n'));
        }
        assert!(keys.encryption_public_key_pem().starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(keys.signing_public_key_pem().unwrap().contains(&ver[..40]));
    }

    #[test]
    fn test_sign_and_verify_both_formats() {
        let keys = store();
        let raw = keys.sign(b"hello", SignatureFormat::Raw).unwrap();
        assert_eq!(raw.len(), 96);
        keys.verify(b"hello", &raw, SignatureFormat::Raw).unwrap();
        assert!(keys.verify(b"hellO", &raw, SignatureFormat::Raw).is_err());

        let der = keys.sign(b"hello", SignatureFormat::Der).unwrap();
        assert_eq!(der[0], 0x30);
        keys.verify(b"hello", &der, SignatureFormat::Der).unwrap();
    }

    #[test]
    fn test_sign_challenge_verifies_with_published_key() {
        let keys = store();
        let sig = keys
            .sign_challenge("1700000000", SignatureFormat::Raw, TextEncoding::Base64)
            .unwrap();
        let sig = TextEncoding::Base64.decode(&sig).unwrap();

        let message = format!(
            "1700000000{}{}",
            keys.encryption_public_key(),
            keys.signing_public_key().unwrap()
        );
        verify_with_public_key(
            &keys.signing_public_key().unwrap(),
            message.as_bytes(),
            &sig,
            SignatureFormat::Raw,
        )
        .unwrap();

        assert!(matches!(
            verify_with_public_key(
                &keys.signing_public_key().unwrap(),
                b"1700000001",
                &sig,
                SignatureFormat::Raw
            ),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_rotate_keeps_signing_key() {
        let keys = store();
        let enc_before = keys.encryption_public_key();
        let ver_before = keys.signing_public_key().unwrap();

        keys.rotate().unwrap();

        assert_ne!(keys.encryption_public_key(), enc_before);
        assert_eq!(keys.signing_public_key().unwrap(), ver_before);
        assert_eq!(keys.rsa_bits(), 1024);
    }

    #[test]
    fn test_install_external_keys() {
        let keys = store();
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);
        let private_pem = private.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = public.to_public_key_pem(LineEnding::LF).unwrap();

        keys.install_encryption_keys(&public_pem, &private_pem).unwrap();
        assert_eq!(keys.encryption_public_key_pem(), public_pem);

        let other = RsaPublicKey::from(&RsaPrivateKey::new(&mut OsRng, 1024).unwrap())
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        assert!(keys.install_encryption_keys(&other, &private_pem).is_err());

        let loaded = KeyStore::from_pem(&public_pem, &private_pem).unwrap();
        assert_eq!(loaded.encryption_public_key(), keys.encryption_public_key());
    }
}
