//! ECDSA signature transcoding between ASN.1 DER and raw `R || S`.
//!
//! Signing primitives emit `SEQUENCE { INTEGER r, INTEGER s }`; browser
//! verifiers expect both integers left-padded to the field size and
//! concatenated.

use crate::error::{CryptoError, Result};

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;
const LONG_FORM_ONE_BYTE: u8 = 0x81;

/// Supported ECDSA curve/hash combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    EcdsaP521Sha512,
}

impl SignatureAlgorithm {
    /// Length of the raw `R || S` signature: two field-size integers.
    pub fn raw_len(&self) -> usize {
        match self {
            Self::EcdsaP256Sha256 => 64,
            Self::EcdsaP384Sha384 => 96,
            // 521 bits round up to 66 bytes
            Self::EcdsaP521Sha512 => 132,
        }
    }

    /// Look up by hash size in bits (256, 384 or 512).
    pub fn from_hash_bits(bits: usize) -> Option<Self> {
        match bits {
            256 => Some(Self::EcdsaP256Sha256),
            384 => Some(Self::EcdsaP384Sha384),
            512 => Some(Self::EcdsaP521Sha512),
            _ => None,
        }
    }

    /// Algorithm whose raw signatures are `len` bytes long.
    pub fn from_raw_len(len: usize) -> Option<Self> {
        [Self::EcdsaP256Sha256, Self::EcdsaP384Sha384, Self::EcdsaP521Sha512]
            .into_iter()
            .find(|alg| alg.raw_len() == len)
    }
}

fn malformed(msg: impl Into<String>) -> CryptoError {
    CryptoError::MalformedSignature(msg.into())
}

/// Read one DER INTEGER at `offset`, returning its content and the next offset.
fn read_integer(der: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    if der.get(offset) != Some(&TAG_INTEGER) {
        return Err(malformed("expected INTEGER tag"));
    }
    let len = *der.get(offset + 1).ok_or_else(|| malformed("truncated INTEGER"))? as usize;
    if len == 0 || len >= 0x80 {
        return Err(malformed("invalid INTEGER length"));
    }
    let start = offset + 2;
    let value = der
        .get(start..start + len)
        .ok_or_else(|| malformed("INTEGER overruns signature"))?;
    Ok((value, start + len))
}

/// Convert a DER signature to raw `R || S` of `output_len` bytes.
pub fn der_to_raw(der: &[u8], output_len: usize) -> Result<Vec<u8>> {
    if output_len == 0 || output_len % 2 != 0 {
        return Err(malformed(format!("invalid output length {}", output_len)));
    }
    if der.len() < 8 || der[0] != TAG_SEQUENCE {
        return Err(malformed("expected SEQUENCE"));
    }

    let (seq_len, offset) = match der[1] {
        len if len < 0x80 => (len as usize, 2),
        LONG_FORM_ONE_BYTE => (der[2] as usize, 3),
        _ => return Err(malformed("unsupported length encoding")),
    };
    if seq_len != der.len() - offset {
        return Err(malformed("SEQUENCE length does not match input"));
    }

    let (r, next) = read_integer(der, offset)?;
    let (s, end) = read_integer(der, next)?;
    if end != der.len() {
        return Err(malformed("trailing bytes after INTEGER s"));
    }

    let half = output_len / 2;
    let mut raw = vec![0u8; output_len];
    let (raw_r, raw_s) = raw.split_at_mut(half);
    for (value, slot) in [(r, raw_r), (s, raw_s)] {
        let trimmed = strip_leading_zeros(value);
        if trimmed.len() > half {
            return Err(malformed("integer larger than field size"));
        }
        slot[half - trimmed.len()..].copy_from_slice(trimmed);
    }
    Ok(raw)
}

/// Convert a raw `R || S` signature back to DER.
pub fn raw_to_der(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(malformed(format!("invalid raw signature length {}", raw.len())));
    }

    let (r, s) = raw.split_at(raw.len() / 2);
    let r = encode_integer(r);
    let s = encode_integer(s);
    let body_len = r.len() + s.len();

    let mut der = Vec::with_capacity(body_len + 3);
    der.push(TAG_SEQUENCE);
    if body_len < 0x80 {
        der.push(body_len as u8);
    } else if body_len <= 0xff {
        der.push(LONG_FORM_ONE_BYTE);
        der.push(body_len as u8);
    } else {
        return Err(malformed("signature too long"));
    }
    der.extend_from_slice(&r);
    der.extend_from_slice(&s);
    Ok(der)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Encode an unsigned big-endian integer as a DER INTEGER.
fn encode_integer(bytes: &[u8]) -> Vec<u8> {
    let trimmed = strip_leading_zeros(bytes);
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    // Keep the value positive and non-empty
    if trimmed.first().map_or(true, |b| b & 0x80 != 0) {
        content.push(0);
    }
    content.extend_from_slice(trimmed);

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(TAG_INTEGER);
    out.push(content.len() as u8);
    out.extend_from_slice(&content);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{
        EcdsaKeyPair, EcdsaSigningAlgorithm, ECDSA_P256_SHA256_ASN1_SIGNING,
        ECDSA_P384_SHA384_ASN1_SIGNING,
    };

    fn der_signature(alg: &'static EcdsaSigningAlgorithm) -> Vec<u8> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg, &rng).unwrap();
        let pair = EcdsaKeyPair::from_pkcs8(alg, pkcs8.as_ref(), &rng).unwrap();
        pair.sign(&rng, b"challenge").unwrap().as_ref().to_vec()
    }

    #[test]
    fn test_raw_lengths() {
        assert_eq!(SignatureAlgorithm::from_hash_bits(256).unwrap().raw_len(), 64);
        assert_eq!(SignatureAlgorithm::from_hash_bits(384).unwrap().raw_len(), 96);
        assert_eq!(SignatureAlgorithm::from_hash_bits(512).unwrap().raw_len(), 132);
        assert!(SignatureAlgorithm::from_hash_bits(128).is_none());
        assert_eq!(
            SignatureAlgorithm::from_raw_len(96),
            Some(SignatureAlgorithm::EcdsaP384Sha384)
        );
    }

    #[test]
    fn test_round_trip_p256_and_p384() {
        for (alg, len) in [
            (&ECDSA_P256_SHA256_ASN1_SIGNING, 64),
            (&ECDSA_P384_SHA384_ASN1_SIGNING, 96),
        ] {
            for _ in 0..8 {
                let der = der_signature(alg);
                let raw = der_to_raw(&der, len).unwrap();
                assert_eq!(raw.len(), len);
                assert_eq!(raw_to_der(&raw).unwrap(), der);
                assert_eq!(der_to_raw(&raw_to_der(&raw).unwrap(), len).unwrap(), raw);
            }
        }
    }

    #[test]
    fn test_p521_sized_round_trip() {
        // Long-form SEQUENCE length and 66-byte integers
        let mut raw = vec![0u8; 132];
        raw[0] = 0x01;
        raw[1..66].fill(0xab);
        raw[66] = 0x01;
        raw[67..].fill(0xcd);

        let der = raw_to_der(&raw).unwrap();
        assert_eq!(der[1], LONG_FORM_ONE_BYTE);
        assert_eq!(der_to_raw(&der, 132).unwrap(), raw);
    }

    #[test]
    fn test_small_integers_are_left_padded() {
        let der = [0x30, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07];
        let raw = der_to_raw(&der, 64).unwrap();
        assert_eq!(raw[31], 5);
        assert_eq!(raw[63], 7);
        assert!(raw[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_high_bit_gets_sign_byte() {
        let mut raw = vec![0u8; 64];
        raw[0] = 0x80;
        raw[32] = 0x01;
        let der = raw_to_der(&raw).unwrap();
        assert_eq!(&der[2..5], &[TAG_INTEGER, 33, 0x00]);
    }

    #[test]
    fn test_rejects_malformed_der() {
        let good = der_signature(&ECDSA_P384_SHA384_ASN1_SIGNING);

        let mut wrong_tag = good.clone();
        wrong_tag[0] = 0x31;
        assert!(der_to_raw(&wrong_tag, 96).is_err());

        let mut wrong_len = good.clone();
        wrong_len[1] = wrong_len[1].wrapping_add(1);
        assert!(der_to_raw(&wrong_len, 96).is_err());

        let mut wrong_int = good.clone();
        let idx = if good[1] == LONG_FORM_ONE_BYTE { 3 } else { 2 };
        wrong_int[idx] = 0x04;
        assert!(der_to_raw(&wrong_int, 96).is_err());

        let mut trailing = good.clone();
        trailing.push(0);
        assert!(der_to_raw(&trailing, 96).is_err());

        assert!(der_to_raw(&good[..good.len() - 1], 96).is_err());
        assert!(der_to_raw(&[], 96).is_err());
        assert!(der_to_raw(&good, 63).is_err());
    }

    #[test]
    fn test_rejects_oversized_integer() {
        let der = der_signature(&ECDSA_P384_SHA384_ASN1_SIGNING);
        // P-384 integers do not fit a P-256 sized output
        assert!(der_to_raw(&der, 64).is_err());
    }

    #[test]
    fn test_raw_rejects_odd_length() {
        assert!(raw_to_der(&[1, 2, 3]).is_err());
        assert!(raw_to_der(&[]).is_err());
    }
}
