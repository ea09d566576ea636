//! Handshake and envelope behaviour across the crypto and gateway crates.

use serde_json::json;
use std::sync::Arc;
use wiregate_crypto::{handshake, KeyStore, SessionCryptoState, TextEncoding, MIN_RSA_KEY_BITS};
use wiregate_gateway::envelope::read_frame;
use wiregate_gateway::{EnvelopeCodec, HttpSessionStore};

fn codec() -> EnvelopeCodec {
    EnvelopeCodec::new(Arc::new(KeyStore::initialize(MIN_RSA_KEY_BITS).unwrap()))
}

fn body(state: &SessionCryptoState, k: Option<&str>, text: &str) -> String {
    let d = state.encrypt_text(state.iv(), text).unwrap();
    match k {
        Some(k) => json!({"d": d, "k": k}).to_string(),
        None => json!({"d": d}).to_string(),
    }
}

#[test]
fn test_session_key_survives_until_invalidated() {
    let codec = codec();
    let sessions = HttpSessionStore::new();
    let session = sessions.create();

    let client = SessionCryptoState::generate();
    let k = handshake::seal_secret(&codec.keys().encryption_public_key(), &client, TextEncoding::Hex)
        .unwrap();

    let first = r#"{"namespace":"app","action":"Demo","method":"hello","tid":1,"data":["a"]}"#;
    let calls = codec
        .decode_http(&body(&client, Some(&k), first), session.crypto())
        .unwrap();
    assert!(calls.calls[0].encrypted);
    let established = session.crypto().get().unwrap();

    // A second k from a different client state does not replace the key
    let intruder = SessionCryptoState::generate();
    let k2 = handshake::seal_secret(&codec.keys().encryption_public_key(), &intruder, TextEncoding::Hex)
        .unwrap();
    let second = r#"[{"namespace":"app","action":"Demo","method":"hello","tid":2,"data":["b"]}]"#;
    let calls = codec
        .decode_http(&body(&client, Some(&k2), second), session.crypto())
        .unwrap();
    assert!(calls.batch);
    assert!(Arc::ptr_eq(&established, &session.crypto().get().unwrap()));

    // Replies are sealed under the established key
    let sealed = codec.encode(&json!({"ok": true}), session.crypto()).unwrap();
    assert_eq!(read_frame(&sealed, Some(&client)).unwrap()["ok"], true);

    sessions.invalidate(session.id());
    assert!(!session.crypto().is_established());
}

#[test]
fn test_rotation_keeps_established_sessions() {
    let codec = codec();
    let sessions = HttpSessionStore::new();
    let old_session = sessions.create();

    let client = SessionCryptoState::generate();
    let old_key = codec.keys().encryption_public_key();
    let k = handshake::seal_secret(&old_key, &client, TextEncoding::Hex).unwrap();
    let call = r#"{"namespace":"app","action":"Demo","method":"hello","tid":3,"data":[]}"#;
    codec
        .decode_http(&body(&client, Some(&k), call), old_session.crypto())
        .unwrap();
    assert!(old_session.crypto().is_established());

    codec.keys().rotate().unwrap();
    assert_ne!(codec.keys().encryption_public_key(), old_key);

    // The established session keeps working without k
    codec
        .decode_http(&body(&client, None, call), old_session.crypto())
        .unwrap();

    // A handshake wrapped with the retired key fails on a fresh session
    let fresh = sessions.create();
    assert!(codec
        .decode_http(&body(&client, Some(&k), call), fresh.crypto())
        .is_err());
    assert!(!fresh.crypto().is_established());
}
