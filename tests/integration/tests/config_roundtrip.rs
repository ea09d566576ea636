//! Config save/load roundtrip integration tests.

use std::path::Path;
use tempfile::TempDir;
use wiregate_core::config::{BindMode, Config, LogFormat};

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wiregate.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, config.gateway.port);
    assert_eq!(loaded.gateway.bind, config.gateway.bind);
    assert_eq!(loaded.session.cookie_name, config.session.cookie_name);
    assert_eq!(loaded.security.rsa_key_bits, config.security.rsa_key_bits);
    loaded.validate().unwrap();
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("wiregate.json5");

    let mut config = Config::default();
    config.gateway.port = 9090;
    config.gateway.bind = BindMode::Lan;
    config.security.encryption_required = true;
    config.logging.format = LogFormat::Json;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, 9090);
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert!(loaded.security.encryption_required);
    assert_eq!(loaded.logging.format, LogFormat::Json);
}

#[test]
fn test_hand_written_json5() {
    let config = Config::parse(
        r#"{
            // comments and unquoted keys are fine
            gateway: { port: 8080, ws_path: '/ws', },
            session: { idle_timeout_secs: 60 },
        }"#,
    )
    .unwrap();
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.gateway.ws_path, "/ws");
    assert_eq!(config.gateway.api_path, "/api");
    assert_eq!(config.session.idle_timeout_secs, 60);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/wiregate.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    assert!(Config::parse("not valid json").is_err());
}

#[test]
fn test_invalid_values_are_all_reported() {
    let config = Config::parse("{ gateway: { port: 0, api_path: 'api' }, security: { rsa_key_bits: 512 } }")
        .unwrap();
    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("port"));
    assert!(message.contains("api_path"));
    assert!(message.contains("1024"));
}
