// ABOUTME: Tests for configuration loading and environment overrides
// ABOUTME: Verifies TOML parsing, MIRAI_* env var precedence and conversion to a session config

use mirai::config::{Config, CONFIG_PATH_ENV};
use serial_test::serial;
use std::io::Write;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    for var in [
        CONFIG_PATH_ENV,
        "MIRAI_URL",
        "MIRAI_HOST",
        "MIRAI_PORT",
        "MIRAI_AUTH_KEY",
        "MIRAI_QQ",
    ] {
        std::env::remove_var(var);
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_config_loads_from_env_path() {
    clear_config_env_vars();
    let file = write_config(
        r#"
[connection]
url = "mirai://bot.local:8080/?authKey=secret&qq=10001"

[polling]
interval_ms = 250

[bot]
log_events = ["GroupMessage"]
echo = true
"#,
    );
    std::env::set_var(CONFIG_PATH_ENV, file.path());

    let config = Config::load().unwrap();

    assert_eq!(
        config.connection.url.as_deref(),
        Some("mirai://bot.local:8080/?authKey=secret&qq=10001")
    );
    assert_eq!(config.polling.interval_ms, 250);
    assert_eq!(config.polling.count, 10);
    assert_eq!(config.bot.log_events, vec!["GroupMessage".to_string()]);
    assert!(config.bot.echo);

    let session = config.session_config().unwrap();
    assert_eq!(session.base_url, "http://bot.local:8080");
    assert_eq!(session.account_id, 10001);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_vars_override_file() {
    clear_config_env_vars();
    let file = write_config(
        r#"
[connection]
host = "original.local"
port = 8080
auth_key = "original"
qq = 1
"#,
    );
    std::env::set_var("MIRAI_HOST", "override.local");
    std::env::set_var("MIRAI_PORT", "9090");
    std::env::set_var("MIRAI_AUTH_KEY", "override");

    let config = Config::load_from(Some(file.path())).unwrap();
    let session = config.session_config().unwrap();

    assert_eq!(session.base_url, "http://override.local:9090");
    assert_eq!(session.auth_key, "override");
    assert_eq!(session.account_id, 1);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_only_configuration() {
    clear_config_env_vars();
    std::env::set_var("MIRAI_URL", "mirai://localhost:8080/?authKey=k&qq=7");

    let config = Config::load_from(None).unwrap();
    let session = config.session_config().unwrap();

    assert_eq!(session.account_id, 7);
    assert!(session.cache.groups && session.cache.friends);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_port_env_var_fails() {
    clear_config_env_vars();
    std::env::set_var("MIRAI_PORT", "not-a-port");

    let err = Config::load_from(None).unwrap_err();
    assert!(err.to_string().contains("MIRAI_PORT"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_qq_env_var_fails() {
    clear_config_env_vars();
    std::env::set_var("MIRAI_QQ", "abc");

    let err = Config::load_from(None).unwrap_err();
    assert!(err.to_string().contains("MIRAI_QQ"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_unparseable_file_fails() {
    clear_config_env_vars();
    let file = write_config("[connection\nurl = ");

    let err = Config::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = Config::load_from(Some(missing.as_path())).unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
}

#[test]
#[serial]
fn test_incomplete_connection_is_rejected() {
    clear_config_env_vars();
    let file = write_config(
        r#"
[connection]
host = "localhost"
port = 8080
"#,
    );

    let config = Config::load_from(Some(file.path())).unwrap();
    assert!(config.session_config().is_err());
}
