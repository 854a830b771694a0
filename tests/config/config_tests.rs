use bchannel::config::{Config, ConfigError, CONFIG_ENV_VAR};
use bchannel::core::channel::socket::BinaryType;
use bchannel::core::channel::TestChannelOptions;
use serial_test::serial;
use std::env;
use std::time::Duration;

use crate::common::create_temp_dir;

#[test]
fn test_defaults_match_library_constants() {
    let config = Config::default();
    let options = config.test_channel_options();

    assert_eq!(options, TestChannelOptions::default());
    assert_eq!(options.blocked_probe.retries, 3);
    assert_eq!(options.blocked_image_path, "/mail/images/cleardot.gif");
    assert!(config.socket.auto_reconnect);
    assert_eq!(config.socket.binary_type, BinaryType::Blob);
    config.check().unwrap();
}

#[test]
fn test_partial_toml_keeps_other_defaults() {
    let config = Config::from_toml(
        r#"
[test_channel]
early_detection_threshold_ms = 250
supports_streaming = false

[socket]
binary_type = "array_buffer"
backoff_ceiling_ms = 10000
"#,
    )
    .unwrap();

    assert_eq!(config.test_channel.early_detection_threshold_ms, 250);
    assert!(!config.test_channel.supports_streaming);
    assert_eq!(config.test_channel.request_timeout_ms, 45_000);
    assert_eq!(config.blocked_probe.pause_ms, 2_000);
    assert_eq!(config.socket.binary_type, BinaryType::ArrayBuffer);

    let socket = config.socket_options();
    assert_eq!((socket.backoff)(0), Duration::from_millis(1_000));
    assert_eq!((socket.backoff)(10), Duration::from_millis(10_000));
    assert!(!config.test_channel_options().capabilities.supports_streaming);
}

#[test]
fn test_toml_round_trip_of_defaults() {
    let text = Config::default().to_toml().unwrap();
    assert!(text.contains("[blocked_probe]"));
    assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
}

#[test]
fn test_invalid_toml_is_parse_error() {
    assert!(matches!(
        Config::from_toml("[socket]\nauto_reconnect = \"maybe\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_check_rejects_bad_values() {
    let mut config = Config::default();
    config.blocked_probe.image_path = "cleardot.gif".to_string();
    assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.socket.backoff_base_ms = 90_000;
    assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.test_channel.early_detection_threshold_ms = 60_000;
    assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.blocked_probe.timeout_ms = 0;
    assert!(config.check().is_err());
}

#[test]
#[serial]
fn test_init_and_load_use_env_path() {
    let dir = create_temp_dir();
    let path = dir.path().join("nested").join("config.toml");
    env::set_var(CONFIG_ENV_VAR, &path);

    // Missing file loads defaults
    assert_eq!(Config::load().unwrap(), Config::default());

    let (written_path, written) = Config::init().unwrap();
    assert!(written);
    assert_eq!(written_path, path);
    assert!(path.exists());

    std::fs::write(&path, "[blocked_probe]\nretries = 1\n").unwrap();
    let (_, written_again) = Config::init().unwrap();
    assert!(!written_again);
    assert_eq!(Config::load().unwrap().blocked_probe.retries, 1);

    env::remove_var(CONFIG_ENV_VAR);
}
