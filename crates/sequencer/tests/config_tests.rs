//! Integration tests for configuration file loading
//!
//! Run with: `cargo test -p sequencer --test config_tests`

use common::DeviceIds;
use sequencer::ParseMode;
use sequencer::config::{Overrides, SeqConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
[transfer]
endpoint = 2
timeout_ms = 500

[logging]
level = "info"

[commands]
strict = true
"#,
    );

    let config = SeqConfig::load(file.path()).unwrap();
    let settings = config.session_settings(DeviceIds::new(0x1234, 1), &Overrides::default());

    assert_eq!(settings.transfer.endpoint, 2);
    assert_eq!(settings.transfer.in_address(), 0x82);
    assert_eq!(settings.transfer.timeout, Duration::from_millis(500));
    assert_eq!(settings.parse_mode, ParseMode::Strict);
}

#[test]
fn test_load_partial_config() {
    let file = write_config("[logging]\nlevel = \"warn\"\n");

    let config = SeqConfig::load(file.path()).unwrap();

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.transfer.endpoint, 1);
    assert_eq!(config.transfer.timeout_ms, 100);
}

#[test]
fn test_load_invalid_config() {
    let file = write_config("[transfer]\nendpoint = \"one\"\n");
    assert!(SeqConfig::load(file.path()).is_err());
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = SeqConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
}
