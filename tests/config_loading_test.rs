//! Integration tests for configuration loading and logging initialization.

use pixium_status::config::StatusConfig;
use pixium_status::logging::{self, LoggingConfig, OutputFormat};
use pixium_status::StatusError;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::Level;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_full_file() {
    let file = write_config(
        r#"
        [application]
        name = "I12 Pixium"
        log_level = "debug"
        log_format = "json"

        [detector]
        name = "pixium10"
        ad_base_prefix = "BL12I-EA-DET-10:CAM:"
        file_saver_prefix = "BL12I-EA-DET-10:HDF5:"
        mjpeg_prefix = "BL12I-EA-DET-10:MJPG:"

        [refresh]
        timeout_ms = 2500
        "#,
    );

    let config = StatusConfig::load_from(file.path()).unwrap();
    assert_eq!(config.application.name, "I12 Pixium");
    assert_eq!(config.application.log_format, "json");
    assert_eq!(config.detector.ad_base_prefix, "BL12I-EA-DET-10:CAM:");
    assert_eq!(config.refresh.timeout_ms, 2500);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_partial_file_falls_back_to_defaults() {
    let file = write_config(
        r#"
        [detector]
        name = "bench"
        ad_base_prefix = "BENCH:CAM:"
        file_saver_prefix = "BENCH:HDF:"
        mjpeg_prefix = "BENCH:MJPG:"
        "#,
    );

    let config = StatusConfig::load_from(file.path()).unwrap();
    assert_eq!(config.detector.name, "bench");
    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.refresh.timeout_ms, 5000);
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let config = StatusConfig::load_from("does/not/exist.toml").unwrap();
    assert_eq!(config, StatusConfig::default());
}

#[test]
#[serial]
fn test_malformed_value_is_config_error() {
    let file = write_config(
        r#"
        [refresh]
        timeout_ms = "soon"
        "#,
    );

    let err = StatusConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, StatusError::Config(_)));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"
        [application]
        name = "Pixium Status"
        log_level = "info"
        "#,
    );

    std::env::set_var("PIXIUM_APPLICATION__LOG_LEVEL", "warn");
    std::env::set_var("PIXIUM_REFRESH__TIMEOUT_MS", "750");
    let result = StatusConfig::load_from(file.path());
    std::env::remove_var("PIXIUM_APPLICATION__LOG_LEVEL");
    std::env::remove_var("PIXIUM_REFRESH__TIMEOUT_MS");

    let config = result.unwrap();
    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.refresh.timeout_ms, 750);
    assert_eq!(config.refresh_timeout().as_millis(), 750);
}

#[test]
#[serial]
fn test_invalid_file_fails_validation() {
    let file = write_config(
        r#"
        [application]
        name = "Pixium Status"
        log_level = "chatty"
        "#,
    );

    let config = StatusConfig::load_from(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(StatusError::Configuration(_))
    ));
}

#[test]
fn test_logging_init_is_idempotent() {
    let config = LoggingConfig::new(Level::ERROR).with_format(OutputFormat::Compact);
    assert!(logging::init(config.clone()).is_ok());
    assert!(logging::init(config).is_ok());
    assert!(logging::init_from_config(&StatusConfig::default()).is_ok());
}
