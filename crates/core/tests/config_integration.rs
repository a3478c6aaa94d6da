//! emustack.toml integration tests
//!
//! - the shipped example parses and validates
//! - file loading with and without a file present
//! - environment override precedence

use std::io::Write;

use emustack_core::config::{DEFAULT_IMAGE, DEFAULT_READY_MARKER, EmustackConfig};
use emustack_core::error::{ConfigError, EmustackError};
use serial_test::serial;

// =============================================================================
// emustack.toml.example
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../emustack.toml.example");
    let config = EmustackConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.fixture.image, DEFAULT_IMAGE);
    assert_eq!(config.fixture.ready_marker, DEFAULT_READY_MARKER);
    assert_eq!(config.fixture.init_timeout_secs, 120);
    assert!(config.fixture.wait_for_init);
    assert!(!config.fixture.reuse_existing);
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../emustack.toml.example");
    let config = EmustackConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

// =============================================================================
// file loading
// =============================================================================

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[tokio::test]
#[serial]
async fn load_reads_file_values() {
    let file = write_config(
        r#"
[fixture]
container_name = "shared-stack"
reuse_existing = true
"#,
    );

    let config = EmustackConfig::load(file.path()).await.expect("load");
    assert_eq!(config.fixture.container_name, "shared-stack");
    assert!(config.fixture.reuse_existing);
}

#[tokio::test]
#[serial]
async fn load_rejects_invalid_values_in_file() {
    let file = write_config(
        r#"
[general]
log_format = "yaml"
"#,
    );

    let err = EmustackConfig::load(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        EmustackError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
#[serial]
async fn load_missing_file_is_an_error() {
    let err = EmustackConfig::load("/nonexistent/emustack.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EmustackError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
#[serial]
async fn load_or_default_falls_back_to_defaults() {
    let config = EmustackConfig::load_or_default("/nonexistent/emustack.toml")
        .await
        .expect("defaults");
    assert_eq!(config.fixture.image, DEFAULT_IMAGE);
}

#[tokio::test]
#[serial]
async fn load_or_default_still_reports_parse_errors() {
    let file = write_config("[fixture\nimage = ");
    let err = EmustackConfig::load_or_default(file.path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EmustackError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// environment overrides
// =============================================================================

#[test]
#[serial]
fn env_overrides_take_precedence_over_file_values() {
    let mut config = EmustackConfig::parse(
        r#"
[fixture]
init_timeout_secs = 10
image = "localstack/localstack:1.3"
"#,
    )
    .unwrap();

    // SAFETY: serialised with every other test that touches the environment.
    unsafe {
        std::env::set_var("EMUSTACK_FIXTURE_INIT_TIMEOUT_SECS", "90");
        std::env::set_var("EMUSTACK_FIXTURE_REUSE_EXISTING", "true");
    }
    config.apply_env_overrides();
    unsafe {
        std::env::remove_var("EMUSTACK_FIXTURE_INIT_TIMEOUT_SECS");
        std::env::remove_var("EMUSTACK_FIXTURE_REUSE_EXISTING");
    }

    assert_eq!(config.fixture.init_timeout_secs, 90);
    assert!(config.fixture.reuse_existing);
    assert_eq!(config.fixture.image, "localstack/localstack:1.3");
}

#[test]
#[serial]
fn unparsable_env_override_is_ignored() {
    let mut config = EmustackConfig::default();

    // SAFETY: serialised with every other test that touches the environment.
    unsafe {
        std::env::set_var("EMUSTACK_FIXTURE_WAIT_FOR_INIT", "sometimes");
        std::env::set_var("EMUSTACK_FIXTURE_POLL_INTERVAL_MS", "fast");
    }
    config.apply_env_overrides();
    unsafe {
        std::env::remove_var("EMUSTACK_FIXTURE_WAIT_FOR_INIT");
        std::env::remove_var("EMUSTACK_FIXTURE_POLL_INTERVAL_MS");
    }

    assert!(config.fixture.wait_for_init);
    assert_eq!(config.fixture.poll_interval_ms, 500);
}

#[test]
#[serial]
fn string_env_override_replaces_marker() {
    let mut config = EmustackConfig::default();

    // SAFETY: serialised with every other test that touches the environment.
    unsafe {
        std::env::set_var("EMUSTACK_FIXTURE_READY_MARKER", "bootstrap finished");
    }
    config.apply_env_overrides();
    unsafe {
        std::env::remove_var("EMUSTACK_FIXTURE_READY_MARKER");
    }

    assert_eq!(config.fixture.ready_marker, "bootstrap finished");
}
