//! Configuration: `emustack.toml` parsing and environment overrides.
//!
//! [`EmustackConfig`] is the top-level structure; each crate reads only its
//! own section.
//!
//! # Precedence
//! 1. CLI flags (applied by the binary as fixture options)
//! 2. Environment variables (`EMUSTACK_FIXTURE_INIT_TIMEOUT_SECS=60`)
//! 3. Config file (`emustack.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), emustack_core::error::EmustackError> {
//! use emustack_core::config::EmustackConfig;
//!
//! // file + env overrides
//! let config = EmustackConfig::load("emustack.toml").await?;
//!
//! // straight from a TOML string
//! let config = EmustackConfig::parse("[fixture]\nreuse_existing = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, EmustackError};

/// Default emulator image.
pub const DEFAULT_IMAGE: &str = "localstack/localstack:1.4";

/// Log line the emulator prints once all services accept requests.
pub const DEFAULT_READY_MARKER: &str = "Ready.";

/// Container name used when reuse-by-name is enabled without an explicit name.
pub const DEFAULT_CONTAINER_NAME: &str = "localstack";

/// Top-level emustack configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmustackConfig {
    /// Logging settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Fixture container settings.
    #[serde(default)]
    pub fixture: FixtureConfig,
}

impl EmustackConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EmustackError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise starts from defaults; env
    /// overrides and validation apply either way.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, EmustackError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(EmustackError::Config(ConfigError::FileNotFound { .. })) => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EmustackError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EmustackError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EmustackError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EmustackError> {
        toml::from_str(toml_str).map_err(|e| {
            EmustackError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies `EMUSTACK_{SECTION}_{FIELD}` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        // general
        override_string(&mut self.general.log_level, "EMUSTACK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "EMUSTACK_GENERAL_LOG_FORMAT");

        // fixture
        override_string(
            &mut self.fixture.docker_socket,
            "EMUSTACK_FIXTURE_DOCKER_SOCKET",
        );
        override_string(&mut self.fixture.image, "EMUSTACK_FIXTURE_IMAGE");
        override_string(
            &mut self.fixture.container_name,
            "EMUSTACK_FIXTURE_CONTAINER_NAME",
        );
        override_string(
            &mut self.fixture.ready_marker,
            "EMUSTACK_FIXTURE_READY_MARKER",
        );
        override_string(
            &mut self.fixture.init_script_dir,
            "EMUSTACK_FIXTURE_INIT_SCRIPT_DIR",
        );
        override_u64(
            &mut self.fixture.init_timeout_secs,
            "EMUSTACK_FIXTURE_INIT_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.fixture.reuse_existing,
            "EMUSTACK_FIXTURE_REUSE_EXISTING",
        );
        override_bool(
            &mut self.fixture.wait_for_init,
            "EMUSTACK_FIXTURE_WAIT_FOR_INIT",
        );
        override_u64(
            &mut self.fixture.poll_interval_ms,
            "EMUSTACK_FIXTURE_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.fixture.stop_grace_secs,
            "EMUSTACK_FIXTURE_STOP_GRACE_SECS",
        );
    }

    /// Validates field values.
    pub fn validate(&self) -> Result<(), EmustackError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.fixture.image.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fixture.image".to_owned(),
                reason: "image must not be empty".to_owned(),
            }
            .into());
        }

        if self.fixture.ready_marker.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fixture.ready_marker".to_owned(),
                reason: "ready marker must not be empty".to_owned(),
            }
            .into());
        }

        if self.fixture.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fixture.poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Fixture container settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Docker socket path; empty means the platform default.
    pub docker_socket: String,
    /// Emulator image reference.
    pub image: String,
    /// Container name; empty lets the runtime pick one.
    pub container_name: String,
    /// Log substring that marks the emulator as ready.
    pub ready_marker: String,
    /// Directory of init scripts to mount; empty means none.
    pub init_script_dir: String,
    /// Readiness timeout in seconds (0 = wait forever).
    pub init_timeout_secs: u64,
    /// Adopt an existing container of the same name instead of failing.
    pub reuse_existing: bool,
    /// Block `start` until the ready marker appears.
    pub wait_for_init: bool,
    /// Interval between log polls (milliseconds).
    pub poll_interval_ms: u64,
    /// Grace period before the runtime kills the container on stop (seconds).
    pub stop_grace_secs: u64,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            docker_socket: String::new(),
            image: DEFAULT_IMAGE.to_owned(),
            container_name: String::new(),
            ready_marker: DEFAULT_READY_MARKER.to_owned(),
            init_script_dir: String::new(),
            init_timeout_secs: 0,
            reuse_existing: false,
            wait_for_init: true,
            poll_interval_ms: 500,
            stop_grace_secs: 1,
        }
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
