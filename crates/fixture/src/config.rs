//! Controller configuration.
//!
//! [`ControllerConfig`] is the runtime form of the core
//! [`FixtureConfig`](emustack_core::config::FixtureConfig) section: durations
//! instead of raw numbers, resolved bind mounts, and the cancellation handle.
//!
//! # Example
//! ```ignore
//! use emustack_core::config::EmustackConfig;
//! use emustack_fixture::config::ControllerConfig;
//!
//! let core = EmustackConfig::default();
//! let config = ControllerConfig::from_core(&core.fixture)?;
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use emustack_core::config::{DEFAULT_IMAGE, DEFAULT_READY_MARKER, FixtureConfig};

use crate::docker::validate_container_ref;
use crate::error::FixtureError;
use crate::options::FixtureOption;

/// The emulator's single service port.
pub const SERVICE_PORT: &str = "4566/tcp";

/// Bind-mount prefix the emulator scans for bootstrap scripts.
pub const INIT_SCRIPT_TARGET_PREFIX: &str = "/etc/localstack/init/ready.d/";

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);
const MAX_INIT_TIMEOUT_SECS: u64 = 3600;
const MAX_STOP_GRACE: Duration = Duration::from_secs(300);

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Docker socket path; `None` uses the platform default.
    pub docker_socket: Option<String>,
    /// Emulator image reference.
    pub image: String,
    /// Container name; `None` lets the runtime generate one.
    pub container_name: Option<String>,
    /// Container port exposed on an ephemeral host port.
    pub container_port: String,
    /// Bind mounts: container target path -> host source path.
    pub mounts: BTreeMap<String, PathBuf>,
    /// Readiness marker; empty falls back to [`DEFAULT_READY_MARKER`].
    pub ready_marker: String,
    /// Readiness timeout in seconds, 0 = unbounded.
    pub init_timeout_secs: u64,
    /// Adopt an existing container with the same name.
    pub reuse_existing: bool,
    /// Block `start` until the marker is observed.
    pub wait_for_init: bool,
    /// Log polling interval.
    pub poll_interval: Duration,
    /// Grace period passed to the runtime on stop.
    pub stop_grace: Duration,
    /// External cancellation signal; tears the fixture down when fired.
    pub cancellation: Option<CancellationToken>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            docker_socket: None,
            image: DEFAULT_IMAGE.to_owned(),
            container_name: None,
            container_port: SERVICE_PORT.to_owned(),
            mounts: BTreeMap::new(),
            ready_marker: DEFAULT_READY_MARKER.to_owned(),
            init_timeout_secs: 0,
            reuse_existing: false,
            wait_for_init: true,
            poll_interval: Duration::from_millis(500),
            stop_grace: Duration::from_secs(1),
            cancellation: None,
        }
    }
}

impl ControllerConfig {
    /// Builds a controller config from the core `[fixture]` section.
    ///
    /// A non-empty `init_script_dir` is turned into an init-script mount with
    /// the configured marker.
    pub fn from_core(core: &FixtureConfig) -> Result<Self, FixtureError> {
        let mut config = Self {
            docker_socket: non_empty(&core.docker_socket),
            image: core.image.clone(),
            container_name: non_empty(&core.container_name),
            ready_marker: core.ready_marker.clone(),
            init_timeout_secs: core.init_timeout_secs,
            wait_for_init: core.wait_for_init,
            poll_interval: Duration::from_millis(core.poll_interval_ms),
            stop_grace: Duration::from_secs(core.stop_grace_secs),
            ..Self::default()
        };

        if core.reuse_existing {
            FixtureOption::reuse_existing().apply(&mut config);
        }
        if !core.init_script_dir.is_empty() {
            FixtureOption::init_script_mount(&core.init_script_dir, &core.ready_marker)?
                .apply(&mut config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Marker the prober searches for.
    pub fn ready_marker(&self) -> &str {
        if self.ready_marker.is_empty() {
            DEFAULT_READY_MARKER
        } else {
            &self.ready_marker
        }
    }

    /// Readiness deadline, `None` when unbounded.
    pub fn init_timeout(&self) -> Option<Duration> {
        (self.init_timeout_secs > 0).then(|| Duration::from_secs(self.init_timeout_secs))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FixtureError> {
        if self.image.trim().is_empty() {
            return Err(config_error("image", "must not be empty"));
        }

        validate_container_port(&self.container_port)?;

        if self.poll_interval.is_zero() || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(config_error(
                "poll_interval",
                format!("must be 1ms-{}s", MAX_POLL_INTERVAL.as_secs()),
            ));
        }

        if self.init_timeout_secs > MAX_INIT_TIMEOUT_SECS {
            return Err(config_error(
                "init_timeout_secs",
                format!("must be 0-{MAX_INIT_TIMEOUT_SECS}"),
            ));
        }

        if self.stop_grace > MAX_STOP_GRACE {
            return Err(config_error(
                "stop_grace",
                format!("must be at most {}s", MAX_STOP_GRACE.as_secs()),
            ));
        }

        if self.reuse_existing && self.container_name.is_none() {
            return Err(config_error(
                "container_name",
                "reuse_existing requires a container name",
            ));
        }

        if let Some(name) = &self.container_name {
            validate_container_ref(name).map_err(|e| config_error("container_name", e.to_string()))?;
        }

        for (target, source) in &self.mounts {
            if !target.starts_with('/') {
                return Err(config_error(
                    "mounts",
                    format!("target '{target}' must be an absolute container path"),
                ));
            }
            if !source.is_absolute() {
                return Err(config_error(
                    "mounts",
                    format!("source '{}' must be absolute", source.display()),
                ));
            }
        }

        Ok(())
    }
}

fn validate_container_port(port: &str) -> Result<(), FixtureError> {
    let (number, proto) = port.split_once('/').unwrap_or((port, "tcp"));
    let valid_number = number.parse::<u16>().is_ok_and(|n| n > 0);
    if !valid_number || !matches!(proto, "tcp" | "udp") {
        return Err(config_error(
            "container_port",
            format!("'{port}' is not of the form <port>/<tcp|udp>"),
        ));
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

pub(crate) fn config_error(field: &str, reason: impl Into<String>) -> FixtureError {
    FixtureError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// Builder for [`ControllerConfig`].
#[derive(Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Docker socket path.
    pub fn docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.config.docker_socket = Some(socket.into());
        self
    }

    /// Sets the image reference.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// Sets the container name.
    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.config.container_name = Some(name.into());
        self
    }

    /// Sets the container port to publish.
    pub fn container_port(mut self, port: impl Into<String>) -> Self {
        self.config.container_port = port.into();
        self
    }

    /// Sets the readiness marker.
    pub fn ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.ready_marker = marker.into();
        self
    }

    /// Sets the readiness timeout in seconds.
    pub fn init_timeout_secs(mut self, secs: u64) -> Self {
        self.config.init_timeout_secs = secs;
        self
    }

    /// Enables or disables reuse-by-name.
    pub fn reuse_existing(mut self, reuse: bool) -> Self {
        self.config.reuse_existing = reuse;
        self
    }

    /// Enables or disables waiting for readiness.
    pub fn wait_for_init(mut self, wait: bool) -> Self {
        self.config.wait_for_init = wait;
        self
    }

    /// Sets the log polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Sets the stop grace period.
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.config.stop_grace = grace;
        self
    }

    /// Sets the cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<ControllerConfig, FixtureError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
