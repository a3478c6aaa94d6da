//! Configuration options applied by [`FixtureController::start`].
//!
//! Each option is a pure mutation of [`ControllerConfig`]; nothing here talks
//! to the container runtime. Options are applied in the order given, so a
//! later option wins over an earlier one touching the same field.
//!
//! [`FixtureController::start`]: crate::controller::FixtureController::start

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use emustack_core::config::DEFAULT_CONTAINER_NAME;

use crate::config::{ControllerConfig, INIT_SCRIPT_TARGET_PREFIX, config_error};
use crate::error::FixtureError;

/// A single configuration mutation.
#[derive(Debug, Clone)]
pub enum FixtureOption {
    /// Mount an init-script directory and wait for `marker` instead of the
    /// default readiness line.
    InitScriptMount {
        /// Container-side mount target.
        target: String,
        /// Absolute host directory.
        source: PathBuf,
        /// Log line the init scripts print when done.
        marker: String,
    },
    /// Replace the cancellation handle.
    Cancellation(CancellationToken),
    /// Readiness timeout in seconds (0 = unbounded).
    InitTimeout(u64),
    /// Adopt an existing container of the same name.
    ReuseExisting,
    /// Do not wait for the readiness marker.
    NoInitWait,
}

impl FixtureOption {
    /// Mounts `dir` under the emulator's init-script directory and sets the
    /// readiness marker to `marker`.
    ///
    /// # Errors
    ///
    /// `FixtureError::Config` when `marker` is empty or `dir` cannot be
    /// resolved to an absolute path with a base name.
    pub fn init_script_mount(
        dir: impl AsRef<Path>,
        marker: impl Into<String>,
    ) -> Result<Self, FixtureError> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(config_error(
                "init_script_mount",
                "init script mount requires a log line to wait for",
            ));
        }

        let dir = dir.as_ref();
        let source = std::path::absolute(dir).map_err(|e| {
            config_error(
                "init_script_mount",
                format!("cannot resolve '{}': {e}", dir.display()),
            )
        })?;
        let base = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                config_error(
                    "init_script_mount",
                    format!("'{}' has no usable directory name", dir.display()),
                )
            })?;

        Ok(Self::InitScriptMount {
            target: format!("{INIT_SCRIPT_TARGET_PREFIX}{base}"),
            source,
            marker,
        })
    }

    /// Tears the fixture down when `token` is cancelled.
    pub fn cancellation(token: CancellationToken) -> Self {
        Self::Cancellation(token)
    }

    /// Fails `start` if readiness takes longer than `secs` (0 = unbounded).
    pub fn init_timeout(secs: u64) -> Self {
        Self::InitTimeout(secs)
    }

    /// Joins an already running container of the same name.
    pub fn reuse_existing() -> Self {
        Self::ReuseExisting
    }

    /// Returns from `start` as soon as the container is started.
    pub fn no_init_wait() -> Self {
        Self::NoInitWait
    }

    /// Applies the mutation.
    pub fn apply(self, config: &mut ControllerConfig) {
        match self {
            Self::InitScriptMount {
                target,
                source,
                marker,
            } => {
                config.mounts.insert(target, source);
                config.ready_marker = marker;
            }
            Self::Cancellation(token) => config.cancellation = Some(token),
            Self::InitTimeout(secs) => config.init_timeout_secs = secs,
            Self::ReuseExisting => {
                config.reuse_existing = true;
                if config.container_name.is_none() {
                    config.container_name = Some(DEFAULT_CONTAINER_NAME.to_owned());
                }
            }
            Self::NoInitWait => config.wait_for_init = false,
        }
    }
}
