//! Readiness prober.
//!
//! Polls a non-following snapshot of the container's logs until a marker
//! line appears or the configured timeout elapses.
//!
//! ```text
//! Polling --marker found--> Ready
//!    │
//!    └──elapsed >= timeout--> TimedOut
//! ```
//!
//! Timing uses `tokio::time`, so tests drive it on a paused clock.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ControllerConfig;
use crate::docker::DockerClient;
use crate::error::FixtureError;

/// Waits for a readiness marker in container logs.
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    marker: String,
    interval: Duration,
    timeout: Option<Duration>,
}

impl ReadinessProber {
    /// Creates a prober. `timeout = None` polls until the marker appears or
    /// the container goes away.
    pub fn new(marker: impl Into<String>, interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            marker: marker.into(),
            interval,
            timeout,
        }
    }

    /// Creates a prober from the controller's marker, interval and timeout.
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.ready_marker(),
            config.poll_interval,
            config.init_timeout(),
        )
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Polls until the marker shows up and returns how long that took.
    ///
    /// Log fetch failures are treated as "not ready yet". Each fetch is
    /// bounded by the deadline and the last sleep is clamped to it, so a
    /// timeout fires at the deadline even while a fetch hangs. A poll issued
    /// exactly at the deadline still counts.
    ///
    /// # Errors
    ///
    /// - `FixtureError::ReadinessTimeout`: deadline passed without the marker
    /// - `FixtureError::ContainerExited`: the container no longer exists
    pub async fn wait_ready<D: DockerClient>(
        &self,
        docker: &D,
        container_id: &str,
    ) -> Result<Duration, FixtureError> {
        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);
        let mut polls: u64 = 0;

        loop {
            polls += 1;
            let fetch = docker.container_logs(container_id);
            let logs = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, fetch).await {
                    Ok(logs) => logs,
                    Err(_) => {
                        debug!(
                            container_id = %container_id,
                            polls,
                            "log fetch outlived the deadline"
                        );
                        return Err(self.timed_out());
                    }
                },
                None => fetch.await,
            };

            match logs {
                Ok(logs) if logs.contains(&self.marker) => {
                    let elapsed = started.elapsed();
                    debug!(
                        container_id = %container_id,
                        polls,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "readiness marker found"
                    );
                    return Ok(elapsed);
                }
                Ok(_) => {
                    trace!(container_id = %container_id, polls, "readiness marker not found yet");
                }
                Err(FixtureError::ContainerNotFound(_)) => {
                    return Err(FixtureError::ContainerExited {
                        container_id: container_id.to_owned(),
                    });
                }
                Err(e) => {
                    debug!(container_id = %container_id, error = %e, "log fetch failed, retrying");
                }
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.timed_out());
                    }
                    self.interval.min(deadline - now)
                }
                None => self.interval,
            };
            tokio::time::sleep(pause).await;
        }
    }

    fn timed_out(&self) -> FixtureError {
        FixtureError::ReadinessTimeout {
            timeout: self.timeout.unwrap_or_default(),
            marker: self.marker.clone(),
        }
    }
}
