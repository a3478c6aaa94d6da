//! Fixture lifecycle controller.
//!
//! [`FixtureController`] owns one emulator container: it creates and starts
//! it, waits for readiness, publishes the resolved endpoint and tears it down
//! again.
//!
//! # Concurrency
//!
//! Two locks guard the state:
//!
//! - an exclusive `tokio::sync::Mutex<Lifecycle>` held for the whole of
//!   `start` and `stop`, so transitions never interleave;
//! - a shared `std::sync::RwLock<Option<HostEndpoint>>` holding the committed
//!   endpoint, written only while the exclusive lock is held.
//!
//! [`FixtureController::endpoint_url`] reads only the second lock, so it
//! never waits for an in-flight start and reports `""` until the start has
//! committed.
//!
//! # State
//!
//! ```text
//! Idle --start--> Starting --ready--> Running --stop--> Idle
//!                    │
//!                    └--readiness/port failure--> Idle (container identity kept for stop)
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use emustack_core::metrics as m;
use emustack_core::types::ContainerSummary;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::docker::{BollardDockerClient, ContainerSpec, DockerClient};
use crate::error::FixtureError;
use crate::health::HealthProbe;
use crate::options::FixtureOption;
use crate::ports::{HostEndpoint, resolve_endpoint};
use crate::probe::ReadinessProber;
use crate::watcher::CancellationWatcher;

/// Mutable lifecycle state, only touched under the operation lock.
struct Lifecycle {
    config: ControllerConfig,
    container_id: Option<String>,
    /// Created, but `start_container` has not been confirmed. Such a
    /// container is never auto-removed, so stop has to remove it.
    awaiting_start: bool,
    started: bool,
    watcher: Option<CancellationWatcher>,
}

pub(crate) struct Inner<D: DockerClient> {
    docker: Arc<D>,
    lifecycle: Mutex<Lifecycle>,
    endpoint: RwLock<Option<HostEndpoint>>,
}

/// Lifecycle controller for a single emulator container.
///
/// Cheap to clone; clones share the same container. Independent fixtures
/// need independent controllers.
pub struct FixtureController<D: DockerClient> {
    inner: Arc<Inner<D>>,
}

impl<D: DockerClient> Clone for FixtureController<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl FixtureController<BollardDockerClient> {
    /// Connects to the Docker daemon named by `config.docker_socket` (or the
    /// local default) and builds a controller around it.
    ///
    /// # Errors
    ///
    /// - `FixtureError::Config` if `config` is invalid
    /// - `FixtureError::DockerConnection` if no client can be created
    pub fn connect(config: ControllerConfig) -> Result<Self, FixtureError> {
        config.validate()?;
        let docker = BollardDockerClient::connect(config.docker_socket.as_deref())?;
        Ok(Self::new(Arc::new(docker), config))
    }
}

impl<D: DockerClient> FixtureController<D> {
    /// Creates an idle controller. The configuration is validated on
    /// `start`, after options are applied.
    pub fn new(docker: Arc<D>, config: ControllerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                docker,
                lifecycle: Mutex::new(Lifecycle {
                    config,
                    container_id: None,
                    awaiting_start: false,
                    started: false,
                    watcher: None,
                }),
                endpoint: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner<D>>) -> Self {
        Self { inner }
    }

    /// Starts the fixture and returns once it is ready.
    ///
    /// If the fixture is already running, `force_restart = false` joins it
    /// and returns `Ok(())` without touching the runtime; `true` stops it and
    /// starts a fresh container. `options` are applied in order to the
    /// stored configuration and persist for later starts.
    ///
    /// # Errors
    ///
    /// Any [`FixtureError`] from validation, the runtime, readiness probing
    /// or endpoint resolution. When readiness or endpoint resolution fails
    /// the container identity is kept, so [`stop`](Self::stop) can reclaim
    /// it.
    pub async fn start(
        &self,
        force_restart: bool,
        options: Vec<FixtureOption>,
    ) -> Result<(), FixtureError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;

        if lifecycle.started {
            if !force_restart {
                debug!(
                    container_id = lifecycle.container_id.as_deref().unwrap_or_default(),
                    "fixture already running, joining"
                );
                return Ok(());
            }
            info!("force restart requested, stopping running fixture");
            self.stop_locked(&mut lifecycle).await?;
        } else if lifecycle.container_id.is_some() {
            info!("reclaiming container left by a failed start");
            self.stop_locked(&mut lifecycle).await?;
        }

        let result = self.start_locked(&mut lifecycle, options).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(m::FIXTURE_STARTS_TOTAL, m::LABEL_RESULT => outcome).increment(1);
        if let Err(e) = &result {
            warn!(error = %e, "fixture start failed");
        }
        result
    }

    async fn start_locked(
        &self,
        lifecycle: &mut Lifecycle,
        options: Vec<FixtureOption>,
    ) -> Result<(), FixtureError> {
        let mut config = lifecycle.config.clone();
        for option in options {
            option.apply(&mut config);
        }
        if config
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            warn!("cancellation token already fired, starting without a watcher");
            config.cancellation = None;
        }
        config.validate()?;
        lifecycle.config = config.clone();

        let docker = self.inner.docker.as_ref();
        docker.ping().await?;
        self.ensure_image(&config.image).await?;

        let spec = ContainerSpec::from_config(&config);
        let (container_id, already_running) = match docker.create_container(&spec).await {
            Ok(id) => {
                info!(container_id = %id, image = %config.image, "container created");
                (id, false)
            }
            Err(FixtureError::NameConflict { name }) if config.reuse_existing => {
                let existing = docker.inspect_container(&name).await?;
                info!(
                    container_id = %existing.id,
                    name = %name,
                    running = existing.running,
                    "reusing existing container"
                );
                (existing.id, existing.running)
            }
            Err(e) => return Err(e),
        };

        // recorded before starting, so a dropped start still leaves it owned
        lifecycle.container_id = Some(container_id.clone());
        lifecycle.awaiting_start = !already_running;

        if !already_running {
            if let Err(e) = docker.start_container(&container_id).await {
                match docker.remove_container(&container_id).await {
                    Ok(()) | Err(FixtureError::ContainerNotFound(_)) => {
                        lifecycle.container_id = None;
                        lifecycle.awaiting_start = false;
                    }
                    Err(remove_err) => warn!(
                        container_id = %container_id,
                        error = %remove_err,
                        "failed to remove container after start failure, kept for stop"
                    ),
                }
                return Err(e);
            }
            lifecycle.awaiting_start = false;
        }

        if config.wait_for_init {
            let prober = ReadinessProber::from_config(&config);
            info!(
                container_id = %container_id,
                marker = prober.marker(),
                timeout_secs = config.init_timeout_secs,
                "waiting for fixture readiness"
            );
            let elapsed = prober.wait_ready(docker, &container_id).await?;
            metrics::histogram!(m::FIXTURE_READINESS_DURATION_SECONDS)
                .record(elapsed.as_secs_f64());
        }

        let details = docker.inspect_container(&container_id).await?;
        let endpoint = resolve_endpoint(&details, &config.container_port)?;

        lifecycle.started = true;
        self.publish(Some(endpoint.clone()));
        metrics::gauge!(m::FIXTURE_RUNNING).set(1.0);

        if let Some(signal) = config.cancellation.clone() {
            lifecycle.watcher = Some(CancellationWatcher::spawn(
                Arc::downgrade(&self.inner),
                signal,
                container_id.clone(),
            ));
        }

        info!(container_id = %container_id, endpoint = %endpoint.url(), "fixture ready");
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), FixtureError> {
        let docker = self.inner.docker.as_ref();
        if docker.image_exists(image).await? {
            debug!(image = %image, "image present locally");
            return Ok(());
        }
        info!(image = %image, "pulling image");
        docker.pull_image(image).await?;
        metrics::counter!(m::FIXTURE_IMAGE_PULLS_TOTAL).increment(1);
        info!(image = %image, "image pulled");
        Ok(())
    }

    /// Stops the fixture container.
    ///
    /// A no-op when no container is held. A container the runtime no longer
    /// knows counts as stopped. On any other failure the identity is kept
    /// and the error returned.
    pub async fn stop(&self) -> Result<(), FixtureError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await
    }

    /// Stop issued by a watcher; skipped if its run was disarmed while the
    /// watcher waited for the lock.
    pub(crate) async fn stop_watched_run(
        &self,
        run: &CancellationToken,
    ) -> Result<(), FixtureError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if run.is_cancelled() {
            return Ok(());
        }
        self.stop_locked(&mut lifecycle).await
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) -> Result<(), FixtureError> {
        let Some(container_id) = lifecycle.container_id.clone() else {
            debug!("no fixture container to stop");
            return Ok(());
        };

        let docker = self.inner.docker.as_ref();
        let outcome = if lifecycle.awaiting_start {
            debug!(container_id = %container_id, "removing container that was never started");
            docker.remove_container(&container_id).await
        } else {
            docker
                .stop_container(&container_id, lifecycle.config.stop_grace)
                .await
        };
        let result = match outcome {
            Ok(()) => Ok(()),
            Err(FixtureError::ContainerNotFound(_)) => {
                debug!(container_id = %container_id, "container already gone");
                Ok(())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if let Some(watcher) = lifecycle.watcher.take() {
                    watcher.disarm();
                }
                lifecycle.container_id = None;
                lifecycle.awaiting_start = false;
                lifecycle.started = false;
                self.publish(None);
                metrics::gauge!(m::FIXTURE_RUNNING).set(0.0);
                metrics::counter!(m::FIXTURE_STOPS_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
                info!(container_id = %container_id, "fixture stopped");
                Ok(())
            }
            Err(e) => {
                metrics::counter!(m::FIXTURE_STOPS_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                warn!(container_id = %container_id, error = %e, "fixture stop failed");
                Err(e)
            }
        }
    }

    fn publish(&self, endpoint: Option<HostEndpoint>) {
        let mut slot = self
            .inner
            .endpoint
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = endpoint;
    }

    /// Base URL of the running fixture, or `""` when not running.
    pub fn endpoint_url(&self) -> String {
        self.endpoint()
            .map(|endpoint| endpoint.url())
            .unwrap_or_default()
    }

    /// Published endpoint, `None` when not running.
    pub fn endpoint(&self) -> Option<HostEndpoint> {
        self.inner
            .endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a start has committed and no stop has happened since.
    pub fn is_running(&self) -> bool {
        self.endpoint().is_some()
    }

    /// ID of the container currently held. Waits for any in-flight
    /// operation.
    pub async fn container_id(&self) -> Option<String> {
        self.inner.lifecycle.lock().await.container_id.clone()
    }

    /// Snapshot of the stored configuration. Waits for any in-flight
    /// operation.
    pub async fn config(&self) -> ControllerConfig {
        self.inner.lifecycle.lock().await.config.clone()
    }

    /// Whether the running emulator answers its health endpoint. `false`
    /// when not running.
    pub async fn is_functional(&self) -> bool {
        match self.endpoint() {
            Some(endpoint) => HealthProbe::new(endpoint.url()).is_functional().await,
            None => false,
        }
    }

    /// Looks for a running container of the configured image, whoever
    /// started it.
    pub async fn find_running_instance(&self) -> Result<Option<ContainerSummary>, FixtureError> {
        let image = self.config().await.image;
        let containers = self.inner.docker.list_containers(Some(&image)).await?;
        Ok(containers.into_iter().next())
    }

    /// Whether a cancellation watcher is currently armed.
    pub async fn is_watching(&self) -> bool {
        self.inner
            .lifecycle
            .lock()
            .await
            .watcher
            .as_ref()
            .is_some_and(CancellationWatcher::is_armed)
    }
}
