//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait covers exactly the runtime operations the
//! fixture needs. Production code uses [`BollardDockerClient`]; tests use
//! `MockDockerClient` (unit tests) or their own scripted clients.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │ FixtureController │
//! └─────────┬─────────┘
//!           │
//!           ▼
//!    ┌─────────────┐
//!    │DockerClient │ (trait)
//!    └─────────────┘
//!        │      │
//!        ▼      ▼
//!   ┌───────┐ ┌────┐
//!   │Bollard│ │Mock│
//!   └───┬───┘ └────┘
//!       │
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # Container references
//!
//! Methods taking a container reference accept either an ID or a name and
//! validate it before calling the runtime:
//! - 1-128 characters
//! - first character ASCII alphanumeric
//! - remaining characters ASCII alphanumeric or one of `_`, `.`, `-`

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bollard::errors::Error as BollardError;
use futures::StreamExt;
use tracing::{debug, trace};

use emustack_core::types::{ContainerDetails, ContainerSummary, HostBinding};

use crate::config::ControllerConfig;
use crate::error::FixtureError;

/// Host address the service port is published on.
pub const PUBLISH_HOST_IP: &str = "0.0.0.0";

const MAX_REFERENCE_LEN: usize = 128;

/// Validates a container ID or name.
pub(crate) fn validate_container_ref(reference: &str) -> Result<(), FixtureError> {
    if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
        return Err(FixtureError::DockerApi(format!(
            "invalid container reference: length {} (must be 1-{MAX_REFERENCE_LEN})",
            reference.len()
        )));
    }
    let mut chars = reference.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first_ok || !rest_ok {
        return Err(FixtureError::DockerApi(format!(
            "invalid container reference '{reference}': unexpected characters"
        )));
    }
    Ok(())
}

/// Everything needed to create the fixture container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference.
    pub image: String,
    /// Optional container name.
    pub name: Option<String>,
    /// Container port published on an ephemeral host port.
    pub container_port: String,
    /// Bind mounts as (container target, host source).
    pub mounts: Vec<(String, PathBuf)>,
    /// Remove the container once it stops.
    pub auto_remove: bool,
}

impl ContainerSpec {
    /// Derives the creation request from a controller configuration.
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            image: config.image.clone(),
            name: config.container_name.clone(),
            container_port: config.container_port.clone(),
            mounts: config
                .mounts
                .iter()
                .map(|(target, source)| (target.clone(), source.clone()))
                .collect(),
            auto_remove: true,
        }
    }
}

/// Container runtime operations used by the fixture.
///
/// The trait is `Send + Sync + 'static` so a client can be shared between the
/// controller and its cancellation watcher.
///
/// # Error mapping
///
/// - **404**: `FixtureError::ContainerNotFound`
/// - **409 on create**: `FixtureError::NameConflict`
/// - **connection problems**: `FixtureError::DockerConnection`
pub trait DockerClient: Send + Sync + 'static {
    /// Checks that the runtime answers.
    fn ping(&self) -> impl Future<Output = Result<(), FixtureError>> + Send;

    /// Returns whether `reference` is present in the local image store.
    fn image_exists(
        &self,
        reference: &str,
    ) -> impl Future<Output = Result<bool, FixtureError>> + Send;

    /// Pulls `reference`, consuming the whole progress stream before
    /// returning.
    ///
    /// # Errors
    ///
    /// `FixtureError::ImagePull` if the pull or any progress message fails.
    fn pull_image(&self, reference: &str)
    -> impl Future<Output = Result<(), FixtureError>> + Send;

    /// Lists running containers, optionally only those created from `image`.
    fn list_containers(
        &self,
        image: Option<&str>,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, FixtureError>> + Send;

    /// Creates a container and returns its ID.
    ///
    /// # Errors
    ///
    /// - `FixtureError::NameConflict`: a container with `spec.name` exists
    /// - `FixtureError::ContainerCreate`: anything else
    fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<String, FixtureError>> + Send;

    /// Starts a created container. Starting a running container succeeds.
    fn start_container(&self, id: &str) -> impl Future<Output = Result<(), FixtureError>> + Send;

    /// Returns the current stdout/stderr of a container without following.
    fn container_logs(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<String, FixtureError>> + Send;

    /// Stops a container, killing it after `grace`. Stopping a stopped
    /// container succeeds.
    fn stop_container(
        &self,
        id: &str,
        grace: Duration,
    ) -> impl Future<Output = Result<(), FixtureError>> + Send;

    /// Force-removes a container.
    fn remove_container(&self, id: &str)
    -> impl Future<Output = Result<(), FixtureError>> + Send;

    /// Inspects a container by ID or name.
    fn inspect_container(
        &self,
        reference: &str,
    ) -> impl Future<Output = Result<ContainerDetails, FixtureError>> + Send;
}

fn has_status(err: &BollardError, code: u16) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

/// Production client backed by `bollard`.
///
/// Talks to the Docker daemon over the local socket (honouring
/// `DOCKER_HOST`) or an explicit socket path.
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects with the platform defaults.
    ///
    /// # Errors
    ///
    /// `FixtureError::DockerConnection` if no client can be built.
    pub fn connect_local() -> Result<Self, FixtureError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            FixtureError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, FixtureError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    FixtureError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to `socket_path` if given, otherwise to the local default.
    pub fn connect(socket_path: Option<&str>) -> Result<Self, FixtureError> {
        match socket_path {
            Some(path) => Self::connect_with_socket(path),
            None => Self::connect_local(),
        }
    }
}

impl DockerClient for BollardDockerClient {
    async fn ping(&self) -> Result<(), FixtureError> {
        self.docker
            .ping()
            .await
            .map_err(|e| FixtureError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, FixtureError> {
        use bollard::image::ListImagesOptions;

        let mut filters = HashMap::new();
        filters.insert("reference".to_owned(), vec![reference.to_owned()]);
        let options = ListImagesOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| FixtureError::DockerApi(format!("list images failed: {e}")))?;
        Ok(!images.is_empty())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), FixtureError> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions {
            from_image: reference.to_owned(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        trace!(image = reference, status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(FixtureError::ImagePull {
                        image: reference.to_owned(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn list_containers(
        &self,
        image: Option<&str>,
    ) -> Result<Vec<ContainerSummary>, FixtureError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        if let Some(image) = image {
            filters.insert("ancestor".to_owned(), vec![image.to_owned()]);
        }
        let options = ListContainersOptions::<String> {
            all: false,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| FixtureError::DockerApi(format!("list containers failed: {e}")))?;

        let result = containers
            .into_iter()
            .map(|container| ContainerSummary {
                id: container.id.unwrap_or_default(),
                name: container
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default(),
                image: container.image.unwrap_or_default(),
                state: container.state.unwrap_or_default(),
            })
            .collect();
        Ok(result)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, FixtureError> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum, PortBinding};

        if let Some(name) = &spec.name {
            validate_container_ref(name)?;
        }

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            spec.container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some(PUBLISH_HOST_IP.to_owned()),
                // empty host port: the runtime picks an ephemeral one
                host_port: Some(String::new()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(spec.container_port.clone(), HashMap::new());

        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|(target, source)| Mount {
                target: Some(target.clone()),
                source: Some(source.display().to_string()),
                typ: Some(MountTypeEnum::BIND),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            mounts: if mounts.is_empty() {
                None
            } else {
                Some(mounts)
            },
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            tty: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| {
                if has_status(&e, 409) {
                    FixtureError::NameConflict {
                        name: spec.name.clone().unwrap_or_default(),
                    }
                } else {
                    FixtureError::ContainerCreate {
                        reason: e.to_string(),
                    }
                }
            })?;

        for warning in &response.warnings {
            debug!(warning = %warning, "container create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), FixtureError> {
        use bollard::container::StartContainerOptions;

        validate_container_ref(id)?;

        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already running
            Err(e) if has_status(&e, 304) => Ok(()),
            Err(e) if has_status(&e, 404) => Err(FixtureError::ContainerNotFound(id.to_owned())),
            Err(e) => Err(FixtureError::ContainerStart {
                container_id: id.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<String, FixtureError> {
        use bollard::container::LogsOptions;

        validate_container_ref(id)?;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut output = String::new();
        while let Some(result) = stream.next().await {
            match result {
                Ok(chunk) => output.push_str(&chunk.to_string()),
                Err(e) if has_status(&e, 404) => {
                    return Err(FixtureError::ContainerNotFound(id.to_owned()));
                }
                Err(e) => {
                    return Err(FixtureError::DockerApi(format!("logs failed: {e}")));
                }
            }
        }
        Ok(output)
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), FixtureError> {
        use bollard::container::StopContainerOptions;

        validate_container_ref(id)?;

        let options = StopContainerOptions {
            t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
        };
        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if has_status(&e, 304) => Ok(()),
            Err(e) if has_status(&e, 404) => Err(FixtureError::ContainerNotFound(id.to_owned())),
            Err(e) => Err(FixtureError::ContainerStop {
                container_id: id.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), FixtureError> {
        use bollard::container::RemoveContainerOptions;

        validate_container_ref(id)?;

        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| {
                if has_status(&e, 404) {
                    FixtureError::ContainerNotFound(id.to_owned())
                } else {
                    FixtureError::DockerApi(format!("remove container failed: {e}"))
                }
            })
    }

    async fn inspect_container(&self, reference: &str) -> Result<ContainerDetails, FixtureError> {
        validate_container_ref(reference)?;

        let details = self
            .docker
            .inspect_container(reference, None)
            .await
            .map_err(|e| {
                if has_status(&e, 404) {
                    FixtureError::ContainerNotFound(reference.to_owned())
                } else {
                    FixtureError::DockerApi(format!("inspect container failed: {e}"))
                }
            })?;

        let ports = details
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default()
            .into_iter()
            .map(|(port, bindings)| {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|binding| HostBinding {
                        host_ip: binding.host_ip.unwrap_or_default(),
                        host_port: binding.host_port.unwrap_or_default(),
                    })
                    .collect();
                (port, bindings)
            })
            .collect();

        Ok(ContainerDetails {
            id: details.id.unwrap_or_default(),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default(),
            image: details.config.and_then(|c| c.image).unwrap_or_default(),
            running: details.state.and_then(|s| s.running).unwrap_or(false),
            ports,
        })
    }
}

/// Stateful in-memory Docker stand-in for unit tests.
///
/// Running containers are auto-removed on stop, log output gains the ready line after
/// a configurable number of polls, and each created container gets its own
/// host port.
#[cfg(test)]
pub struct MockDockerClient {
    state: std::sync::Mutex<MockState>,
}

#[cfg(test)]
struct MockState {
    images: Vec<String>,
    containers: Vec<MockContainer>,
    next_id: u64,
    ready_line: String,
    ready_after_polls: usize,
    fail_ping: bool,
    fail_pull: bool,
    fail_start: bool,
    fail_stop: bool,
    start_delay: Duration,
    log_delay: Duration,
    pulls: usize,
    creates: usize,
    stopped: Vec<String>,
}

#[cfg(test)]
struct MockContainer {
    id: String,
    name: String,
    image: String,
    running: bool,
    log_polls: usize,
    host_port: u16,
}

#[cfg(test)]
impl Default for MockDockerClient {
    fn default() -> Self {
        Self {
            state: std::sync::Mutex::new(MockState {
                images: Vec::new(),
                containers: Vec::new(),
                next_id: 0,
                ready_line: emustack_core::config::DEFAULT_READY_MARKER.to_owned(),
                ready_after_polls: 0,
                fail_ping: false,
                fail_pull: false,
                fail_start: false,
                fail_stop: false,
                start_delay: Duration::ZERO,
                log_delay: Duration::ZERO,
                pulls: 0,
                creates: 0,
                stopped: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
impl MockDockerClient {
    /// Empty runtime: no images, no containers, ready on the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Marks `reference` as present locally.
    pub fn with_image(self, reference: &str) -> Self {
        self.state().images.push(reference.to_owned());
        self
    }

    /// Prints `line` once the container is ready.
    pub fn with_ready_line(self, line: &str) -> Self {
        self.state().ready_line = line.to_owned();
        self
    }

    /// Ready line appears on poll number `polls + 1`.
    pub fn ready_after(self, polls: usize) -> Self {
        self.state().ready_after_polls = polls;
        self
    }

    /// Ready line never appears.
    pub fn never_ready(self) -> Self {
        self.ready_after(usize::MAX)
    }

    pub fn with_failing_ping(self) -> Self {
        self.state().fail_ping = true;
        self
    }

    pub fn with_failing_pull(self) -> Self {
        self.state().fail_pull = true;
        self
    }

    pub fn with_failing_start(self) -> Self {
        self.state().fail_start = true;
        self
    }

    /// Each `start_container` call sleeps for `delay` first.
    pub fn with_start_delay(self, delay: Duration) -> Self {
        self.state().start_delay = delay;
        self
    }

    /// Each `container_logs` call sleeps for `delay` first.
    pub fn with_log_delay(self, delay: Duration) -> Self {
        self.state().log_delay = delay;
        self
    }

    /// Containers currently known to the runtime, running or not.
    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.state().fail_stop = fail;
    }

    /// Simulates a container that vanished (crashed and auto-removed).
    pub fn remove_all(&self) {
        self.state().containers.clear();
    }

    pub fn pull_count(&self) -> usize {
        self.state().pulls
    }

    pub fn create_count(&self) -> usize {
        self.state().creates
    }

    pub fn running_count(&self) -> usize {
        self.state().containers.iter().filter(|c| c.running).count()
    }

    pub fn stopped_ids(&self) -> Vec<String> {
        self.state().stopped.clone()
    }
}

#[cfg(test)]
impl MockState {
    fn find(&mut self, reference: &str) -> Option<&mut MockContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == reference || (!c.name.is_empty() && c.name == reference))
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn ping(&self) -> Result<(), FixtureError> {
        if self.state().fail_ping {
            return Err(FixtureError::DockerConnection("mock daemon down".to_owned()));
        }
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, FixtureError> {
        Ok(self.state().images.iter().any(|i| i == reference))
    }

    async fn pull_image(&self, reference: &str) -> Result<(), FixtureError> {
        let mut state = self.state();
        if state.fail_pull {
            return Err(FixtureError::ImagePull {
                image: reference.to_owned(),
                reason: "mock registry unavailable".to_owned(),
            });
        }
        state.pulls += 1;
        state.images.push(reference.to_owned());
        Ok(())
    }

    async fn list_containers(
        &self,
        image: Option<&str>,
    ) -> Result<Vec<ContainerSummary>, FixtureError> {
        Ok(self
            .state()
            .containers
            .iter()
            .filter(|c| c.running)
            .filter(|c| image.is_none_or(|image| c.image == image))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: "running".to_owned(),
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, FixtureError> {
        let mut state = self.state();
        if let Some(name) = &spec.name {
            if state.containers.iter().any(|c| &c.name == name) {
                return Err(FixtureError::NameConflict { name: name.clone() });
            }
        }
        state.next_id += 1;
        state.creates += 1;
        let id = format!("{:064x}", state.next_id);
        let host_port = 49152 + u16::try_from(state.next_id).unwrap_or(0);
        state.containers.push(MockContainer {
            id: id.clone(),
            name: spec.name.clone().unwrap_or_default(),
            image: spec.image.clone(),
            running: false,
            log_polls: 0,
            host_port,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), FixtureError> {
        let delay = self.state().start_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_start {
            return Err(FixtureError::ContainerStart {
                container_id: id.to_owned(),
                reason: "mock start failure".to_owned(),
            });
        }
        let container = state
            .find(id)
            .ok_or_else(|| FixtureError::ContainerNotFound(id.to_owned()))?;
        container.running = true;
        Ok(())
    }

    async fn container_logs(&self, id: &str) -> Result<String, FixtureError> {
        let delay = self.state().log_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let ready_after = state.ready_after_polls;
        let ready_line = state.ready_line.clone();
        let container = state
            .find(id)
            .ok_or_else(|| FixtureError::ContainerNotFound(id.to_owned()))?;
        container.log_polls += 1;
        if container.log_polls > ready_after {
            Ok(format!("Starting mock services...\n{ready_line}\n"))
        } else {
            Ok("Starting mock services...\n".to_owned())
        }
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> Result<(), FixtureError> {
        let mut state = self.state();
        if state.fail_stop {
            return Err(FixtureError::ContainerStop {
                container_id: id.to_owned(),
                reason: "mock stop failure".to_owned(),
            });
        }
        let container = state
            .find(id)
            .ok_or_else(|| FixtureError::ContainerNotFound(id.to_owned()))?;
        // a container that never ran is left in place, as auto-remove is not triggered
        if !container.running {
            return Ok(());
        }
        state.containers.retain(|c| c.id != id);
        state.stopped.push(id.to_owned());
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), FixtureError> {
        let mut state = self.state();
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(FixtureError::ContainerNotFound(id.to_owned()));
        }
        Ok(())
    }

    async fn inspect_container(&self, reference: &str) -> Result<ContainerDetails, FixtureError> {
        let mut state = self.state();
        let container = state
            .find(reference)
            .ok_or_else(|| FixtureError::ContainerNotFound(reference.to_owned()))?;

        let mut ports = HashMap::new();
        if container.running {
            ports.insert(
                crate::config::SERVICE_PORT.to_owned(),
                vec![
                    HostBinding {
                        host_ip: PUBLISH_HOST_IP.to_owned(),
                        host_port: container.host_port.to_string(),
                    },
                    HostBinding {
                        host_ip: "::".to_owned(),
                        host_port: container.host_port.to_string(),
                    },
                ],
            );
        }

        Ok(ContainerDetails {
            id: container.id.clone(),
            name: container.name.clone(),
            image: container.image.clone(),
            running: container.running,
            ports,
        })
    }
}
