//! Lifecycle integration tests.
//!
//! Drive `FixtureController` end to end against a scripted in-memory runtime:
//! start, join, restart, reuse by name, readiness timing, endpoint
//! publication and cancellation-triggered teardown.

use std::sync::Arc;
use std::time::Duration;

use emustack_fixture::{
    ControllerConfig, ControllerConfigBuilder, FixtureController, FixtureError, FixtureOption,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const POLL: Duration = Duration::from_millis(500);

mod mock {
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use emustack_core::types::{ContainerDetails, ContainerSummary, HostBinding};
    use emustack_fixture::{ContainerSpec, DockerClient, FixtureError};
    use tokio::sync::Mutex;

    struct Container {
        id: String,
        name: String,
        image: String,
        running: bool,
        polls: usize,
        host_port: u16,
    }

    #[derive(Default)]
    struct State {
        images: HashSet<String>,
        containers: Vec<Container>,
        next: u64,
        ready_after: usize,
        fail_stop: bool,
        creates: usize,
        stop_attempts: usize,
    }

    /// Scripted runtime: containers become ready after `ready_after` log
    /// polls and are removed when stopped.
    pub struct TestDockerClient {
        state: Mutex<State>,
    }

    impl TestDockerClient {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(State::default()),
            }
        }

        pub fn ready_after(polls: usize) -> Self {
            Self {
                state: Mutex::new(State {
                    ready_after: polls,
                    ..State::default()
                }),
            }
        }

        pub fn never_ready() -> Self {
            Self::ready_after(usize::MAX)
        }

        pub async fn set_fail_stop(&self, fail: bool) {
            self.state.lock().await.fail_stop = fail;
        }

        pub async fn creates(&self) -> usize {
            self.state.lock().await.creates
        }

        pub async fn stop_attempts(&self) -> usize {
            self.state.lock().await.stop_attempts
        }

        pub async fn running(&self) -> usize {
            self.state
                .lock()
                .await
                .containers
                .iter()
                .filter(|c| c.running)
                .count()
        }
    }

    fn not_found(reference: &str) -> FixtureError {
        FixtureError::ContainerNotFound(reference.to_owned())
    }

    impl DockerClient for TestDockerClient {
        async fn ping(&self) -> Result<(), FixtureError> {
            Ok(())
        }

        async fn image_exists(&self, reference: &str) -> Result<bool, FixtureError> {
            Ok(self.state.lock().await.images.contains(reference))
        }

        async fn pull_image(&self, reference: &str) -> Result<(), FixtureError> {
            self.state.lock().await.images.insert(reference.to_owned());
            Ok(())
        }

        async fn list_containers(
            &self,
            image: Option<&str>,
        ) -> Result<Vec<ContainerSummary>, FixtureError> {
            Ok(self
                .state
                .lock()
                .await
                .containers
                .iter()
                .filter(|c| c.running && image.is_none_or(|i| i == c.image))
                .map(|c| ContainerSummary {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    image: c.image.clone(),
                    state: "running".to_owned(),
                })
                .collect())
        }

        async fn create_container(&self, spec: &ContainerSpec) -> Result<String, FixtureError> {
            let mut state = self.state.lock().await;
            if let Some(name) = &spec.name {
                if state.containers.iter().any(|c| &c.name == name) {
                    return Err(FixtureError::NameConflict { name: name.clone() });
                }
            }
            state.next += 1;
            state.creates += 1;
            let id = format!("{:064x}", 0xfeed_0000 + state.next);
            let host_port = 32768 + u16::try_from(state.next).unwrap_or(0);
            state.containers.push(Container {
                id: id.clone(),
                name: spec.name.clone().unwrap_or_default(),
                image: spec.image.clone(),
                running: false,
                polls: 0,
                host_port,
            });
            Ok(id)
        }

        async fn start_container(&self, id: &str) -> Result<(), FixtureError> {
            let mut state = self.state.lock().await;
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| not_found(id))?;
            container.running = true;
            Ok(())
        }

        async fn container_logs(&self, id: &str) -> Result<String, FixtureError> {
            let mut state = self.state.lock().await;
            let ready_after = state.ready_after;
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| not_found(id))?;
            container.polls += 1;
            if container.polls > ready_after {
                Ok("Starting edge router\nReady.\n".to_owned())
            } else {
                Ok("Starting edge router\n".to_owned())
            }
        }

        async fn stop_container(&self, id: &str, _grace: Duration) -> Result<(), FixtureError> {
            let mut state = self.state.lock().await;
            state.stop_attempts += 1;
            if state.fail_stop {
                return Err(FixtureError::ContainerStop {
                    container_id: id.to_owned(),
                    reason: "daemon busy".to_owned(),
                });
            }
            let before = state.containers.len();
            state.containers.retain(|c| c.id != id);
            if state.containers.len() == before {
                return Err(not_found(id));
            }
            Ok(())
        }

        async fn remove_container(&self, id: &str) -> Result<(), FixtureError> {
            self.state.lock().await.containers.retain(|c| c.id != id);
            Ok(())
        }

        async fn inspect_container(
            &self,
            reference: &str,
        ) -> Result<ContainerDetails, FixtureError> {
            let state = self.state.lock().await;
            let container = state
                .containers
                .iter()
                .find(|c| c.id == reference || c.name == reference)
                .ok_or_else(|| not_found(reference))?;

            let mut ports = HashMap::new();
            if container.running {
                ports.insert(
                    "4566/tcp".to_owned(),
                    vec![HostBinding {
                        host_ip: "0.0.0.0".to_owned(),
                        host_port: container.host_port.to_string(),
                    }],
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
}

use mock::TestDockerClient;

fn config() -> ControllerConfig {
    ControllerConfigBuilder::new()
        .poll_interval(POLL)
        .build()
        .expect("valid config")
}

fn controller(client: &Arc<TestDockerClient>) -> FixtureController<TestDockerClient> {
    FixtureController::new(Arc::clone(client), config())
}

async fn wait_until_stopped(controller: &FixtureController<TestDockerClient>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.is_running() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("fixture should stop after cancellation");
}

// =============================================================================
// endpoint publication
// =============================================================================

#[tokio::test]
async fn endpoint_is_empty_before_start() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);

    assert_eq!(fixture.endpoint_url(), "");
    assert!(fixture.endpoint().is_none());
    assert!(!fixture.is_running());
}

#[tokio::test(start_paused = true)]
async fn default_scenario_yields_loopback_url() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);

    fixture.start(false, Vec::new()).await.unwrap();

    let url = fixture.endpoint_url();
    let port = url
        .strip_prefix("http://127.0.0.1:")
        .expect("loopback url")
        .parse::<u16>()
        .expect("numeric port");
    assert!(port > 0);
}

#[tokio::test(start_paused = true)]
async fn endpoint_is_stable_while_running() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);
    fixture.start(false, Vec::new()).await.unwrap();

    let first = fixture.endpoint_url();
    for _ in 0..10 {
        assert_eq!(fixture.endpoint_url(), first);
    }
}

#[tokio::test(start_paused = true)]
async fn endpoint_is_empty_after_stop_and_not_functional() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);
    fixture.start(false, Vec::new()).await.unwrap();

    fixture.stop().await.unwrap();

    assert_eq!(fixture.endpoint_url(), "");
    assert!(!fixture.is_functional().await);
    assert!(fixture.container_id().await.is_none());
    assert_eq!(client.running().await, 0);
}

#[tokio::test(start_paused = true)]
async fn endpoint_read_does_not_wait_for_start_in_progress() {
    let client = Arc::new(TestDockerClient::never_ready());
    let fixture = controller(&client);

    let starting = fixture.clone();
    let start = tokio::spawn(async move {
        starting
            .start(false, vec![FixtureOption::init_timeout(5)])
            .await
    });

    // let the start reach the readiness loop
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fixture.endpoint_url(), "");

    let result = start.await.expect("start task");
    assert!(matches!(result, Err(FixtureError::ReadinessTimeout { .. })));
}

// =============================================================================
// start semantics
// =============================================================================

#[tokio::test(start_paused = true)]
async fn double_start_without_force_keeps_one_container() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);

    fixture.start(false, Vec::new()).await.unwrap();
    let id = fixture.container_id().await;
    let url = fixture.endpoint_url();

    fixture.start(false, Vec::new()).await.unwrap();

    assert_eq!(fixture.container_id().await, id);
    assert_eq!(fixture.endpoint_url(), url);
    assert_eq!(client.creates().await, 1);
    assert_eq!(client.running().await, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_create_one_container() {
    let client = Arc::new(TestDockerClient::ready_after(3));
    let fixture = controller(&client);

    let (a, b) = tokio::join!(
        fixture.start(false, Vec::new()),
        fixture.start(false, Vec::new())
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(client.creates().await, 1);
}

#[tokio::test(start_paused = true)]
async fn forced_restart_changes_identity() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);

    fixture.start(false, Vec::new()).await.unwrap();
    let first = fixture.container_id().await.unwrap();

    fixture.start(true, Vec::new()).await.unwrap();
    let second = fixture.container_id().await.unwrap();

    assert_ne!(first, second);
    assert_eq!(client.running().await, 1);
    assert!(fixture.is_running());
}

#[tokio::test(start_paused = true)]
async fn reuse_existing_shares_identity_between_controllers() {
    let client = Arc::new(TestDockerClient::new());
    let first = controller(&client);
    let second = controller(&client);

    first
        .start(false, vec![FixtureOption::reuse_existing()])
        .await
        .unwrap();
    second
        .start(false, vec![FixtureOption::reuse_existing()])
        .await
        .unwrap();

    assert_eq!(first.container_id().await, second.container_id().await);
    assert_eq!(first.endpoint_url(), second.endpoint_url());
    assert_eq!(client.creates().await, 1);
    assert_eq!(client.running().await, 1);
}

#[tokio::test(start_paused = true)]
async fn name_conflict_without_reuse_fails() {
    let client = Arc::new(TestDockerClient::new());
    let named = |name: &str| {
        FixtureController::new(
            Arc::clone(&client),
            ControllerConfigBuilder::new()
                .container_name(name)
                .build()
                .expect("valid config"),
        )
    };
    let first = named("shared-stack");
    let second = named("shared-stack");

    first.start(false, Vec::new()).await.unwrap();
    let err = second.start(false, Vec::new()).await.unwrap_err();

    assert!(matches!(err, FixtureError::NameConflict { ref name } if name == "shared-stack"));
    assert!(second.container_id().await.is_none());
    assert_eq!(second.endpoint_url(), "");
}

// =============================================================================
// readiness timing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn readiness_blocks_for_at_least_n_intervals() {
    let polls = 6;
    let client = Arc::new(TestDockerClient::ready_after(polls));
    let fixture = controller(&client);

    let begin = Instant::now();
    fixture.start(false, Vec::new()).await.unwrap();

    assert!(begin.elapsed() >= POLL * polls as u32);
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_fails_within_bound() {
    let client = Arc::new(TestDockerClient::never_ready());
    let fixture = controller(&client);
    let timeout = Duration::from_secs(4);

    let begin = Instant::now();
    let err = fixture
        .start(false, vec![FixtureOption::init_timeout(timeout.as_secs())])
        .await
        .unwrap_err();
    let waited = begin.elapsed();

    assert!(matches!(err, FixtureError::ReadinessTimeout { .. }));
    assert!(waited >= timeout);
    assert!(waited <= timeout + POLL);
    assert_eq!(fixture.endpoint_url(), "");

    // the container is still held and can be reclaimed
    fixture.stop().await.unwrap();
    assert_eq!(client.running().await, 0);
}

#[tokio::test]
async fn no_init_wait_returns_without_polling() {
    let client = Arc::new(TestDockerClient::never_ready());
    let fixture = controller(&client);

    fixture
        .start(false, vec![FixtureOption::no_init_wait()])
        .await
        .unwrap();
    assert!(fixture.endpoint_url().starts_with("http://127.0.0.1:"));
}

// =============================================================================
// cancellation
// =============================================================================

#[tokio::test]
async fn cancellation_stops_the_fixture() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);
    let token = CancellationToken::new();

    fixture
        .start(false, vec![FixtureOption::cancellation(token.clone())])
        .await
        .unwrap();
    assert!(fixture.is_running());

    token.cancel();
    wait_until_stopped(&fixture).await;

    assert_eq!(fixture.endpoint_url(), "");
    assert_eq!(client.running().await, 0);
}

#[tokio::test]
async fn failed_cancellation_stop_is_contained() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);
    let token = CancellationToken::new();

    fixture
        .start(false, vec![FixtureOption::cancellation(token.clone())])
        .await
        .unwrap();
    client.set_fail_stop(true).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.stop_attempts().await == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("watcher should attempt a stop");

    // the process survives and the fixture can still be stopped explicitly
    assert!(fixture.is_running());
    client.set_fail_stop(false).await;
    fixture.stop().await.unwrap();
    assert!(!fixture.is_running());
}

#[tokio::test]
async fn stale_watcher_does_not_stop_a_restarted_fixture() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);
    let first_token = CancellationToken::new();
    let second_token = CancellationToken::new();

    fixture
        .start(false, vec![FixtureOption::cancellation(first_token.clone())])
        .await
        .unwrap();
    fixture
        .start(true, vec![FixtureOption::cancellation(second_token.clone())])
        .await
        .unwrap();

    first_token.cancel();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(fixture.is_running());

    second_token.cancel();
    wait_until_stopped(&fixture).await;
}

#[tokio::test]
async fn cancellation_after_stop_is_harmless() {
    let client = Arc::new(TestDockerClient::new());
    let fixture = controller(&client);
    let token = CancellationToken::new();

    fixture
        .start(false, vec![FixtureOption::cancellation(token.clone())])
        .await
        .unwrap();
    fixture.stop().await.unwrap();
    let attempts = client.stop_attempts().await;

    token.cancel();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(client.stop_attempts().await, attempts);
}
