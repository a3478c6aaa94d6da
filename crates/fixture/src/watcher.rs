//! Cancellation watcher.
//!
//! One background task per successful start. It waits on the caller's
//! cancellation token and the run's disarm token; when the caller cancels
//! first it stops the fixture.
//!
//! The task only holds a `Weak` reference to the controller, so dropping the
//! last controller handle does not keep it alive. Any stop or restart cancels
//! the disarm token, and the stop path re-checks that token under the
//! operation lock, so a watcher never tears down a later run.

use std::sync::Weak;

use emustack_core::metrics as m;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::controller::{FixtureController, Inner};
use crate::docker::DockerClient;

/// Handle to an armed watcher task.
pub struct CancellationWatcher {
    disarm: CancellationToken,
    task: JoinHandle<()>,
}

impl CancellationWatcher {
    /// Spawns the watcher for the run that owns `container_id`.
    pub(crate) fn spawn<D: DockerClient>(
        inner: Weak<Inner<D>>,
        signal: CancellationToken,
        container_id: String,
    ) -> Self {
        let disarm = CancellationToken::new();
        let run_token = disarm.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                () = run_token.cancelled() => {
                    trace!(container_id = %container_id, "cancellation watcher disarmed");
                }
                () = signal.cancelled() => {
                    let Some(inner) = inner.upgrade() else {
                        return;
                    };
                    info!(container_id = %container_id, "cancellation signalled, stopping fixture");

                    let controller = FixtureController::from_inner(inner);
                    if let Err(e) = controller.stop_watched_run(&run_token).await {
                        metrics::counter!(m::FIXTURE_WATCHER_STOP_FAILURES_TOTAL).increment(1);
                        error!(
                            container_id = %container_id,
                            error = %e,
                            "failed to stop fixture after cancellation"
                        );
                    }
                }
            }
        });

        Self { disarm, task }
    }

    /// Disarms the watcher. Does not wait for the task, which may be the
    /// caller.
    pub(crate) fn disarm(&self) {
        self.disarm.cancel();
    }

    /// Whether the watcher is still waiting for a signal.
    pub fn is_armed(&self) -> bool {
        !self.disarm.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for CancellationWatcher {
    fn drop(&mut self) {
        self.disarm.cancel();
    }
}
