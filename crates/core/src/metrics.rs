//! Metric names and descriptions.
//!
//! Every metric emitted through the `metrics` facade is named here so the
//! fixture and the CLI agree on spelling. No exporter is installed by this
//! workspace; a host process that installs a recorder gets these for free.
//!
//! # Naming
//!
//! - prefix: `emustack_fixture_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(emustack_core::metrics::FIXTURE_STOPS_TOTAL).increment(1);
//! ```

/// Result label key (`success`, `failure`).
pub const LABEL_RESULT: &str = "result";

/// Fixture starts, labelled by result (counter).
pub const FIXTURE_STARTS_TOTAL: &str = "emustack_fixture_starts_total";

/// Fixture stops, labelled by result (counter).
pub const FIXTURE_STOPS_TOTAL: &str = "emustack_fixture_stops_total";

/// Image pulls performed because the image was missing locally (counter).
pub const FIXTURE_IMAGE_PULLS_TOTAL: &str = "emustack_fixture_image_pulls_total";

/// Time from container start until the readiness marker appeared (histogram, seconds).
pub const FIXTURE_READINESS_DURATION_SECONDS: &str =
    "emustack_fixture_readiness_duration_seconds";

/// 1 while a fixture is running, 0 otherwise (gauge).
pub const FIXTURE_RUNNING: &str = "emustack_fixture_running";

/// Cancellation-triggered stops that failed (counter).
pub const FIXTURE_WATCHER_STOP_FAILURES_TOTAL: &str =
    "emustack_fixture_watcher_stop_failures_total";

/// All metric names, used by tests to check naming rules.
pub const ALL_METRIC_NAMES: &[&str] = &[
    FIXTURE_STARTS_TOTAL,
    FIXTURE_STOPS_TOTAL,
    FIXTURE_IMAGE_PULLS_TOTAL,
    FIXTURE_READINESS_DURATION_SECONDS,
    FIXTURE_RUNNING,
    FIXTURE_WATCHER_STOP_FAILURES_TOTAL,
];

/// Registers descriptions for every metric.
///
/// Safe to call without an installed recorder.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(FIXTURE_STARTS_TOTAL, "Fixture start attempts by result");
    describe_counter!(FIXTURE_STOPS_TOTAL, "Fixture stop attempts by result");
    describe_counter!(
        FIXTURE_IMAGE_PULLS_TOTAL,
        "Emulator image pulls triggered by a missing local image"
    );
    describe_histogram!(
        FIXTURE_READINESS_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time until the readiness marker appeared in the container log"
    );
    describe_gauge!(FIXTURE_RUNNING, "Whether the fixture container is running");
    describe_counter!(
        FIXTURE_WATCHER_STOP_FAILURES_TOTAL,
        "Cancellation-triggered stops that failed"
    );
}
