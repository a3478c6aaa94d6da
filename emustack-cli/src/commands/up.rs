//! `emustack up` command handler

use std::io::Write;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use emustack_core::config::EmustackConfig;
use emustack_fixture::{ControllerConfig, FixtureController, FixtureOption};

use crate::cli::UpArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `up` command.
///
/// Starts the fixture, prints where it listens and keeps it running until
/// Ctrl-C. The interrupt fires the fixture's cancellation token, which tears
/// the container down.
///
/// The start runs in its own task and is never dropped midway: an interrupt
/// during start cancels the token, waits for the start to settle, then
/// stops whatever it created.
pub async fn execute(
    args: UpArgs,
    mut config: EmustackConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if let Some(name) = &args.name {
        config.fixture.container_name = name.clone();
    }
    if let Some(image) = &args.image {
        config.fixture.image = image.clone();
    }

    let controller_config = ControllerConfig::from_core(&config.fixture)?;
    let controller = FixtureController::connect(controller_config)?;

    let shutdown = CancellationToken::new();
    let options = build_options(&args, shutdown.clone())?;

    info!(image = %config.fixture.image, force = args.force, "starting fixture");
    let starter = controller.clone();
    let force = args.force;
    let mut start_task = tokio::spawn(async move { starter.start(force, options).await });

    tokio::select! {
        joined = &mut start_task => {
            joined.map_err(|e| CliError::Command(format!("start task failed: {e}")))??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("interrupted before the fixture became ready, waiting for start to settle");
            shutdown.cancel();
            match start_task.await {
                Ok(Ok(())) => debug!("start completed after interrupt"),
                Ok(Err(e)) => debug!(error = %e, "start failed after interrupt"),
                Err(e) => warn!(error = %e, "start task failed"),
            }
            controller.stop().await?;
            return Err(CliError::Command(
                "interrupted before the fixture became ready".to_owned(),
            ));
        }
    }

    let report = UpReport {
        endpoint: controller.endpoint_url(),
        container_id: controller.container_id().await.unwrap_or_default(),
        image: config.fixture.image.clone(),
        functional: controller.is_functional().await,
    };
    writer.render(&report)?;

    info!("fixture running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    shutdown.cancel();
    // the watcher may already be stopping it; a second stop is a no-op
    controller.stop().await?;
    info!("fixture stopped");
    Ok(())
}

/// Translates command-line flags into fixture options.
fn build_options(
    args: &UpArgs,
    shutdown: CancellationToken,
) -> Result<Vec<FixtureOption>, CliError> {
    let mut options = vec![FixtureOption::cancellation(shutdown)];

    if let Some(dir) = &args.init_dir {
        let marker = args.marker.clone().unwrap_or_default();
        options.push(FixtureOption::init_script_mount(dir, marker)?);
    }
    if let Some(secs) = args.timeout {
        options.push(FixtureOption::init_timeout(secs));
    }
    if args.reuse {
        options.push(FixtureOption::reuse_existing());
    }
    if args.no_wait {
        options.push(FixtureOption::no_init_wait());
    }

    Ok(options)
}

/// Running fixture report.
#[derive(Serialize)]
pub struct UpReport {
    /// Base URL of the emulator.
    pub endpoint: String,
    /// Container ID.
    pub container_id: String,
    /// Image reference.
    pub image: String,
    /// Whether the emulator answered its health endpoint.
    pub functional: bool,
}

impl Render for UpReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "Fixture ready".green().bold())?;
        writeln!(w, "  Endpoint:   {}", self.endpoint.bold())?;
        writeln!(w, "  Container:  {}", short_id(&self.container_id))?;
        writeln!(w, "  Image:      {}", self.image)?;
        let functional = if self.functional {
            "yes".green()
        } else {
            "no".yellow()
        };
        writeln!(w, "  Functional: {functional}")?;
        Ok(())
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
