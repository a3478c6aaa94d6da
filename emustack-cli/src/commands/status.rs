//! `emustack status` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use emustack_core::config::EmustackConfig;
use emustack_core::types::ContainerSummary;
use emustack_fixture::{ControllerConfig, FixtureController};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
///
/// Reports whether a container of the configured image is running, whoever
/// started it.
pub async fn execute(config: EmustackConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let controller_config = ControllerConfig::from_core(&config.fixture)?;
    let controller = FixtureController::connect(controller_config)?;

    info!(image = %config.fixture.image, "looking for running emulator containers");
    let instance = controller.find_running_instance().await?;

    writer.render(&StatusReport {
        image: config.fixture.image,
        running: instance.is_some(),
        container: instance,
    })
}

/// Fixture status report.
#[derive(Serialize)]
pub struct StatusReport {
    /// Configured image.
    pub image: String,
    /// Whether a container of that image is running.
    pub running: bool,
    /// The first running container, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerSummary>,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Image: {}", self.image.bold())?;
        match &self.container {
            Some(container) => {
                writeln!(w, "  Status: {}", "RUNNING".green().bold())?;
                writeln!(w, "  {:<12} {:<30} {:<10}", "ID", "Name", "State")?;
                writeln!(
                    w,
                    "  {:<12} {:<30} {:<10}",
                    container.id.get(..12).unwrap_or(&container.id),
                    container.name,
                    container.state
                )?;
            }
            None => writeln!(w, "  Status: {}", "NOT RUNNING".yellow().bold())?,
        }
        Ok(())
    }
}
