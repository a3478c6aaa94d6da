//! `emustack health` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tracing::info;

use emustack_fixture::HealthProbe;
use emustack_fixture::health::any_service_up;

use crate::cli::HealthArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `health` command.
///
/// Renders the per-service report and fails with `CliError::Unhealthy` when
/// no service is up.
pub async fn execute(args: HealthArgs, writer: &OutputWriter) -> Result<(), CliError> {
    info!(endpoint = %args.endpoint, "probing emulator health");

    let probe = HealthProbe::new(&args.endpoint);
    let report = match probe.services().await {
        Ok(services) => HealthReport {
            endpoint: probe.base_url().to_owned(),
            functional: any_service_up(&services),
            services,
            error: None,
        },
        Err(e) => HealthReport {
            endpoint: probe.base_url().to_owned(),
            functional: false,
            services: BTreeMap::new(),
            error: Some(e.to_string()),
        },
    };

    writer.render(&report)?;

    if !report.functional {
        return Err(CliError::Unhealthy(
            report
                .error
                .unwrap_or_else(|| "no service is running".to_owned()),
        ));
    }
    Ok(())
}

/// Health probe report.
#[derive(Serialize)]
pub struct HealthReport {
    /// Probed base URL.
    pub endpoint: String,
    /// At least one service is running or available.
    pub functional: bool,
    /// Service name to status.
    pub services: BTreeMap<String, String>,
    /// Probe failure, if the endpoint did not answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Render for HealthReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Emulator health: {}", self.endpoint.bold())?;
        if self.functional {
            writeln!(w, "  Result: {}", "FUNCTIONAL".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "NOT FUNCTIONAL".red().bold())?;
        }
        if let Some(error) = &self.error {
            writeln!(w, "  Error: {}", error.red())?;
        }
        for (service, status) in &self.services {
            writeln!(w, "  {service:<24} {status}")?;
        }
        Ok(())
    }
}
