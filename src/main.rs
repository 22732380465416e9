//! Application lifecycle orchestrator binary.
//!
//! Loads configuration from an optional TOML file and the environment,
//! builds the app with in-process subsystems and runs it until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use app_orchestrator::config::{self, ConfigSource, EnvSource, FileSource};
use app_orchestrator::observability::{logging, metrics};
use app_orchestrator::{App, InMemoryProvider};

#[derive(Parser, Debug)]
#[command(name = "app-orchestrator", version, about = "Run the application lifecycle")]
struct Cli {
    /// TOML file layered under the environment.
    #[arg(short, long, env = "APP_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration (secrets omitted) and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The file may fail to open before logging exists; report it after.
    let (file, file_error) = match &cli.config {
        Some(path) => match FileSource::open(path) {
            Ok(file) => (Some(file), None),
            Err(e) => (None, Some(e)),
        },
        None => (None, None),
    };

    let env = EnvSource::new();
    let mut sources: Vec<&dyn ConfigSource> = Vec::new();
    if let Some(file) = &file {
        sources.push(file);
    }
    sources.push(&env);

    let (settings, diagnostics) = config::load_with_diagnostics(&sources);

    if cli.print_config {
        return match toml::to_string_pretty(&settings) {
            Ok(rendered) => {
                println!("{}", rendered);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("failed to render configuration: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    logging::init_logging(&settings.app, &settings.observability);

    if let Some(e) = file_error {
        tracing::warn!(error = %e, "Config file skipped");
    }
    for diagnostic in &diagnostics {
        tracing::warn!(
            key = %diagnostic.key,
            value = %diagnostic.value,
            source = %diagnostic.source,
            reason = %diagnostic.reason,
            "Configuration value ignored"
        );
    }

    tracing::info!(
        app = %settings.app.name,
        version = %settings.app.version,
        env = %settings.app.env,
        "Configuration loaded"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to install metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = match App::new(settings, Arc::new(InMemoryProvider::new())).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize app");
            return ExitCode::FAILURE;
        }
    };

    match app.run().await {
        Ok(report) => {
            if !report.teardown.is_clean() {
                tracing::warn!(teardown = %report.teardown, "Some subsystems did not close cleanly");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, fatal = e.is_fatal(), "App stopped with error");
            ExitCode::FAILURE
        }
    }
}
