//! stu-controller CLI: runs the Student controller against a manifest directory.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stu_controller::cache::Informer;
use stu_controller::config::Config;
use stu_controller::controller::{Controller, Enrollment, LogEffect};
use stu_controller::event::TracingRecorder;
use stu_controller::source::ManifestSource;
use stu_controller::telemetry::{TelemetryConfig, init_telemetry};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stu-controller", about = "Reconciles Student resources")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller until interrupted
    Serve {
        /// Number of parallel workers (overrides STU_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
        /// Directory of Student manifests (overrides STU_MANIFEST_DIR)
        #[arg(long)]
        manifests: Option<PathBuf>,
        /// TOML config file; environment is used when absent
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check every manifest in a directory without running the controller
    Validate {
        /// Directory of Student manifests
        #[arg(long, default_value = "manifests")]
        manifests: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            workers,
            manifests,
            config,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::from_env()?,
            };
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(dir) = manifests {
                config.manifest_dir = dir;
            }
            cmd_serve(config).await
        }
        Command::Validate { manifests } => cmd_validate(manifests).await,
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "stu-controller".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let controller_config = config.controller_config();
    let informer = Arc::new(Informer::new(controller_config.resync_period));
    let source = Arc::new(ManifestSource::new(
        &config.manifest_dir,
        config.poll_interval(),
    ));
    info!(dir = %config.manifest_dir.display(), "watching manifests");

    let recorder = Arc::new(TracingRecorder::new(controller_config.name.clone()));
    let controller = Controller::new(
        controller_config,
        informer.clone(),
        Arc::new(LogEffect),
        recorder,
    );

    let (stop_tx, stop_rx) = watch::channel(false);

    let informer_task = {
        let informer = Arc::clone(&informer);
        let stop = stop_rx.clone();
        tokio::spawn(async move { informer.run(source, stop).await })
    };

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received");
        stop_tx.send_replace(true);
    });

    controller.run(config.workers, stop_rx).await?;

    match informer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "informer exited with error"),
        Err(e) => warn!(error = %e, "informer task failed"),
    }
    Ok(())
}

async fn cmd_validate(dir: PathBuf) -> anyhow::Result<()> {
    let source = ManifestSource::new(&dir, std::time::Duration::from_secs(1));
    let students = source.scan().await?;

    if students.is_empty() {
        println!("No manifests found in {}.", dir.display());
        return Ok(());
    }

    let mut invalid = 0;
    for (key, student) in &students {
        match Enrollment::validate(key, &student.spec) {
            Ok(enrollment) => println!(
                "{:<40}  ok       {} @ {}",
                key, enrollment.name, enrollment.school
            ),
            Err(e) => {
                invalid += 1;
                println!("{key:<40}  invalid  {e}");
            }
        }
    }

    println!("\n{} manifest(s), {} invalid", students.len(), invalid);
    if invalid > 0 {
        anyhow::bail!("{invalid} manifest(s) failed validation");
    }
    Ok(())
}
