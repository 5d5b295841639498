//! Reklam Uploadr - attach files to Reklam Pro records
//!
//! Uploads a batch of local files through the backend's upload protocol and
//! links them to one job, job step, stock movement, user or employee document.

use anyhow::Context;
use clap::Parser;
use reklam_uploadr::upload::{
    OwningReference, QueueError, QueueSnapshot, RefType, UploadFile, UploadQueue, UploadStatus,
};
use reklam_uploadr::{config::Config, metrics, telemetry, VERSION};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Reklam Uploadr - sequential attachment uploads for Reklam Pro
#[derive(Parser, Debug)]
#[command(name = "reklam-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Owning record type (job, job_step, stock_movement, user, hr_employee_document)
    #[arg(long)]
    ref_type: RefType,

    /// Owning record identifier
    #[arg(long)]
    ref_id: String,

    /// Print Prometheus metrics after the batch
    #[arg(long)]
    print_metrics: bool,

    /// Files to upload, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// Log status and progress changes of the visible batch
async fn render_progress(mut snapshots: watch::Receiver<QueueSnapshot>) {
    let mut seen: HashMap<Uuid, (UploadStatus, u8)> = HashMap::new();

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        for item in &snapshot.items {
            let current = (item.status(), item.progress());
            if seen.insert(item.id(), current) == Some(current) {
                continue;
            }
            info!(
                file = %item.file().name(),
                status = %item.status(),
                progress = item.progress(),
                "Upload progress"
            );
        }
    }
}

/// Report a batch-level rejection
fn rejected(error: &QueueError) -> ExitCode {
    match error {
        QueueError::EmptyBatch => eprintln!("no files to upload"),
        other => eprintln!("upload rejected: {}", other),
    }
    ExitCode::from(2)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    telemetry::init_subscriber(&config.logging, args.log_level.as_deref())?;

    info!("Starting Reklam Uploadr v{}", VERSION);
    info!("Loaded configuration from {:?}", args.config);

    let queue = UploadQueue::from_config(&config)?;

    // Reject an oversized selection before loading any file into memory
    if let Err(e) = queue.check_batch(args.files.len()) {
        let exit_code = rejected(&e);
        if args.print_metrics {
            println!("{}", metrics::gather_text()?);
        }
        return Ok(exit_code);
    }

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("failed to read {:?}", path))?;
        files.push(file);
    }

    let renderer = tokio::spawn(render_progress(queue.subscribe()));

    let owner = OwningReference::new(args.ref_type, args.ref_id);
    let outcome = queue.submit(files, &owner).await;
    renderer.abort();

    let exit_code = match outcome {
        Ok(report) => {
            for item in &report.items {
                match item.error() {
                    Some(error) => println!("{:<9} {}: {}", item.status(), item.file().name(), error),
                    None => println!("{:<9} {}", item.status(), item.file().name()),
                }
            }
            println!(
                "{} uploaded, {} failed in {:.1}s",
                report.succeeded,
                report.failed,
                report.duration.as_secs_f64()
            );
            if report.all_succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => rejected(&e),
    };

    if args.print_metrics {
        println!("{}", metrics::gather_text()?);
    }

    Ok(exit_code)
}
