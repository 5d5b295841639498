//! Reklam Uploadr Library
//!
//! Sequential attachment upload queue for the Reklam Pro business backend.
//!
//! # Features
//!
//! - **Three-step protocol**: upload target, presigned `PUT`, metadata link
//! - **Sequential batches**: one file at a time, in selection order
//! - **Failure isolation**: a failing file never aborts its batch
//! - **Observable state**: per-item status and progress over a watch channel
//!
//! # Example
//!
//! ```no_run
//! use reklam_uploadr::config::Config;
//! use reklam_uploadr::upload::{OwningReference, RefType, UploadFile, UploadQueue};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let queue = UploadQueue::from_config(&config)?;
//!
//!     let file = UploadFile::from_path("artwork.pdf").await?;
//!     let report = queue
//!         .submit(vec![file], &OwningReference::new(RefType::Job, "1042"))
//!         .await?;
//!     println!("{} uploaded, {} failed", report.succeeded, report.failed);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod metrics;
pub mod notify;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::UploadQueue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
