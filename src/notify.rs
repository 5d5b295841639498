//! User-facing notifications
//!
//! Batch outcomes and rejections are reported through a [`Notifier`]. The
//! default implementation writes them to the log.

use std::fmt;

/// Batch-level notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The submission was refused before any item was created
    BatchRejected { reason: String },
    /// Every item of the batch was uploaded and linked
    AllSucceeded { count: usize },
    /// At least one item ended in error
    SomeFailed { failed: usize, total: usize },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::BatchRejected { reason } => write!(f, "Upload rejected: {}", reason),
            Notification::AllSucceeded { count } => {
                write!(f, "{} file(s) uploaded successfully", count)
            }
            Notification::SomeFailed { failed, total } => {
                write!(f, "{} of {} file(s) failed to upload", failed, total)
            }
        }
    }
}

/// Receives batch notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Notifier that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::BatchRejected { .. } => {
                tracing::warn!(%notification, "upload batch rejected")
            }
            Notification::AllSucceeded { .. } => {
                tracing::info!(%notification, "upload batch finished")
            }
            Notification::SomeFailed { .. } => {
                tracing::warn!(%notification, "upload batch finished with failures")
            }
        }
    }
}
