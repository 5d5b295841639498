//! Upload item state
//!
//! One file's journey through the upload protocol. Transitions are only
//! reachable from the queue, which keeps the item invariants intact:
//!
//! - `error` is set iff the status is [`UploadStatus::Error`]
//! - progress is 100 iff the status is [`UploadStatus::Success`]
//! - progress never decreases while uploading

use super::progress::{COMPLETE_PROGRESS, TRANSFER_COMPLETE_PROGRESS};
use super::UploadFile;
use std::fmt;
use uuid::Uuid;

/// Status of a single upload item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One file in a batch
#[derive(Debug, Clone)]
pub struct UploadItem {
    id: Uuid,
    file: UploadFile,
    status: UploadStatus,
    progress: u8,
    error: Option<String>,
}

impl UploadItem {
    pub(crate) fn new(file: UploadFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            status: UploadStatus::Pending,
            progress: 0,
            error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Items can be discarded before they start or after they failed
    pub fn is_removable(&self) -> bool {
        matches!(self.status, UploadStatus::Pending | UploadStatus::Error)
    }

    /// `pending -> uploading`. Returns false for any other source status.
    pub(crate) fn start(&mut self) -> bool {
        if self.status != UploadStatus::Pending {
            return false;
        }
        self.status = UploadStatus::Uploading;
        self.progress = 0;
        true
    }

    /// Raise progress while uploading, capped below completion.
    /// Returns true when the stored value changed.
    pub(crate) fn advance(&mut self, percent: u8) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        let percent = percent.min(TRANSFER_COMPLETE_PROGRESS);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    /// `uploading -> success`
    pub(crate) fn succeed(&mut self) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Success;
        self.progress = COMPLETE_PROGRESS;
        self.error = None;
        true
    }

    /// `uploading -> error`
    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Error;
        self.progress = 0;
        self.error = Some(message.into());
        true
    }
}
