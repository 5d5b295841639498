//! Upload module
//!
//! Attaches files to business records through a three-step protocol:
//! request an upload target, transfer the bytes, link the stored object to
//! its owning record. The [`queue::UploadQueue`] drives a batch of files
//! through those steps one at a time.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub mod item;
pub mod progress;
pub mod queue;
pub mod transfer;

pub use item::{UploadItem, UploadStatus};
pub use queue::{BatchReport, QueueError, QueuePhase, QueueSettings, QueueSnapshot, UploadQueue};
pub use transfer::HttpTransfer;

/// Message used when the backend answers without a usable upload target
pub const INCOMPLETE_TARGET_MESSAGE: &str = "upload target could not be generated";

/// Per-item upload errors
///
/// The variant records which protocol step failed; the message is what the
/// item shows to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("{0}")]
    TargetResolution(String),

    #[error("{0}")]
    Transfer(String),

    #[error("{0}")]
    Link(String),
}

impl UploadError {
    /// Short label of the failed step, used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::TargetResolution(_) => "target_resolution",
            UploadError::Transfer(_) => "transfer",
            UploadError::Link(_) => "link",
        }
    }
}

/// Kind of business record a file can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Job,
    JobStep,
    StockMovement,
    User,
    HrEmployeeDocument,
}

impl RefType {
    pub const ALL: [RefType; 5] = [
        RefType::Job,
        RefType::JobStep,
        RefType::StockMovement,
        RefType::User,
        RefType::HrEmployeeDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Job => "job",
            RefType::JobStep => "job_step",
            RefType::StockMovement => "stock_movement",
            RefType::User => "user",
            RefType::HrEmployeeDocument => "hr_employee_document",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unknown `ref_type` value
#[derive(Error, Debug)]
#[error("unknown ref_type '{0}': expected one of job, job_step, stock_movement, user, hr_employee_document")]
pub struct ParseRefTypeError(String);

impl FromStr for RefType {
    type Err = ParseRefTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RefType::ALL
            .into_iter()
            .find(|ref_type| ref_type.as_str() == s)
            .ok_or_else(|| ParseRefTypeError(s.to_string()))
    }
}

/// The business record uploaded files attach to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwningReference {
    pub ref_type: RefType,
    pub ref_id: String,
}

impl OwningReference {
    pub fn new(ref_type: RefType, ref_id: impl Into<String>) -> Self {
        Self {
            ref_type,
            ref_id: ref_id.into(),
        }
    }
}

/// A file selected for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    content_type: String,
    data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(name, content_type, Bytes::from(data)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Body of `POST /files/upload-url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTargetRequest {
    pub filename: String,
    pub content_type: String,
    pub ref_type: RefType,
    pub ref_id: String,
}

/// Write location issued by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub object_key: String,
    #[serde(default)]
    pub folder_path: String,
}

impl UploadTarget {
    /// A target is usable only when both the URL and the object key are set
    pub fn is_complete(&self) -> bool {
        !self.upload_url.trim().is_empty() && !self.object_key.trim().is_empty()
    }
}

/// Body of `POST /files/link`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRequest {
    pub object_key: String,
    pub filename: String,
    pub file_size: u64,
    pub content_type: String,
    pub ref_type: RefType,
    pub ref_id: String,
    pub folder_path: String,
}

/// Receives byte-level progress of a running transfer
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, bytes_sent: u64, total_bytes: u64);
}

/// Issues upload targets
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self, request: &UploadTargetRequest) -> Result<UploadTarget, UploadError>;
}

/// Moves file bytes to an upload target
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    async fn transfer(
        &self,
        target: &UploadTarget,
        file: &UploadFile,
        progress: &dyn ProgressObserver,
    ) -> Result<(), UploadError>;
}

/// Records which business entity an uploaded object belongs to
#[async_trait]
pub trait LinkRegistrar: Send + Sync {
    async fn link(&self, request: &LinkRequest) -> Result<(), UploadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_type_round_trips_through_str() {
        for ref_type in RefType::ALL {
            assert_eq!(ref_type.as_str().parse::<RefType>().unwrap(), ref_type);
        }
        assert!("invoice".parse::<RefType>().is_err());
    }

    #[test]
    fn test_ref_type_serializes_snake_case() {
        let json = serde_json::to_string(&RefType::HrEmployeeDocument).unwrap();
        assert_eq!(json, "\"hr_employee_document\"");
    }

    #[test]
    fn test_incomplete_target() {
        let target = UploadTarget {
            upload_url: "https://storage.local/put".into(),
            object_key: "  ".into(),
            folder_path: String::new(),
        };
        assert!(!target.is_complete());
        assert!(!UploadTarget::default().is_complete());
    }

    #[tokio::test]
    async fn test_upload_file_from_path_guesses_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proof.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "proof.pdf");
        assert_eq!(file.content_type(), "application/pdf");
        assert_eq!(file.size(), 8);
    }

    #[test]
    fn test_upload_error_kind() {
        assert_eq!(UploadError::Link("x".into()).kind(), "link");
        assert_eq!(UploadError::Transfer("x".into()).to_string(), "x");
    }
}
