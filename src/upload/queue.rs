//! Upload queue controller
//!
//! Drives a batch of files through the upload protocol, one file at a time.
//!
//! # Flow
//!
//! 1. Validate the submission (enabled, non-empty, within `max_files`, no batch in flight)
//! 2. Create one `pending` item per file, in selection order
//! 3. For each item: resolve target, transfer bytes, link to the owning record
//! 4. Notify the batch outcome; clear a fully successful batch after a delay
//!
//! A failing item never aborts the batch. Its error is kept on the item and
//! the queue moves on to the next one.
//!
//! Queue state lives in a [`tokio::sync::watch`] channel. Every mutation is a
//! single check-and-modify on that channel, so front ends can subscribe to
//! snapshots while `submit` runs.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use reklam_uploadr::config::Config;
//! use reklam_uploadr::upload::{OwningReference, RefType, UploadFile, UploadQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let queue = UploadQueue::from_config(&config)?;
//!
//! let files = vec![UploadFile::new("proof.pdf", "application/pdf", Bytes::from("%PDF"))];
//! let report = queue
//!     .submit(files, &OwningReference::new(RefType::Job, "42"))
//!     .await?;
//! println!("all succeeded: {}", report.all_succeeded);
//! # Ok(())
//! # }
//! ```

use super::progress::{transfer_percent, TARGET_ACQUIRED_PROGRESS, TRANSFER_COMPLETE_PROGRESS};
use super::{
    HttpTransfer, LinkRegistrar, LinkRequest, OwningReference, ProgressObserver, TargetResolver,
    TransferExecutor, UploadError, UploadFile, UploadItem, UploadStatus, UploadTargetRequest,
    INCOMPLETE_TARGET_MESSAGE,
};
use crate::api::{ApiClient, ApiError};
use crate::config::{Config, UploadConfig};
use crate::metrics;
use crate::notify::{LogNotifier, Notification, Notifier};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Batch-level rejections. No items are created when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("uploads are disabled")]
    Disabled,

    #[error("no files selected")]
    EmptyBatch,

    #[error("too many files: {count} selected, at most {max} allowed")]
    TooManyFiles { count: usize, max: usize },

    #[error("an upload batch is already in progress")]
    AlreadyUploading,
}

/// Process-wide state of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Idle,
    Uploading,
}

/// Observable queue state
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub phase: QueuePhase,
    /// Identifier of the visible batch, if any
    pub batch_id: Option<Uuid>,
    pub items: Vec<UploadItem>,
}

impl QueueSnapshot {
    fn empty() -> Self {
        Self {
            phase: QueuePhase::Idle,
            batch_id: None,
            items: Vec::new(),
        }
    }

    pub fn item(&self, id: Uuid) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn item_mut(&mut self, id: Uuid) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|item| item.id() == id)
    }
}

/// Outcome of a processed batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    /// Items as they stood when the batch finished
    pub items: Vec<UploadItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub all_succeeded: bool,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl BatchReport {
    fn from_items(batch_id: Uuid, items: &[UploadItem], duration: Duration) -> Self {
        let succeeded = items
            .iter()
            .filter(|item| item.status() == UploadStatus::Success)
            .count();
        let failed = items
            .iter()
            .filter(|item| item.status() == UploadStatus::Error)
            .count();

        Self {
            batch_id,
            items: items.to_vec(),
            succeeded,
            failed,
            all_succeeded: items
                .iter()
                .all(|item| item.status() == UploadStatus::Success),
            finished_at: Utc::now(),
            duration,
        }
    }
}

/// Queue policy
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_files: usize,
    pub disabled: bool,
    pub clear_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for QueueSettings {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_files: config.max_files,
            disabled: config.disabled,
            clear_delay: config.clear_delay(),
        }
    }
}

type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Builder for [`UploadQueue`]
pub struct UploadQueueBuilder {
    resolver: Arc<dyn TargetResolver>,
    transfer: Arc<dyn TransferExecutor>,
    registrar: Arc<dyn LinkRegistrar>,
    notifier: Arc<dyn Notifier>,
    on_complete: Option<CompletionCallback>,
    settings: QueueSettings,
}

impl UploadQueueBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Called once after a batch in which every item succeeded
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn settings(mut self, settings: QueueSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> UploadQueue {
        let (state, _) = watch::channel(QueueSnapshot::empty());
        UploadQueue {
            resolver: self.resolver,
            transfer: self.transfer,
            registrar: self.registrar,
            notifier: self.notifier,
            on_complete: self.on_complete,
            settings: self.settings,
            state: Arc::new(state),
        }
    }
}

/// Sequential upload queue
pub struct UploadQueue {
    resolver: Arc<dyn TargetResolver>,
    transfer: Arc<dyn TransferExecutor>,
    registrar: Arc<dyn LinkRegistrar>,
    notifier: Arc<dyn Notifier>,
    on_complete: Option<CompletionCallback>,
    settings: QueueSettings,
    state: Arc<watch::Sender<QueueSnapshot>>,
}

impl UploadQueue {
    pub fn builder(
        resolver: Arc<dyn TargetResolver>,
        transfer: Arc<dyn TransferExecutor>,
        registrar: Arc<dyn LinkRegistrar>,
    ) -> UploadQueueBuilder {
        UploadQueueBuilder {
            resolver,
            transfer,
            registrar,
            notifier: Arc::new(LogNotifier),
            on_complete: None,
            settings: QueueSettings::default(),
        }
    }

    /// Create a queue talking to the configured backend, logging notifications
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::new(&config.api)?);
        let transfer = HttpTransfer::new(
            config.api.timeout(),
            config.upload.transfer_timeout(),
            config.upload.chunk_size,
        )?;

        Ok(Self::builder(api.clone(), Arc::new(transfer), api)
            .settings(QueueSettings::from(&config.upload))
            .build())
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Current queue state
    pub fn snapshot(&self) -> QueueSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribe to queue state changes
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.state.subscribe()
    }

    pub fn is_uploading(&self) -> bool {
        self.state.borrow().phase == QueuePhase::Uploading
    }

    /// Upload a batch of files for `owner`.
    ///
    /// Files are processed strictly in order and one at a time. Per-item
    /// failures end up on the items of the returned report; only batch-level
    /// rejections are returned as errors.
    #[tracing::instrument(
        name = "upload.batch",
        skip(self, files, owner),
        fields(
            ref_type = %owner.ref_type,
            ref_id = %owner.ref_id,
            batch.size = files.len(),
            batch.id = tracing::field::Empty
        ),
        err
    )]
    pub async fn submit(
        &self,
        files: Vec<UploadFile>,
        owner: &OwningReference,
    ) -> Result<BatchReport, QueueError> {
        self.check_batch(files.len())?;

        let items: Vec<UploadItem> = files.into_iter().map(UploadItem::new).collect();
        let ids: Vec<Uuid> = items.iter().map(UploadItem::id).collect();
        let batch_id = Uuid::new_v4();

        let accepted = self.state.send_if_modified(|state| {
            if state.phase == QueuePhase::Uploading {
                return false;
            }
            state.phase = QueuePhase::Uploading;
            state.batch_id = Some(batch_id);
            state.items = items;
            true
        });
        if !accepted {
            return Err(self.reject(QueueError::AlreadyUploading));
        }

        tracing::Span::current().record("batch.id", tracing::field::display(batch_id));
        tracing::info!(items = ids.len(), "Upload batch started");

        let start_time = Instant::now();
        for id in ids {
            self.process_item(id, owner).await;
        }

        // Computed from the final item list, after the last update landed
        let mut finished = Vec::new();
        self.state.send_modify(|state| {
            state.phase = QueuePhase::Idle;
            finished = state.items.clone();
        });
        let report = BatchReport::from_items(batch_id, &finished, start_time.elapsed());

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration.as_millis(),
            "Upload batch finished"
        );

        if report.all_succeeded {
            metrics::record_batch("all_succeeded");
            self.notifier.notify(&Notification::AllSucceeded {
                count: report.succeeded,
            });
            if let Some(on_complete) = &self.on_complete {
                on_complete();
            }
            self.schedule_clear(batch_id);
        } else {
            metrics::record_batch("some_failed");
            self.notifier.notify(&Notification::SomeFailed {
                failed: report.failed,
                total: report.items.len(),
            });
        }

        Ok(report)
    }

    /// Apply the batch-level policy to a selection of `count` files.
    ///
    /// `submit` runs the same checks; callers use this to reject a selection
    /// before reading any file. Rejections other than an empty selection are
    /// notified.
    pub fn check_batch(&self, count: usize) -> Result<(), QueueError> {
        if count == 0 {
            return Err(QueueError::EmptyBatch);
        }
        if self.settings.disabled {
            return Err(self.reject(QueueError::Disabled));
        }
        if count > self.settings.max_files {
            return Err(self.reject(QueueError::TooManyFiles {
                count,
                max: self.settings.max_files,
            }));
        }
        Ok(())
    }

    /// Discard an item that has not started or that failed.
    ///
    /// Returns false, leaving the batch untouched, for unknown ids and for
    /// items that are uploading or already succeeded.
    pub fn remove(&self, id: Uuid) -> bool {
        self.state.send_if_modified(|state| {
            match state.items.iter().position(|item| item.id() == id) {
                Some(index) if state.items[index].is_removable() => {
                    state.items.remove(index);
                    true
                }
                _ => false,
            }
        })
    }

    /// Drop the visible batch. Ignored while a batch is uploading.
    pub fn clear(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.phase == QueuePhase::Uploading || state.batch_id.is_none() {
                return false;
            }
            state.batch_id = None;
            state.items.clear();
            true
        })
    }

    fn reject(&self, error: QueueError) -> QueueError {
        tracing::warn!(error = %error, "Upload batch rejected");
        metrics::record_batch("rejected");
        self.notifier.notify(&Notification::BatchRejected {
            reason: error.to_string(),
        });
        error
    }

    /// Clear a fully successful batch after the configured delay, unless a
    /// newer batch replaced it in the meantime.
    fn schedule_clear(&self, batch_id: Uuid) {
        let state = Arc::clone(&self.state);
        let delay = self.settings.clear_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let cleared = state.send_if_modified(|state| {
                if state.phase != QueuePhase::Idle || state.batch_id != Some(batch_id) {
                    return false;
                }
                state.batch_id = None;
                state.items.clear();
                true
            });
            if cleared {
                tracing::debug!(batch.id = %batch_id, "Cleared finished upload batch");
            }
        });
    }

    fn update_item<F>(&self, id: Uuid, update: F) -> bool
    where
        F: FnOnce(&mut UploadItem) -> bool,
    {
        self.state
            .send_if_modified(|state| state.item_mut(id).map(update).unwrap_or(false))
    }

    #[tracing::instrument(name = "upload.item", skip(self, id, owner), fields(item.id = %id))]
    async fn process_item(&self, id: Uuid, owner: &OwningReference) {
        let mut file = None;
        self.update_item(id, |item| {
            let started = item.start();
            if started {
                file = Some(item.file().clone());
            }
            started
        });
        let Some(file) = file else {
            tracing::debug!("Item removed before upload started, skipping");
            return;
        };

        match self.run_protocol(id, &file, owner).await {
            Ok(()) => {
                self.update_item(id, UploadItem::succeed);
                metrics::record_upload_success(owner.ref_type.as_str(), file.size());
                tracing::info!(
                    file.name = %file.name(),
                    file.size = file.size(),
                    "Upload item succeeded"
                );
            }
            Err(e) => {
                let message = e.to_string();
                self.update_item(id, |item| item.fail(message));
                metrics::record_upload_failure(owner.ref_type.as_str(), e.kind());
                tracing::warn!(
                    file.name = %file.name(),
                    step = e.kind(),
                    error = %e,
                    "Upload item failed"
                );
            }
        }
    }

    async fn run_protocol(
        &self,
        id: Uuid,
        file: &UploadFile,
        owner: &OwningReference,
    ) -> Result<(), UploadError> {
        // Step 1: upload target
        let request = UploadTargetRequest {
            filename: file.name().to_string(),
            content_type: file.content_type().to_string(),
            ref_type: owner.ref_type,
            ref_id: owner.ref_id.clone(),
        };
        let step_start = Instant::now();
        let target = self.resolver.resolve(&request).await;
        metrics::record_step_duration("target_resolution", step_start.elapsed().as_secs_f64());
        let target = target?;
        if !target.is_complete() {
            return Err(UploadError::TargetResolution(
                INCOMPLETE_TARGET_MESSAGE.to_string(),
            ));
        }
        self.update_item(id, |item| item.advance(TARGET_ACQUIRED_PROGRESS));

        // Step 2: bytes
        let observer = ItemProgress {
            state: self.state.as_ref(),
            id,
        };
        let step_start = Instant::now();
        let transferred = self.transfer.transfer(&target, file, &observer).await;
        metrics::record_step_duration("transfer", step_start.elapsed().as_secs_f64());
        transferred?;
        self.update_item(id, |item| item.advance(TRANSFER_COMPLETE_PROGRESS));

        // Step 3: link
        let link = LinkRequest {
            object_key: target.object_key.clone(),
            filename: file.name().to_string(),
            file_size: file.size(),
            content_type: file.content_type().to_string(),
            ref_type: owner.ref_type,
            ref_id: owner.ref_id.clone(),
            folder_path: target.folder_path.clone(),
        };
        let step_start = Instant::now();
        let linked = self.registrar.link(&link).await;
        metrics::record_step_duration("link", step_start.elapsed().as_secs_f64());
        if linked.is_err() {
            tracing::warn!(
                object_key = %target.object_key,
                "Object stored but not linked; it stays orphaned"
            );
        }
        linked
    }
}

/// Feeds transfer progress of one item into the queue state
struct ItemProgress<'a> {
    state: &'a watch::Sender<QueueSnapshot>,
    id: Uuid,
}

impl ProgressObserver for ItemProgress<'_> {
    fn on_progress(&self, bytes_sent: u64, total_bytes: u64) {
        let percent = transfer_percent(bytes_sent, total_bytes);
        self.state.send_if_modified(|state| {
            state
                .item_mut(self.id)
                .map(|item| item.advance(percent))
                .unwrap_or(false)
        });
    }
}
