// # Upload Job
//
// Drives one accepted file from Ready to a terminal state:
//
//   Ready ──submit──▶ Uploading ──progress──▶ Uploading
//                         │
//                         ├──success──▶ Success (percent = 100)
//                         └──failure──▶ Error   (percent kept)
//
// Every committed mutation publishes a Changed event before the registry lock
// is released, so events of a record never trail its removal. Once the record is
// removed from the registry the job keeps draining the transport but its
// updates are dropped and nothing more is published.

use super::registry::{UpdateOutcome, UploadRegistry};
use super::transport::{Transport, TransportEvent, TransportRequest};
use super::types::{FileId, FileRecord, UploadError, UploadEvent, UploadStatus};
use crate::config::UploadConfig;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, trace, warn};

/// Shared dependencies of every job spawned by one manager
#[derive(Clone)]
pub(super) struct JobContext {
    pub registry: UploadRegistry,
    pub transport: Arc<dyn Transport>,
    pub config: Arc<UploadConfig>,
    pub events_tx: mpsc::UnboundedSender<UploadEvent>,
    pub limiter: Option<Arc<Semaphore>>,
}

pub(super) struct JobRunner {
    ctx: JobContext,
    file_id: FileId,
}

impl JobRunner {
    /// Insert the record as Ready and publish it.
    ///
    /// The record is visible in the registry before this returns, and so
    /// before any transport call is made.
    pub fn enqueue(ctx: JobContext, record: FileRecord) -> Option<Self> {
        let file_id = record.id;
        let events_tx = ctx.events_tx.clone();
        let snapshot = ctx.registry.insert_then(record, |r| {
            let _ = events_tx.send(UploadEvent::Changed(r.clone()));
        })?;
        debug!("Queued '{}' as {}", snapshot.name, file_id);
        Some(JobRunner { ctx, file_id })
    }

    pub async fn run(self) {
        let _permit = match &self.ctx.limiter {
            Some(limiter) => match limiter.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                // Semaphore closed: the manager is gone, leave the record Ready
                Err(_) => return,
            },
            None => None,
        };

        let started = match self.ctx.registry.update_then(
            self.file_id,
            FileRecord::begin_upload,
            |r| self.publish_changed(r),
        ) {
            UpdateOutcome::Applied(record) => record,
            UpdateOutcome::Unchanged => {
                warn!("Record {} was not Ready, skipping upload", self.file_id);
                return;
            }
            UpdateOutcome::Missing => {
                debug!("Record {} removed before upload started", self.file_id);
                return;
            }
        };

        let request = TransportRequest {
            file: started.raw_file().clone(),
            endpoint: self.ctx.config.endpoint.clone(),
            field_name: self.ctx.config.field_name.clone(),
            extra_fields: self.ctx.config.extra_fields.clone(),
            headers: self.ctx.config.headers.clone(),
            with_credentials: self.ctx.config.with_credentials,
        };
        info!("Uploading '{}' ({} bytes)", started.name, started.size);

        let mut events = self.ctx.transport.submit(request);

        while let Some(event) = events.next().await {
            match event {
                TransportEvent::Progress { percent } => self.on_progress(percent),
                TransportEvent::Success(response) => {
                    self.on_success(response);
                    return;
                }
                TransportEvent::Error(error) => {
                    self.on_error(error);
                    return;
                }
            }
        }

        // Stream ended without a terminal event
        self.on_error(UploadError::Incomplete);
    }

    /// Called under the registry lock, so events follow commit order
    fn publish_changed(&self, record: &FileRecord) {
        let _ = self.ctx.events_tx.send(UploadEvent::Changed(record.clone()));
    }

    fn on_progress(&self, percent: u8) {
        match self.ctx.registry.update_then(
            self.file_id,
            |r| r.record_progress(percent),
            |r| self.publish_changed(r),
        ) {
            UpdateOutcome::Applied(record) => {
                trace!("'{}' at {}%", record.name, record.percent);
            }
            UpdateOutcome::Unchanged => {}
            UpdateOutcome::Missing => {
                trace!("Progress for removed record {} ignored", self.file_id);
            }
        }
    }

    fn on_success(&self, response: serde_json::Value) {
        let stored = response.clone();
        match self.ctx.registry.update_then(
            self.file_id,
            move |r| r.complete(stored),
            |r| {
                self.publish_changed(r);
                let _ = self.ctx.events_tx.send(UploadEvent::Success {
                    response,
                    record: r.clone(),
                });
            },
        ) {
            UpdateOutcome::Applied(record) => {
                info!("Uploaded '{}'", record.name);
            }
            UpdateOutcome::Unchanged => self.log_unapplied("success"),
            UpdateOutcome::Missing => {
                debug!("Record {} removed before upload finished", self.file_id);
            }
        }
    }

    fn on_error(&self, error: UploadError) {
        let stored = error.clone();
        let reported = error.clone();
        match self.ctx.registry.update_then(
            self.file_id,
            move |r| r.fail(stored),
            |r| {
                self.publish_changed(r);
                let _ = self.ctx.events_tx.send(UploadEvent::Error {
                    error: reported,
                    record: r.clone(),
                });
            },
        ) {
            UpdateOutcome::Applied(record) => {
                warn!("Upload of '{}' failed: {}", record.name, error);
            }
            UpdateOutcome::Unchanged => self.log_unapplied("error"),
            UpdateOutcome::Missing => {
                debug!("Record {} removed before upload failed", self.file_id);
            }
        }
    }

    fn log_unapplied(&self, outcome: &str) {
        let status = self
            .ctx
            .registry
            .get(self.file_id)
            .map(|r| r.status)
            .unwrap_or(UploadStatus::Ready);
        warn!(
            "Ignoring {} for {}: record is {}",
            outcome, self.file_id, status
        );
    }
}
