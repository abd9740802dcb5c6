use super::events::{ListenerGuard, UploadEventHandle, UploadListener};
use super::job::{JobContext, JobRunner};
use super::preflight::PreflightChain;
use super::registry::UploadRegistry;
use super::transport::Transport;
use super::types::{FileId, FileRecord, RawFile, UploadEvent};
use crate::config::UploadConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Public entry point: accepts file batches, runs preflight, spawns one job
/// per accepted file and re-emits lifecycle events.
///
/// Cloning yields another handle onto the same registry and subscribers.
#[derive(Clone)]
pub struct UploadManager {
    ctx: JobContext,
    preflight: PreflightChain,
    event_handle: UploadEventHandle,
    runtime_handle: tokio::runtime::Handle,
}

impl UploadManager {
    /// Create a manager with an empty registry, spawning its event dispatcher
    /// on `runtime_handle`.
    pub fn new(
        config: UploadConfig,
        transport: Arc<dyn Transport>,
        preflight: PreflightChain,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        Self::with_initial(config, transport, preflight, runtime_handle, Vec::new())
    }

    /// Create a manager whose registry starts with `records`, in order
    pub fn with_initial(
        config: UploadConfig,
        transport: Arc<dyn Transport>,
        preflight: PreflightChain,
        runtime_handle: tokio::runtime::Handle,
        records: Vec<FileRecord>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let event_handle = UploadEventHandle::new(events_rx, runtime_handle.clone());

        // A cap of 0 would starve every job; UploadConfig::validate rejects
        // it, and a config that skipped validation is clamped to 1.
        let limiter = config.max_concurrent_uploads.map(|max| {
            if max == 0 {
                warn!("max_concurrent_uploads is 0, running one upload at a time");
            }
            Arc::new(Semaphore::new(max.max(1)))
        });

        let ctx = JobContext {
            registry: UploadRegistry::with_records(records),
            transport,
            config: Arc::new(config),
            events_tx,
            limiter,
        };

        Self {
            ctx,
            preflight,
            event_handle,
            runtime_handle,
        }
    }

    /// Schedule every file in `files` and return immediately.
    ///
    /// Without preflight hooks every file is recorded as Ready before this
    /// returns, prepended in batch order so the last file ends up first.
    /// With hooks, each file gets its own task and is recorded once its chain
    /// resolves, in resolution order. Either way uploads run in their own
    /// tasks and files do not wait on each other. Returns the number of files
    /// scheduled.
    pub fn submit_batch(&self, files: Vec<RawFile>) -> usize {
        let count = files.len();
        info!("Submitting batch of {} file(s)", count);

        if self.preflight.is_empty() {
            for file in files {
                if let Some(job) = JobRunner::enqueue(self.ctx.clone(), FileRecord::new(file)) {
                    self.runtime_handle.spawn(job.run());
                }
            }
            return count;
        }

        for file in files {
            let ctx = self.ctx.clone();
            let preflight = self.preflight.clone();

            self.runtime_handle.spawn(async move {
                let name = file.name.clone();
                let Some(accepted) = preflight.run(file).await else {
                    debug!("Skipping '{}': rejected by preflight", name);
                    return;
                };

                if let Some(job) = JobRunner::enqueue(ctx, FileRecord::new(accepted)) {
                    job.run().await;
                }
            });
        }

        count
    }

    /// Remove a record. Idempotent: an unknown id is a no-op.
    ///
    /// An upload still in flight keeps running; its later updates are dropped.
    pub fn remove(&self, id: FileId) -> Option<FileRecord> {
        let events_tx = &self.ctx.events_tx;
        let removed = self.ctx.registry.remove_then(id, |r| {
            let _ = events_tx.send(UploadEvent::Removed(r.clone()));
        })?;
        info!("Removed '{}' ({})", removed.name, removed.status);
        Some(removed)
    }

    /// Consistent copy of every record, most recent first
    pub fn list_jobs(&self) -> Vec<FileRecord> {
        self.ctx.registry.snapshot()
    }

    pub fn get(&self, id: FileId) -> Option<FileRecord> {
        self.ctx.registry.get(id)
    }

    /// Read view of the live registry
    pub fn registry(&self) -> &UploadRegistry {
        &self.ctx.registry
    }

    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.event_handle.subscribe_all()
    }

    pub fn subscribe_file(&self, id: FileId) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.event_handle.subscribe_file(id)
    }

    pub fn add_listener(&self, listener: Arc<dyn UploadListener>) -> ListenerGuard {
        self.event_handle.add_listener(listener)
    }
}
