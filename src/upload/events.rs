use super::types::{FileId, FileRecord, UploadError, UploadEvent};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

type SubscriptionId = u64;

/// Filter criteria for event subscriptions
#[derive(Debug, Clone)]
enum SubscriptionFilter {
    All,
    File { file_id: FileId },
}

impl SubscriptionFilter {
    fn matches(&self, event: &UploadEvent) -> bool {
        match self {
            SubscriptionFilter::All => true,
            SubscriptionFilter::File { file_id } => event.file_id() == *file_id,
        }
    }
}

struct Subscription {
    filter: SubscriptionFilter,
    tx: mpsc::UnboundedSender<UploadEvent>,
}

type Subscriptions = Arc<Mutex<HashMap<SubscriptionId, Subscription>>>;

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, HashMap<SubscriptionId, Subscription>> {
    subscriptions.lock().unwrap_or_else(|e| e.into_inner())
}

/// Receives lifecycle notifications. Every method defaults to a no-op so a
/// listener only implements the kinds it cares about.
pub trait UploadListener: Send + Sync {
    /// After any committed change to a record, including its insertion
    fn on_changed(&self, _record: &FileRecord) {}

    fn on_success(&self, _response: &serde_json::Value, _record: &FileRecord) {}

    fn on_error(&self, _error: &UploadError, _record: &FileRecord) {}

    fn on_removed(&self, _record: &FileRecord) {}

    /// Route `event` to the matching callback
    fn on_event(&self, event: &UploadEvent) {
        match event {
            UploadEvent::Changed(record) => self.on_changed(record),
            UploadEvent::Success { response, record } => self.on_success(response, record),
            UploadEvent::Error { error, record } => self.on_error(error, record),
            UploadEvent::Removed(record) => self.on_removed(record),
        }
    }
}

/// Keeps a listener subscribed. Dropping it unsubscribes too.
pub struct ListenerGuard {
    task: JoinHandle<()>,
}

impl ListenerGuard {
    pub fn unsubscribe(self) {}
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handle for subscribing to upload events.
///
/// Jobs publish into one unbounded channel; a single dispatcher task forwards
/// each event to every matching subscriber, so events of one record reach a
/// subscriber in the order they were published.
#[derive(Clone)]
pub struct UploadEventHandle {
    subscriptions: Subscriptions,
    next_id: Arc<AtomicU64>,
    runtime_handle: tokio::runtime::Handle,
}

impl UploadEventHandle {
    /// Create a new event handle and spawn background task to dispatch events
    pub fn new(
        mut events_rx: mpsc::UnboundedReceiver<UploadEvent>,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let subscriptions: Subscriptions = Arc::new(Mutex::new(HashMap::new()));
        let subscriptions_clone = subscriptions.clone();

        runtime_handle.spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let mut subs = lock(&subscriptions_clone);
                let mut to_remove = Vec::new();

                for (id, subscription) in subs.iter() {
                    if subscription.filter.matches(&event) {
                        // If send fails, receiver was dropped - mark for removal
                        if subscription.tx.send(event.clone()).is_err() {
                            to_remove.push(*id);
                        }
                    }
                }

                for id in to_remove {
                    debug!("Dropping closed subscription {}", id);
                    subs.remove(&id);
                }
            }
            info!("Event channel closed, exiting");
        });

        Self {
            subscriptions,
            next_id: Arc::new(AtomicU64::new(1)),
            runtime_handle,
        }
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscriptions).insert(id, Subscription { filter, tx });
        rx
    }

    /// Subscribe to every event of every record.
    /// Subscription is automatically removed when receiver is dropped
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.subscribe(SubscriptionFilter::All)
    }

    /// Subscribe to the events of one record.
    /// Subscription is automatically removed when receiver is dropped
    pub fn subscribe_file(&self, file_id: FileId) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.subscribe(SubscriptionFilter::File { file_id })
    }

    /// Forward every event to `listener` until the guard is dropped.
    /// Callbacks run on a dedicated task, never under a registry lock.
    pub fn add_listener(&self, listener: Arc<dyn UploadListener>) -> ListenerGuard {
        let mut rx = self.subscribe_all();
        let task = self.runtime_handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                listener.on_event(&event);
            }
        });
        ListenerGuard { task }
    }
}
