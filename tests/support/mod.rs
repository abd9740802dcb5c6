pub mod scripted_transport;

pub use scripted_transport::ScriptedTransport;

use hoist::upload::{FileId, UploadEvent, UploadManager, UploadStatus};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Upper bound for any single wait in a test
pub const WAIT: Duration = Duration::from_secs(5);

/// Receive events until `count` terminal events (Success or Error) arrived.
/// Returns every event seen, in order.
pub async fn collect_until_terminal(
    rx: &mut UnboundedReceiver<UploadEvent>,
    count: usize,
) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    let mut terminal = 0;
    tokio::time::timeout(WAIT, async {
        while terminal < count {
            let event = rx.recv().await.expect("event channel closed");
            if matches!(event, UploadEvent::Success { .. } | UploadEvent::Error { .. }) {
                terminal += 1;
            }
            events.push(event);
        }
    })
    .await
    .expect("timed out waiting for terminal events");
    events
}

/// Poll until the record reaches `status`
pub async fn wait_for_status(manager: &UploadManager, id: FileId, status: UploadStatus) {
    tokio::time::timeout(WAIT, async {
        loop {
            if manager.get(id).map(|r| r.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("timed out waiting for status");
}

/// Poll until the registry holds at least `count` records
pub async fn wait_for_records(manager: &UploadManager, count: usize) {
    tokio::time::timeout(WAIT, async {
        while manager.list_jobs().len() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("timed out waiting for records");
}
