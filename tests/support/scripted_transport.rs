use hoist::upload::{Transport, TransportEvent, TransportRequest, TransportStream};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::WAIT;

type Probe = Box<dyn Fn(&TransportRequest) + Send + Sync>;

/// In-memory transport for tests.
///
/// Files with a script get its events replayed immediately and the stream
/// closes after the last one. Files without a script stay open until the test
/// drives them through `sender`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Vec<TransportEvent>>>,
    open: Mutex<HashMap<String, mpsc::UnboundedSender<TransportEvent>>>,
    requests: Mutex<Vec<TransportRequest>>,
    probe: Option<Probe>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `events` for the file called `name`
    pub fn with_script(self, name: &str, events: Vec<TransportEvent>) -> Self {
        self.scripts.lock().unwrap().insert(name.to_string(), events);
        self
    }

    /// Run `probe` at the start of every submission
    pub fn with_probe(mut self, probe: impl Fn(&TransportRequest) + Send + Sync + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    /// Every request submitted so far, in submission order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn submitted(&self, name: &str) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.file.name == name)
    }

    /// Wait until `name` was submitted and return the sender driving its stream
    pub async fn sender(&self, name: &str) -> mpsc::UnboundedSender<TransportEvent> {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(tx) = self.open.lock().unwrap().get(name) {
                    return tx.clone();
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("file was never submitted")
    }

    /// Close the stream of `name` without a terminal event
    pub fn hang_up(&self, name: &str) {
        self.open.lock().unwrap().remove(name);
    }
}

impl Transport for ScriptedTransport {
    fn submit(&self, request: TransportRequest) -> TransportStream {
        if let Some(probe) = &self.probe {
            probe(&request);
        }

        let name = request.file.name.clone();
        self.requests.lock().unwrap().push(request);

        let (tx, rx) = mpsc::unbounded_channel();
        match self.scripts.lock().unwrap().remove(&name) {
            Some(events) => {
                for event in events {
                    let _ = tx.send(event);
                }
            }
            None => {
                self.open.lock().unwrap().insert(name, tx);
            }
        }

        UnboundedReceiverStream::new(rx).boxed()
    }
}
