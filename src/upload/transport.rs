use super::types::{FileContent, RawFile, UploadError};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};

/// Bytes handed to the request body per read
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Everything a transport needs to submit one file
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub file: RawFile,
    pub endpoint: String,
    pub field_name: String,
    pub extra_fields: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub with_credentials: bool,
}

/// Events reported by a transport for one submission.
///
/// Zero or more `Progress` events, then exactly one `Success` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Progress { percent: u8 },
    Success(serde_json::Value),
    Error(UploadError),
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportEvent::Progress { .. })
    }
}

pub type TransportStream = BoxStream<'static, TransportEvent>;

/// First read failure of a request body, kept so it is not reported as a
/// network error once reqwest wraps it
type ReadFailure = Arc<Mutex<Option<String>>>;

/// Performs multipart submissions (allows mocking for tests)
pub trait Transport: Send + Sync {
    /// Start the submission and return its event stream.
    /// The upload proceeds as the stream is polled or in the background;
    /// dropping the stream does not have to cancel it.
    fn submit(&self, request: TransportRequest) -> TransportStream;
}

/// Integer percentage of `loaded` over `total`. A zero total reports 0.
pub fn compute_percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((loaded as f64 / total as f64) * 100.0).min(100.0) as u8
}

/// Production transport: multipart/form-data POST over HTTP
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    credentialed_client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            credentialed_client: Client::builder().cookie_store(true).build()?,
        })
    }

    async fn run(self, request: TransportRequest, tx: mpsc::UnboundedSender<TransportEvent>) {
        let name = request.file.name.clone();
        let event = match self.send(request, tx.clone()).await {
            Ok(body) => TransportEvent::Success(body),
            Err(e) => {
                warn!("Upload of '{}' failed: {}", name, e);
                TransportEvent::Error(e)
            }
        };
        let _ = tx.send(event);
    }

    async fn send(
        &self,
        request: TransportRequest,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<serde_json::Value, UploadError> {
        let client = if request.with_credentials {
            &self.credentialed_client
        } else {
            &self.client
        };

        let total = request.file.size;
        let read_failure: ReadFailure = Arc::new(Mutex::new(None));
        let body = Body::wrap_stream(progress_body(&request.file, tx, read_failure.clone()));

        let mut part = Part::stream_with_length(body, total).file_name(request.file.name.clone());
        if let Some(mime) = &request.file.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| UploadError::InvalidRequest(format!("Invalid MIME type: {}", e)))?;
        }

        let mut form = Form::new();
        for (key, value) in &request.extra_fields {
            form = form.text(key.clone(), value.clone());
        }
        form = form.part(request.field_name.clone(), part);

        let mut builder = client.post(&request.endpoint).multipart(form);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        debug!(
            "Submitting '{}' ({} bytes) to {} as field '{}'",
            request.file.name, total, request.endpoint, request.field_name
        );

        let sent = builder.send().await;
        if let Some(message) = read_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(UploadError::Io(message));
        }
        let response = sent.map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(parse_response_body(&text))
    }
}

impl Transport for HttpTransport {
    fn submit(&self, request: TransportRequest) -> TransportStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run(request, tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

/// JSON when the body parses as JSON, otherwise the raw text as a JSON string
fn parse_response_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}

/// Body stream over the file's content that reports progress as it is read.
///
/// Progress is capped at 99: reaching 100 is the response's job. The first
/// read error is stored in `read_failure`.
fn progress_body(
    file: &RawFile,
    tx: mpsc::UnboundedSender<TransportEvent>,
    read_failure: ReadFailure,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = file.size;
    let loaded = Arc::new(AtomicU64::new(0));
    let last_percent = Arc::new(AtomicU8::new(0));

    content_chunks(file.content.clone()).map(move |chunk| {
        match &chunk {
            Ok(bytes) => {
                let now =
                    loaded.fetch_add(bytes.len() as u64, Ordering::SeqCst) + bytes.len() as u64;
                let percent = compute_percent(now, total).min(99);
                if percent > last_percent.swap(percent, Ordering::SeqCst) {
                    trace!("Sent {}/{} bytes ({}%)", now, total, percent);
                    let _ = tx.send(TransportEvent::Progress { percent });
                }
            }
            Err(e) => {
                let mut failure = read_failure.lock().unwrap_or_else(|e| e.into_inner());
                if failure.is_none() {
                    *failure = Some(e.to_string());
                }
            }
        }
        chunk
    })
}

fn content_chunks(
    content: FileContent,
) -> BoxStream<'static, Result<Vec<u8>, std::io::Error>> {
    match content {
        FileContent::Memory(data) => {
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> = data
                .chunks(UPLOAD_CHUNK_SIZE)
                .map(|c| Ok(c.to_vec()))
                .collect();
            stream::iter(chunks).boxed()
        }
        FileContent::Path(path) => stream::once(async move { tokio::fs::File::open(path).await })
            .flat_map(|opened| match opened {
                Ok(file) => read_chunks(BufReader::new(file)).boxed(),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .boxed(),
    }
}

fn read_chunks(
    reader: BufReader<tokio::fs::File>,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        match reader.read(&mut buffer).await {
            Ok(0) => None,
            Ok(n) => {
                buffer.truncate(n);
                Some((Ok(buffer), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
