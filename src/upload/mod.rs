// # Upload Module
//
// Concurrent multi-file upload orchestration:
//
// - **PreflightChain**: Optional accept/transform hooks run before a file is queued
// - **UploadRegistry**: Mutex-guarded list of file records, keyed updates only
// - **JobRunner**: Per-file state machine driving one upload to a terminal state
// - **Transport**: Multipart submission port (`HttpTransport` in production)
// - **UploadManager**: Accepts batches, spawns jobs, fans out events
//
// Public API:
// - `UploadManager`: Submit batches, remove records, list snapshots
// - `UploadEvent` / `UploadListener`: Lifecycle notifications
// - `BeforeUpload` / `PreflightDecision`: Preflight hooks

mod accept;
mod events;
mod job;
mod manager;
mod preflight;
mod printer;
mod registry;
mod transport;
mod types;

pub use accept::{select_files, AcceptFilter};
pub use events::{ListenerGuard, UploadEventHandle, UploadListener};
pub use manager::UploadManager;
pub use preflight::{accept_filter, max_size, BeforeUpload, PreflightChain, PreflightDecision};
pub use printer::{format_line, ProgressPrinter};
pub use registry::{UpdateOutcome, UploadRegistry};
pub use transport::{
    compute_percent, HttpTransport, Transport, TransportEvent, TransportRequest, TransportStream,
};
pub use types::{FileContent, FileId, FileRecord, RawFile, UploadError, UploadEvent, UploadStatus};
