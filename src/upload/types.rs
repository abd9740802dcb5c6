use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of a tracked file. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        FileId(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the bytes of a raw file live
#[derive(Debug, Clone)]
pub enum FileContent {
    Memory(Arc<[u8]>),
    Path(PathBuf),
}

/// A file handed over by a selection surface (picker, drop zone, CLI).
///
/// Cloning is cheap: in-memory content is shared, path content is only a path.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub size: u64,
    /// MIME type as reported by the selection surface, if any
    pub mime_type: Option<String>,
    pub content: FileContent,
}

impl RawFile {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        RawFile {
            name: name.into(),
            size: data.len() as u64,
            mime_type: None,
            content: FileContent::Memory(data.into()),
        }
    }

    /// Build a raw file from a path on disk, reading its size from metadata.
    pub async fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(RawFile {
            name,
            size: metadata.len(),
            mime_type: None,
            content: FileContent::Path(path),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Same content under a different name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// File extension in lowercase, without the dot
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Ready,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Ready => "ready",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        };
        f.pad(s)
    }
}

/// Terminal failure of one upload, as reported by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("IO error: {0}")]
    Io(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Transport finished without a result")]
    Incomplete,
}

/// Tracked state of one file through its upload lifecycle.
///
/// Mutated only through the registry; every state change goes through one of
/// the transition methods below, which refuse to leave a terminal state.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub status: UploadStatus,
    pub percent: u8,
    pub response: Option<serde_json::Value>,
    pub error: Option<UploadError>,
    pub created_at: DateTime<Utc>,
    raw_file: RawFile,
}

impl FileRecord {
    pub fn new(raw_file: RawFile) -> Self {
        FileRecord {
            id: FileId::new(),
            name: raw_file.name.clone(),
            size: raw_file.size,
            status: UploadStatus::Ready,
            percent: 0,
            response: None,
            error: None,
            created_at: Utc::now(),
            raw_file,
        }
    }

    /// The file this record uploads (after any preflight transformation)
    pub fn raw_file(&self) -> &RawFile {
        &self.raw_file
    }

    /// Ready -> Uploading. Returns false if the record was not Ready.
    pub fn begin_upload(&mut self) -> bool {
        if self.status != UploadStatus::Ready {
            return false;
        }
        self.status = UploadStatus::Uploading;
        self.percent = 0;
        true
    }

    /// Uploading self-loop. Percent is clamped to 0..=99 and never moves
    /// backwards; 100 and above belong to the terminal transition.
    ///
    /// Returns true when the stored percent changed.
    pub fn record_progress(&mut self, percent: u8) -> bool {
        if self.status != UploadStatus::Uploading || percent >= 100 {
            return false;
        }
        let next = percent.max(self.percent);
        if next == self.percent {
            return false;
        }
        self.percent = next;
        true
    }

    /// Uploading -> Success
    pub fn complete(&mut self, response: serde_json::Value) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Success;
        self.percent = 100;
        self.response = Some(response);
        true
    }

    /// Uploading -> Error. Percent keeps its last value.
    pub fn fail(&mut self, error: UploadError) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Error;
        self.error = Some(error);
        true
    }
}

/// Lifecycle notification for one record
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Emitted after every committed mutation, including insertion
    Changed(FileRecord),
    Success {
        response: serde_json::Value,
        record: FileRecord,
    },
    Error {
        error: UploadError,
        record: FileRecord,
    },
    Removed(FileRecord),
}

impl UploadEvent {
    pub fn record(&self) -> &FileRecord {
        match self {
            UploadEvent::Changed(record) => record,
            UploadEvent::Success { record, .. } => record,
            UploadEvent::Error { record, .. } => record,
            UploadEvent::Removed(record) => record,
        }
    }

    pub fn file_id(&self) -> FileId {
        self.record().id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploading_record() -> FileRecord {
        let mut record = FileRecord::new(RawFile::from_bytes("a.txt", b"hello".to_vec()));
        assert!(record.begin_upload());
        record
    }

    #[test]
    fn test_new_record_is_ready() {
        let record = FileRecord::new(RawFile::from_bytes("a.txt", vec![0u8; 12]));
        assert_eq!(record.status, UploadStatus::Ready);
        assert_eq!(record.size, 12);
        assert_eq!(record.name, "a.txt");
        assert!(record.response.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = FileRecord::new(RawFile::from_bytes("a", Vec::<u8>::new()));
        let b = FileRecord::new(RawFile::from_bytes("a", Vec::<u8>::new()));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut record = uploading_record();
        assert!(record.record_progress(30));
        assert!(!record.record_progress(20));
        assert_eq!(record.percent, 30);
        assert!(!record.record_progress(100));
        assert_eq!(record.percent, 30);
        assert!(record.record_progress(99));
        assert_eq!(record.percent, 99);
    }

    #[test]
    fn test_progress_ignored_outside_uploading() {
        let mut record = FileRecord::new(RawFile::from_bytes("a", vec![1u8]));
        assert!(!record.record_progress(40));
        assert_eq!(record.percent, 0);
    }

    #[test]
    fn test_success_sets_full_percent() {
        let mut record = uploading_record();
        record.record_progress(70);
        assert!(record.complete(serde_json::json!({"ok": true})));
        assert_eq!(record.status, UploadStatus::Success);
        assert_eq!(record.percent, 100);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_error_keeps_percent() {
        let mut record = uploading_record();
        record.record_progress(10);
        assert!(record.fail(UploadError::Network("reset".into())));
        assert_eq!(record.status, UploadStatus::Error);
        assert_eq!(record.percent, 10);
        assert!(record.response.is_none());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut record = uploading_record();
        record.fail(UploadError::Incomplete);
        assert!(!record.complete(serde_json::Value::Null));
        assert!(!record.begin_upload());
        assert!(!record.record_progress(50));
        assert_eq!(record.status, UploadStatus::Error);
        assert_eq!(record.error, Some(UploadError::Incomplete));
    }

    #[test]
    fn test_extension() {
        assert_eq!(
            RawFile::from_bytes("Photo.JPG", Vec::<u8>::new()).extension().as_deref(),
            Some("jpg")
        );
        assert_eq!(RawFile::from_bytes(".bashrc", Vec::<u8>::new()).extension(), None);
        assert_eq!(RawFile::from_bytes("README", Vec::<u8>::new()).extension(), None);
    }
}
