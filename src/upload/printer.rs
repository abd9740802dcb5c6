use super::events::UploadListener;
use super::types::{FileRecord, UploadError, UploadStatus};
use std::io::Write;
use std::sync::Mutex;

const BAR_WIDTH: usize = 20;

/// Text renderer for the upload list: one line per change.
pub struct ProgressPrinter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ProgressPrinter {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

impl UploadListener for ProgressPrinter {
    fn on_changed(&self, record: &FileRecord) {
        self.write_line(&format_line(record));
    }

    fn on_error(&self, error: &UploadError, record: &FileRecord) {
        self.write_line(&format!("  {} failed: {}", record.name, error));
    }

    fn on_removed(&self, record: &FileRecord) {
        self.write_line(&format!("  {} removed", record.name));
    }
}

/// `[#####...............]  25% uploading  photo.png`
pub fn format_line(record: &FileRecord) -> String {
    let bar = match record.status {
        UploadStatus::Uploading | UploadStatus::Success => {
            let filled = (record.percent as usize * BAR_WIDTH) / 100;
            format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
        }
        UploadStatus::Ready => format!("[{}]", " ".repeat(BAR_WIDTH)),
        UploadStatus::Error => format!("[{}]", "x".repeat(BAR_WIDTH)),
    };
    format!(
        "{} {:>3}% {:<9} {}",
        bar, record.percent, record.status, record.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::types::{RawFile, UploadEvent};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_format_line() {
        let mut record = FileRecord::new(RawFile::from_bytes("photo.png", vec![0u8; 4]));
        assert_eq!(
            format_line(&record),
            format!("[{}]   0% ready     photo.png", " ".repeat(20))
        );

        record.begin_upload();
        record.record_progress(25);
        assert_eq!(
            format_line(&record),
            format!("[#####{}]  25% uploading photo.png", ".".repeat(15))
        );

        record.complete(serde_json::Value::Null);
        assert!(format_line(&record).starts_with(&format!("[{}] 100% success", "#".repeat(20))));
    }

    #[test]
    fn test_printer_writes_lines() {
        let buf = SharedBuf::default();
        let printer = ProgressPrinter::new(Box::new(buf.clone()));
        let mut record = FileRecord::new(RawFile::from_bytes("a.txt", vec![1u8]));
        record.begin_upload();
        record.fail(UploadError::Incomplete);

        printer.on_changed(&record);
        printer.on_error(&UploadError::Incomplete, &record);
        printer.on_removed(&record);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("error"));
        assert!(lines[1].contains("a.txt failed: Transport finished without a result"));
        assert_eq!(lines[2], "  a.txt removed");
    }

    #[test]
    fn test_printer_follows_event_stream() {
        let buf = SharedBuf::default();
        let printer = ProgressPrinter::new(Box::new(buf.clone()));
        let mut record = FileRecord::new(RawFile::from_bytes("b.txt", vec![1u8]));
        printer.on_event(&UploadEvent::Changed(record.clone()));
        record.begin_upload();
        record.complete(serde_json::json!({"ok": true}));
        printer.on_event(&UploadEvent::Changed(record.clone()));
        printer.on_event(&UploadEvent::Success {
            response: serde_json::json!({"ok": true}),
            record: record.clone(),
        });
        printer.on_event(&UploadEvent::Removed(record));

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("ready"));
        assert!(lines[1].contains("100% success"));
        assert_eq!(lines[2], "  b.txt removed");
    }
}
