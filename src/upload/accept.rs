use super::types::RawFile;
use serde::{Deserialize, Serialize};

/// One entry of an `accept` list
#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptRule {
    /// `.png`
    Extension(String),
    /// `image/*`
    MimeWildcard(String),
    /// `image/png`
    Mime(String),
}

/// File-type filter in the format of an HTML `accept` attribute:
/// comma-separated extensions (`.png`) and MIME types (`image/png`, `image/*`).
///
/// Advisory: applied by the selection surface when it picks files, never
/// re-checked by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AcceptFilter {
    source: String,
    rules: Vec<AcceptRule>,
}

impl AcceptFilter {
    pub fn parse(source: &str) -> Self {
        let rules = source
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .filter_map(|entry| {
                if let Some(ext) = entry.strip_prefix('.') {
                    Some(AcceptRule::Extension(ext.to_string()))
                } else if let Some(major) = entry.strip_suffix("/*") {
                    Some(AcceptRule::MimeWildcard(major.to_string()))
                } else if entry.contains('/') {
                    Some(AcceptRule::Mime(entry))
                } else {
                    None
                }
            })
            .collect();

        Self {
            source: source.to_string(),
            rules,
        }
    }

    /// An empty filter accepts everything
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matches(&self, file: &RawFile) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let extension = file.extension();
        let mime = file.mime_type.as_deref().map(str::to_ascii_lowercase);

        self.rules.iter().any(|rule| match rule {
            AcceptRule::Extension(ext) => extension.as_deref() == Some(ext.as_str()),
            AcceptRule::MimeWildcard(major) => mime
                .as_deref()
                .and_then(|m| m.split_once('/'))
                .is_some_and(|(m, _)| m == major),
            AcceptRule::Mime(full) => mime.as_deref() == Some(full.as_str()),
        })
    }
}

impl From<String> for AcceptFilter {
    fn from(source: String) -> Self {
        AcceptFilter::parse(&source)
    }
}

impl From<AcceptFilter> for String {
    fn from(filter: AcceptFilter) -> Self {
        filter.source
    }
}

/// Apply the selection-surface rules to a batch: the accept filter and the
/// single-file limit when `multiple` is off.
pub fn select_files(files: Vec<RawFile>, accept: &AcceptFilter, multiple: bool) -> Vec<RawFile> {
    let mut selected: Vec<RawFile> = files.into_iter().filter(|f| accept.matches(f)).collect();
    if !multiple {
        selected.truncate(1);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: Option<&str>) -> RawFile {
        let f = RawFile::from_bytes(name, Vec::<u8>::new());
        match mime {
            Some(m) => f.with_mime_type(m),
            None => f,
        }
    }

    #[test]
    fn test_empty_filter_accepts_all() {
        let filter = AcceptFilter::parse("");
        assert!(filter.is_empty());
        assert!(filter.matches(&file("anything.bin", None)));
    }

    #[test]
    fn test_extension_rule() {
        let filter = AcceptFilter::parse(".png, .JPG");
        assert!(filter.matches(&file("a.png", None)));
        assert!(filter.matches(&file("b.jpg", None)));
        assert!(!filter.matches(&file("c.gif", None)));
    }

    #[test]
    fn test_mime_rules() {
        let filter = AcceptFilter::parse("image/*,application/pdf");
        assert!(filter.matches(&file("a", Some("image/webp"))));
        assert!(filter.matches(&file("doc", Some("application/PDF"))));
        assert!(!filter.matches(&file("v", Some("video/mp4"))));
        assert!(!filter.matches(&file("unknown.png", None)));
    }

    #[test]
    fn test_select_files_single() {
        let files = vec![file("a.png", None), file("b.txt", None), file("c.png", None)];
        let filter = AcceptFilter::parse(".png");

        let all: Vec<_> = select_files(files.clone(), &filter, true)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(all, vec!["a.png", "c.png"]);

        let one = select_files(files, &filter, false);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].name, "a.png");
    }

    #[test]
    fn test_serde_roundtrip_keeps_source() {
        let filter: AcceptFilter = serde_json::from_str("\".png,image/*\"").unwrap();
        assert!(filter.matches(&file("x.png", None)));
        assert_eq!(serde_json::to_string(&filter).unwrap(), "\".png,image/*\"");
    }
}
