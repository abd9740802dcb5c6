use crate::upload::AcceptFilter;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_field_name() -> String {
    "file".to_string()
}

fn default_multiple() -> bool {
    true
}

/// Upload manager configuration.
///
/// `accept`, `multiple` and `draggable` are advisory: they tell the selection
/// surface what to offer and are not enforced by the manager.
#[derive(Clone, Debug, Deserialize)]
pub struct UploadConfig {
    /// URL the multipart request is posted to
    pub endpoint: String,
    /// Form field the file is attached under
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Static text fields sent with every file
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Send and persist cookies with upload requests
    #[serde(default)]
    pub with_credentials: bool,
    #[serde(default)]
    pub accept: AcceptFilter,
    #[serde(default = "default_multiple")]
    pub multiple: bool,
    #[serde(default)]
    pub draggable: bool,
    /// Upper bound on simultaneously running uploads. None = unbounded.
    #[serde(default)]
    pub max_concurrent_uploads: Option<usize>,
}

impl UploadConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            field_name: default_field_name(),
            extra_fields: BTreeMap::new(),
            headers: BTreeMap::new(),
            with_credentials: false,
            accept: AcceptFilter::default(),
            multiple: default_multiple(),
            draggable: false,
            max_concurrent_uploads: None,
        }
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, max: usize) -> Self {
        self.max_concurrent_uploads = Some(max);
        self
    }

    /// Load configuration from environment variables, reading a `.env` file
    /// first when one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a JSON document
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = lookup("HOIST_ENDPOINT").ok_or(ConfigError::Missing("HOIST_ENDPOINT"))?;
        let mut config = Self::new(endpoint);

        if let Some(field_name) = lookup("HOIST_FIELD_NAME") {
            config.field_name = field_name;
        }
        if let Some(value) = lookup("HOIST_WITH_CREDENTIALS") {
            config.with_credentials = parse_bool("HOIST_WITH_CREDENTIALS", &value)?;
        }
        if let Some(value) = lookup("HOIST_HEADERS") {
            config.headers = parse_pairs("HOIST_HEADERS", &value)?;
        }
        if let Some(value) = lookup("HOIST_FIELDS") {
            config.extra_fields = parse_pairs("HOIST_FIELDS", &value)?;
        }
        if let Some(value) = lookup("HOIST_ACCEPT") {
            config.accept = AcceptFilter::parse(&value);
        }
        if let Some(value) = lookup("HOIST_MULTIPLE") {
            config.multiple = parse_bool("HOIST_MULTIPLE", &value)?;
        }
        if let Some(value) = lookup("HOIST_MAX_CONCURRENT") {
            let max = value.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
                key: "HOIST_MAX_CONCURRENT",
                message: e.to_string(),
            })?;
            config.max_concurrent_uploads = Some(max);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "endpoint",
                message: "Endpoint cannot be empty".to_string(),
            });
        }
        if self.field_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "field_name",
                message: "Field name cannot be empty".to_string(),
            });
        }
        if self.max_concurrent_uploads == Some(0) {
            return Err(ConfigError::Invalid {
                key: "max_concurrent_uploads",
                message: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Parse `k=v;k=v` (or `k:v`) into a map
pub fn parse_pairs(key: &'static str, value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut pairs = BTreeMap::new();
    for entry in value.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (k, v) = entry
            .split_once('=')
            .or_else(|| entry.split_once(':'))
            .ok_or_else(|| ConfigError::Invalid {
                key,
                message: format!("expected key=value, got '{}'", entry),
            })?;
        pairs.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(pairs)
}
