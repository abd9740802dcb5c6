// Library exports for the CLI and integration tests

pub mod config;
pub mod upload;

pub use config::{ConfigError, UploadConfig};
pub use upload::UploadManager;
