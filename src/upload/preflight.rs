use super::accept::AcceptFilter;
use super::types::RawFile;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a preflight hook
#[derive(Debug, Clone)]
pub enum PreflightDecision {
    /// Drop the file silently: no record, no upload
    Reject,
    /// Upload this file. Either the original or a substitute built by the hook.
    Accept(RawFile),
}

impl PreflightDecision {
    /// `true` keeps the original file, `false` rejects it
    pub fn keep_if(keep: bool, file: RawFile) -> Self {
        if keep {
            PreflightDecision::Accept(file)
        } else {
            PreflightDecision::Reject
        }
    }
}

/// Accept/transform step run before a file is queued.
///
/// Implemented for any `Fn(RawFile) -> impl Future<Output = PreflightDecision>`,
/// so plain async closures can be used as hooks.
#[async_trait::async_trait]
pub trait BeforeUpload: Send + Sync {
    async fn before_upload(&self, file: RawFile) -> PreflightDecision;
}

#[async_trait::async_trait]
impl<F, Fut> BeforeUpload for F
where
    F: Fn(RawFile) -> Fut + Send + Sync,
    Fut: Future<Output = PreflightDecision> + Send + 'static,
{
    async fn before_upload(&self, file: RawFile) -> PreflightDecision {
        (self)(file).await
    }
}

/// Ordered list of preflight hooks.
///
/// Each hook sees the file produced by the previous one; the first rejection
/// ends the chain. An empty chain accepts every file unchanged.
#[derive(Clone, Default)]
pub struct PreflightChain {
    hooks: Vec<Arc<dyn BeforeUpload>>,
}

impl PreflightChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: impl BeforeUpload + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook against `file`. `None` means the file was rejected.
    ///
    /// There is no timeout: a hook that never resolves keeps this future
    /// pending forever.
    pub async fn run(&self, file: RawFile) -> Option<RawFile> {
        let mut current = file;
        for hook in &self.hooks {
            let name = current.name.clone();
            match hook.before_upload(current).await {
                PreflightDecision::Accept(next) => {
                    if next.name != name {
                        debug!("Preflight replaced '{}' with '{}'", name, next.name);
                    }
                    current = next;
                }
                PreflightDecision::Reject => {
                    debug!("Preflight rejected '{}'", name);
                    return None;
                }
            }
        }
        Some(current)
    }
}

/// Hook that rejects files larger than `limit` bytes
pub fn max_size(limit: u64) -> impl BeforeUpload {
    MaxSize { limit }
}

/// Hook that rejects files not matching an accept filter
pub fn accept_filter(filter: AcceptFilter) -> impl BeforeUpload {
    AcceptOnly { filter }
}

struct MaxSize {
    limit: u64,
}

#[async_trait::async_trait]
impl BeforeUpload for MaxSize {
    async fn before_upload(&self, file: RawFile) -> PreflightDecision {
        let keep = file.size <= self.limit;
        PreflightDecision::keep_if(keep, file)
    }
}

struct AcceptOnly {
    filter: AcceptFilter,
}

#[async_trait::async_trait]
impl BeforeUpload for AcceptOnly {
    async fn before_upload(&self, file: RawFile) -> PreflightDecision {
        let keep = self.filter.matches(&file);
        PreflightDecision::keep_if(keep, file)
    }
}
