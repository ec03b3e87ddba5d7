/// Batch conversion configuration.
use constants::texture::DEFAULT_CONVERTER_PATH;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Concurrency budget used when the host parallelism cannot be queried.
pub const FALLBACK_CONCURRENCY_BUDGET: usize = 32;

/// Interval between two liveness checks of the running conversions.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for a batch texture conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    /// Maximum number of converter processes running at once.
    pub concurrency_budget: usize,
    /// Leave tasks out whose destination file already exists.
    pub skip_existing: bool,
    /// Path to the texture converter executable.
    pub converter_path: PathBuf,
    /// Sleep between two polling iterations.
    pub poll_interval: Duration,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            concurrency_budget: default_concurrency_budget(),
            skip_existing: true,
            converter_path: PathBuf::from(DEFAULT_CONVERTER_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ConversionConfig {
    pub fn with_concurrency_budget(mut self, budget: usize) -> Self {
        self.concurrency_budget = budget.max(1);
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn with_converter_path(mut self, path: impl AsRef<Path>) -> Self {
        self.converter_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Budget actually enforced by the pool, never below one.
    pub fn effective_budget(&self) -> usize {
        self.concurrency_budget.max(1)
    }
}

/// Available parallelism of the host, or [`FALLBACK_CONCURRENCY_BUDGET`].
pub fn default_concurrency_budget() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_CONCURRENCY_BUDGET)
}
