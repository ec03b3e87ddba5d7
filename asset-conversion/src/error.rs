/// Error types for asset conversion operations.
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while producing or reading converted assets.
///
/// Failures of individual external conversion jobs are not errors: the
/// scheduler records them as [`crate::scheduler::TaskFailure`] values.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("the shape of a texel to world space transform for a volume must be 3x4 but got {rows}x4")]
    Shape { rows: usize },

    #[error("volume of extent {extent:?} needs {expected} values but got {found}")]
    ValueCount {
        extent: [usize; 3],
        expected: usize,
        found: usize,
    },

    #[error("Vulkan format {format} is not supported, only the following formats are supported: {supported:?}")]
    UnsupportedFormat { format: u32, supported: [u32; 2] },

    #[error("only grids with linear index to world transforms are supported ({0})")]
    UnsupportedTransform(String),

    #[error("grid '{0}' has no active voxels")]
    EmptyGrid(String),

    #[error("no grid named '{0}'")]
    GridNotFound(String),

    #[error("cannot read grids from {0}, only .json grid files are supported")]
    UnsupportedGridFile(PathBuf),

    #[error("invalid container {path}: {reason}")]
    InvalidContainer { path: PathBuf, reason: String },

    #[error("{0} lights do not fit into a light list")]
    TooManyLights(usize),

    #[error("invalid material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    #[error("format registry: {0}")]
    Registry(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
}

impl ConversionError {
    /// Wraps an IO error together with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConversionError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_container(path: &std::path::Path, reason: impl Into<String>) -> Self {
        ConversionError::InvalidContainer {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConversionError>;

/// Attaches a path to IO results.
pub(crate) trait IoContext<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|source| ConversionError::io(path, source))
    }
}
