use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnkindleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot find {app}. Make sure it is running with a book open.")]
    TargetNotRunning { app: String },

    #[error("Cannot detect the reader window geometry: {reason}")]
    WindowGeometryUnavailable { reason: String },

    #[error("Failed to capture page to {path}: {reason}")]
    CaptureFailed { path: String, reason: String },

    #[error("Failed to navigate to next page: {reason}")]
    NavigationFailed { reason: String },

    #[error("No page captures found in {directory}")]
    NoPagesFound { directory: String },

    #[error("Failed to assemble document: {reason}")]
    AssemblyFailed { reason: String },

    #[error("Cannot access directory {path}: {reason}")]
    DirectoryAccessFailed { path: String, reason: String },

    #[error("Invalid capture options: {reason}")]
    InvalidOptions { reason: String },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, UnkindleError>;
