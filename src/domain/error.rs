use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("Destination path is empty or not writable")]
    InvalidDestination,

    #[error("Download dialog was dismissed")]
    UserCancelled,

    #[error("Download was cancelled")]
    Aborted,

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}
