use std::path::PathBuf;

/// Единый тип ошибок Dirpoll Core.
#[derive(thiserror::Error, Debug)]
pub enum DirpollError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Watcher is already running")]
    WatcherAlreadyRunning,

    #[error("Failed to list directory {path}: {source}")]
    Listing {
        path: PathBuf,
        source: std::io::Error,
    },
}
