use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracker request failed: {0:#}")]
    Tracker(anyhow::Error),

    #[error("Board request failed: {0:#}")]
    Board(anyhow::Error),

    #[error(
        "Writing task batch failed after {batches_written} batches ({tasks_written} tasks) were written: {error:#}"
    )]
    BatchWrite {
        batches_written: usize,
        tasks_written: usize,
        error: anyhow::Error,
    },

    #[error("Sync worker stopped unexpectedly: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
