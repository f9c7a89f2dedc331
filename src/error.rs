//! Error types for seatwatch.

use thiserror::Error;

use crate::model::TaskKey;

#[derive(Debug, Error)]
pub enum Error {
    /// A monitor for this key is already registered.
    #[error("already monitoring {0}")]
    DuplicateTask(TaskKey),

    #[error("monitoring task not found: {0}")]
    TaskNotFound(TaskKey),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("endpoint returned {0}")]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
