use std::{io, path::PathBuf};

use uuid::Uuid;

/// Rejections raised while turning encode settings into an argument vector.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("input file is required")]
    MissingInput,
    #[error("at least one destination is required")]
    MissingDestinations,
}

/// Errors surfaced synchronously by `Pipeline` lifecycle calls.
///
/// Anything the monitor task discovers after `start` returned is reported
/// through the event hub and the activity log instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stream {0} is already running")]
    AlreadyRunning(Uuid),
    #[error("media file not found at {}: {source}", path.display())]
    MediaNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to build encoder command: {0}")]
    Command(#[from] CommandError),
    #[error("failed to launch encoder: {0}")]
    Launch(#[source] io::Error),
    #[error("failed to kill encoder: {0}")]
    Kill(#[source] io::Error),
    #[error("stream {0} has not finished launching")]
    NotLaunched(Uuid),
    #[error("operation cancelled")]
    Cancelled,
    #[error("stop old process: {0}")]
    ReloadStop(#[source] Box<PipelineError>),
    #[error("timeout waiting for old process of stream {0} to exit")]
    VacateTimeout(Uuid),
    #[error("start reloaded process: {0}")]
    ReloadStart(#[source] Box<PipelineError>),
}

/// Errors of the stream/program coordination layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("stream not found")]
    StreamNotFound,
    #[error("stream program has no videos")]
    ProgramEmpty,
    #[error("invalid program: {0}")]
    InvalidProgram(&'static str),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
