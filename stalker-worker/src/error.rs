use thiserror::Error;

use stalker_common::error::GatherError;

/// Enumeration of errors that end a gathering run.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Gather(#[from] GatherError),
    #[error("failed to read operator input: {0}")]
    Input(#[from] std::io::Error),
    #[error("operator input closed")]
    InputClosed,
}
