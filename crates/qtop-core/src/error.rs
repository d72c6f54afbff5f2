use std::io;

use thiserror::Error;

use crate::dis::DisError;
use crate::pipe::PipeError;

/// Errors surfaced by the protocol stack and the attribute decoders.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error(transparent)]
    Dis(#[from] DisError),

    /// Non-zero status from the trqauthd daemon.
    #[error("trqauthd error (code {0})")]
    Auth(i64),

    /// The server broke the batch-protocol framing contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed input to one of the attribute grammars.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// A required entity attribute is missing or unparsable.
    #[error("attribute {0:?} is missing or malformed")]
    Attr(String),

    #[error("cannot determine local username (USER is not set)")]
    UnknownUser,
}

pub type Result<T> = std::result::Result<T, Error>;
