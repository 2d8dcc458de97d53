use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("offset {offset}+{count} out of bounds (buffer is {len} bytes)")]
    Bounds {
        offset: usize,
        count: usize,
        len: usize,
    },

    #[error("unrecognised format: {0}")]
    UnrecognisedFormat(String),

    #[error("truncated data: {0}")]
    Truncated(String),

    #[error("malformed range parameter: {0}")]
    BadRange(String),

    #[error("'{0}' is not a valid RealLive archive")]
    NotArchive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
