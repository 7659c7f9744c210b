use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable at {}: {source}", .path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot {}: {reason}", .path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("identity {0:?} has an empty embedding")]
    EmptyEmbedding(String),

    #[error("invalid identity name {0:?}")]
    InvalidName(String),

    #[error("encoding snapshot: {0}")]
    Encode(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
