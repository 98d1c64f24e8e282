//! Error type shared by the library and the binaries.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PairError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}:{line}: {msg}")]
    Parameter {
        file: String,
        line: usize,
        msg: String,
    },
    #[error("malformed FASTA {file}: {msg}")]
    Fasta { file: String, msg: String },
    #[error("malformed seed file {file}: {msg}")]
    Seed { file: String, msg: String },
    #[error("{0}")]
    Invariant(String),
    #[error(transparent)]
    Output(#[from] std::io::Error),
}

impl PairError {
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        PairError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PairError>;
