use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not open {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode or decode record: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("could not read or write state: {0}")]
    State(#[from] serde_json::Error),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    pub fn unavailable<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Error {
        Error::Unavailable {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
