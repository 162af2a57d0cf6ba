use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such path: {upath}")]
    NotFound { upath: String },

    #[error("invalid directory entry for {child:?} under {upath:?}")]
    BadEntry { upath: String, child: String },

    #[error("failed to retrieve information: {0}")]
    Fetch(String),

    #[error("path could not be normalized: {upath}")]
    Encoding { upath: String },

    #[error("could not serialize node metadata: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
