//! Error types for graph construction, caching and export.

use pwnmap_core::QueryError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("duplicate distinguished name: {0}")]
    DuplicateDistinguishedName(String),

    #[error("unknown pwn method '{0}'")]
    UnknownMethod(String),

    #[error("unknown export format '{0}' (expected graphviz or cytoscapejs)")]
    UnknownFormat(String),

    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("not an object cache file")]
    BadMagic,

    #[error("cache truncated inside its header after {0} bytes")]
    TruncatedCache(usize),

    #[error("unsupported cache version {0}")]
    UnsupportedVersion(u32),

    #[error("cache record encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
