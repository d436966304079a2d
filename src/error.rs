//! Error types shared by every parser in the crate.
//!
//! Parsers fail with one of four kinds: the file header is wrong
//! ([`Error::Format`]), a required child entry is missing ([`Error::Structure`]),
//! a read or slice leaves the buffer ([`Error::Range`]) or the data uses a
//! variant this crate cannot decode ([`Error::Unsupported`]).

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while decoding container data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Header-level mismatch (signature, version, record size).
    #[error("format error: {0}")]
    Format(String),

    /// A required entry or part is missing.
    #[error("structural error: {0}")]
    Structure(String),

    /// A read or slice exceeds the available bytes.
    #[error("range error: {0}")]
    Range(String),

    /// Recognised data of a kind that cannot be decoded.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure(message.into())
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of an asynchronous model load.
///
/// Cloning shares the underlying error, so every caller waiting on the same
/// model observes the identical failure.
#[derive(Debug, Clone)]
pub struct ModelError(Arc<anyhow::Error>);

impl ModelError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The typed parse error behind this failure, if there is one.
    pub fn parse_error(&self) -> Option<&Error> {
        self.0.downcast_ref::<Error>()
    }

    pub fn ptr_eq(&self, other: &ModelError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for ModelError {}
