//! Message handler error types
//!
//! Handlers report whether a failure is retryable (transient I/O, unavailable scanner)
//! or fatal (a message that can never succeed). The redelivery policy retries the former
//! with backoff and hands the latter straight to its recoverer.

use std::fmt;

/// Message handling error that is either retryable or fatal
#[derive(Debug)]
pub struct HandlerError {
    inner: anyhow::Error,
    retryable: bool,
}

impl HandlerError {
    /// Create a retryable error
    ///
    /// The same message is redelivered after the backoff delay until attempts run out.
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            retryable: true,
        }
    }

    /// Create a fatal error
    ///
    /// The message skips the remaining attempts and goes to the recoverer.
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for HandlerError {
    /// Unclassified errors are retried
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err)
    }
}

/// Extension trait for marking a result's error as fatal
pub trait HandlerResultExt<T> {
    fn fatal(self) -> Result<T, HandlerError>;
}

impl<T, E: Into<anyhow::Error>> HandlerResultExt<T> for Result<T, E> {
    fn fatal(self) -> Result<T, HandlerError> {
        self.map_err(|e| HandlerError::fatal(e.into()))
    }
}
