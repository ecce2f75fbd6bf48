use std::sync::Arc;

/// Represents a result type for operations in the SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// SDK-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the SDK.
///
/// Only argument validation, registry misuse, and post-shutdown calls ever reach API callers.
/// Queue and network failures are absorbed internally: event reporting is fire-and-forget.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Caller passed invalid input to a public API method.
    #[error("{0}")]
    InvalidArgument(&'static str),

    /// Operation attempted after the client was shut down.
    #[error("cannot enqueue messages after client is shutdown")]
    Shutdown,

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid write key.
    #[error("unauthorized, write_key is likely invalid")]
    Unauthorized,

    /// A live client with the same tag already exists.
    #[error("duplicate client created with tag: {0}")]
    DuplicateTag(String),

    /// The process-wide singleton instance has already been installed.
    #[error("singleton instance already exists")]
    SingletonAlreadySet,

    /// The singleton instance refuses direct shutdown to protect shared state.
    #[error("cannot shutdown the singleton instance")]
    SingletonShutdown,

    /// Indicates that a background worker thread panicked. This should normally never happen.
    #[error("background worker panicked")]
    WorkerPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
