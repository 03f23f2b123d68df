//! Error types shared by every layer.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{class::MgmtClass, constants::errno};

/// Every failure a context, exchange or orchestrator can report.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A caller-supplied value is out of range (attempt count, class code, buffer bounds).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// More classes were requested than the agent table can hold.
    #[error("too many classes {requested} requested (max {max})")]
    TooManyClasses {
        /// Number of classes passed in.
        requested: usize,
        /// Table capacity.
        max: usize,
    },

    /// The transport channel could not be opened.
    #[error("can't open channel: {0}")]
    Init(#[source] io::Error),

    /// Agent registration failed for a class.
    #[error("agent registration for class {class} failed: {source}")]
    Registration {
        /// Offending class.
        class: MgmtClass,
        /// Transport error behind the failure.
        #[source]
        source: io::Error,
    },

    /// Send or receive failed at the transport boundary.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// No matching response arrived within any attempt.
    #[error("timeout after {attempts} attempts, {} ms", .waited.as_millis())]
    Timeout {
        /// Attempts made.
        attempts: u32,
        /// Time spent across all attempts.
        waited: Duration,
    },

    /// The request could not be serialized.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The transport delivered the response with a failed completion status.
    #[error("completion failed with status {0}")]
    Completion(i32),

    /// The remote management entity answered with a non-success status.
    #[error("MAD completed with error status {status:#x}; dport ({dport})")]
    RemoteStatus {
        /// Status field of the response.
        status: u32,
        /// Destination the final attempt was sent to.
        dport: String,
    },

    /// The remote asked for a GID-based redirect.
    #[error("GID-based redirection is not supported; dport ({dport})")]
    UnsupportedRedirect {
        /// Destination that issued the redirect.
        dport: String,
    },

    /// The redirect chain grew past the configured bound.
    #[error("gave up after {hops} redirects")]
    TooManyRedirects {
        /// Hops followed before giving up.
        hops: u32,
    },

    /// An active RMPP header carried an unknown version.
    #[error("bad rmpp version {0}")]
    UnsupportedVersion(u32),

    /// The process-wide default context has not been set up.
    #[error("default context is not initialized")]
    NotInitialized,
}

impl ErrorKind {
    /// Auxiliary error code recorded on requests that carry an error field.
    pub fn errno(&self) -> i32 {
        match self {
            ErrorKind::InvalidArgument(_) | ErrorKind::TooManyClasses { .. } => errno::EINVAL,
            ErrorKind::Registration { source, .. } => source.raw_os_error().unwrap_or(errno::EINVAL),
            ErrorKind::Init(err) | ErrorKind::Transport(err) => {
                err.raw_os_error().unwrap_or(errno::EIO)
            }
            ErrorKind::Timeout { .. } => errno::ETIMEDOUT,
            ErrorKind::Completion(code) => *code,
            ErrorKind::Encoding(_)
            | ErrorKind::RemoteStatus { .. }
            | ErrorKind::UnsupportedRedirect { .. }
            | ErrorKind::TooManyRedirects { .. }
            | ErrorKind::UnsupportedVersion(_)
            | ErrorKind::NotInitialized => errno::EIO,
        }
    }
}

/// Result type alias using `ErrorKind`.
pub type Result<T> = std::result::Result<T, ErrorKind>;
