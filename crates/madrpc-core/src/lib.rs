#![warn(missing_docs)]

//! madrpc-core: foundational types shared by every layer.
//!
//! This crate provides the minimal set of pieces the protocol and host
//! crates build on:
//! - Protocol constants
//! - Configuration types
//! - Error handling
//! - Management class identifiers
//! - The transport boundary (channels, datagrams, completion status)
//! - The one-shot outgoing MAD capture hook
//!
//! Wire layout and field access live in `madrpc-protocol`; transaction
//! contexts and request orchestration live in `madrpc-host`.

/// Protocol constants shared across layers.
pub mod constants {
    /// Size of a management datagram on the wire.
    pub const MAD_SIZE: usize = 256;
    /// Capacity of the class -> agent table. Class codes are `0..MAX_CLASS`.
    pub const MAX_CLASS: usize = 256;
    /// Attempts per exchange when nothing else is configured.
    pub const DEFAULT_RETRIES: i32 = 3;
    /// Per-attempt timeout in milliseconds when nothing else is configured.
    pub const DEFAULT_TIMEOUT_MS: i32 = 1000;
    /// Default number of bytes copied by the capture hook.
    pub const DEFAULT_CAPTURE_LEN: usize = 256;
    /// Redirect hops followed by a single request before giving up.
    pub const DEFAULT_MAX_REDIRECTS: u32 = 8;
    /// Remote status meaning "resend this request to the advertised port".
    ///
    /// Matched exactly, not as a flag bit, so unexpected statuses still fail.
    pub const MAD_STS_REDIRECT: u32 = 0x0002;
    /// The only RMPP version understood when the header is active.
    pub const RMPP_VERSION: u32 = 1;
    /// Environment variable read by `Config::from_env` for the debug level.
    pub const DEBUG_LEVEL_ENV: &str = "MADRPC_DEBUG_LEVEL";

    /// Error codes used for completion status and the auxiliary error field.
    pub mod errno {
        /// I/O error.
        pub const EIO: i32 = 5;
        /// Out of memory; reported by the transport as "no resources".
        pub const ENOMEM: i32 = 12;
        /// Invalid argument.
        pub const EINVAL: i32 = 22;
        /// Connection timed out.
        pub const ETIMEDOUT: i32 = 110;
    }
}

/// One-shot capture of the next outgoing MAD.
pub mod capture;
/// Management class identifiers.
pub mod class;
/// Configuration options for contexts and exchanges.
pub mod config;
/// Error types and results.
pub mod error;
/// Transport abstraction for pluggable datagram channels.
pub mod transport;
