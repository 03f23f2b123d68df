#![warn(missing_docs)]

//! madrpc-host: transaction contexts and request orchestration over a
//! pluggable datagram transport.
//!
//! Everything here is synchronous. An exchange blocks the caller for at most
//! `timeout_ms * retries`; a request following redirects repeats that per hop.

/// Logs a failure at `warn` when errors are visible, at `debug` otherwise.
macro_rules! report {
    ($config:expr, $($arg:tt)+) => {
        if $config.errors_visible() {
            tracing::warn!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Transaction context owning one channel.
pub mod context;
/// Dual-path (SMI/GSI) context.
pub mod dual_path;
/// The send/receive/retry primitive.
pub mod exchange;
/// Process-wide default context for callers that don't pass one.
pub mod global;
/// Transfer-header (RMPP) orchestrator.
pub mod rmpp;
/// Redirect-aware request orchestrator.
pub mod rpc;
/// Time utilities for the host.
pub mod time;

pub use context::TransactionContext;
pub use dual_path::DualPathContext;
pub use exchange::{exchange, Exchange, ExchangeRequest};
pub use rpc::RpcOutcome;
pub use time::{Clock, SystemClock};
