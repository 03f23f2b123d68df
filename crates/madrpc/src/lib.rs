#![warn(missing_docs)]

//! madrpc: a small public API facade for the workspace.
//!
//! This crate re-exports the types needed to run management datagram
//! transactions over a pluggable transport:
//!
//! - Contexts (`TransactionContext`, `DualPathContext`) and the default-context functions
//! - Request descriptors (`RpcRequest`, `PortId`, `RmppHeader`, `MgmtClass`)
//! - The transport seam (`Transport`, `Channel`, `Datagram`)
//! - Core configuration and errors (`Config`, `ErrorKind`)
//!
//! Example
//! ```ignore
//! use madrpc::prelude::*;
//!
//! let mut transport = my_umad_transport();
//! let mut context = TransactionContext::open(&mut transport, None, 1, &[MgmtClass::PERF])?;
//!
//! let mut rpc = RpcRequest::new(MgmtClass::PERF, method::GET, 0x0012, 0).with_data(64, 64);
//! let mut dport = PortId::lid(4);
//! let mut counters = [0u8; 64];
//! context.request(&mut rpc, &mut dport, None, Some(&mut counters))?;
//! ```

// Core config, errors and the transport seam
pub use madrpc_core::{
    capture::MadCapture,
    class::MgmtClass,
    config::Config,
    error::{ErrorKind, Result},
    transport::{Channel, ChannelIdentity, ChannelPair, CompletionStatus, Datagram, Transport},
};
// Host: contexts, orchestration and the process-wide default
pub use madrpc_host::{global, Clock, DualPathContext, RpcOutcome, SystemClock, TransactionContext};
// Protocol: request descriptors and the wire codec
pub use madrpc_protocol::{method, MadCodec, MadField, PortId, RmppHeader, RpcRequest, RpcVersion, StandardCodec};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        method, Channel, Config, DualPathContext, ErrorKind, MgmtClass, PortId, RmppHeader,
        RpcRequest, Transport, TransactionContext,
    };
}
