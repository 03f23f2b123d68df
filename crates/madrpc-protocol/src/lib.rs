#![warn(missing_docs)]

//! madrpc-protocol: management datagram layout and request descriptors.

/// Request building and field extraction.
pub mod codec;
/// Hex dumps for diagnostics.
pub mod dump;
/// Named bit fields of the management datagram.
pub mod field;
/// Request, destination and transfer-header descriptors.
pub mod types;

pub use codec::{MadCodec, StandardCodec};
pub use field::MadField;
pub use types::{method, PortId, RmppHeader, RpcRequest, RpcVersion};
