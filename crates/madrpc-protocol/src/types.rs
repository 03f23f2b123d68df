//! Request, destination and transfer-header descriptors.

use std::fmt;

use madrpc_core::{class::MgmtClass, transport::MadAddress};

/// Well-known queue key for general-services traffic.
pub const IB_DEFAULT_QP1_QKEY: u32 = 0x8001_0000;

/// Management methods used by requests.
pub mod method {
    /// Get.
    pub const GET: u8 = 0x01;
    /// Set.
    pub const SET: u8 = 0x02;
    /// Response bit, set on every reply.
    pub const RESPONSE: u8 = 0x80;
    /// Subnet administration GetTable.
    pub const GET_TABLE: u8 = 0x12;
}

/// Destination of a request.
///
/// A redirect replaces every field; earlier values are not kept here, the
/// orchestrator returns the hop sequence instead.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PortId {
    /// Destination LID.
    pub lid: u16,
    /// Destination queue pair.
    pub qp: u32,
    /// Queue key.
    pub qkey: u32,
    /// Service level.
    pub sl: u8,
}

impl PortId {
    /// LID-routed destination on the general-services queue pair.
    pub fn lid(lid: u16) -> Self {
        Self { lid, qp: 1, qkey: IB_DEFAULT_QP1_QKEY, sl: 0 }
    }

    /// Subnet-management destination (queue pair 0).
    pub fn smp(lid: u16) -> Self {
        Self { lid, qp: 0, qkey: 0, sl: 0 }
    }

    /// Transport envelope for a datagram sent to this port.
    pub fn address(&self) -> MadAddress {
        MadAddress { lid: self.lid, qpn: self.qp, qkey: self.qkey, sl: self.sl }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lid {} QP {:#x} QKey {:#x} SL {}", self.lid, self.qp, self.qkey, self.sl)
    }
}

/// Layout revision of a request descriptor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RpcVersion {
    /// First layout, without an error field.
    #[default]
    V0,
    /// Layout that records the auxiliary error code.
    V1,
}

/// Logical description of a management request and its outputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcRequest {
    /// Management class; selects the delivery agent.
    pub mgmt_class: MgmtClass,
    /// Method.
    pub method: u8,
    /// Attribute identifier.
    pub attr_id: u16,
    /// Attribute modifier.
    pub attr_mod: u32,
    /// Per-call timeout in milliseconds; 0 uses the context default.
    pub timeout_ms: i32,
    /// Byte offset of the payload inside the MAD, for both directions.
    pub data_offset: usize,
    /// Payload size in bytes.
    pub data_size: usize,
    /// Management key for subnet-management classes.
    pub mkey: u64,
    /// Component mask for subnet administration queries.
    pub mask: u64,
    /// Descriptor layout revision.
    pub version: RpcVersion,
    /// Remote status of the last response (output).
    pub rstatus: u32,
    /// Auxiliary error code of the last call (output, `V1` only).
    pub error: Option<i32>,
    /// Record size hint from the subnet administration header (output).
    pub rec_size: u32,
}

impl RpcRequest {
    /// A request with no payload and default outputs.
    pub fn new(mgmt_class: MgmtClass, method: u8, attr_id: u16, attr_mod: u32) -> Self {
        Self {
            mgmt_class,
            method,
            attr_id,
            attr_mod,
            timeout_ms: 0,
            data_offset: 0,
            data_size: 0,
            mkey: 0,
            mask: 0,
            version: RpcVersion::V0,
            rstatus: 0,
            error: None,
            rec_size: 0,
        }
    }

    /// Sets the payload window.
    pub fn with_data(mut self, data_offset: usize, data_size: usize) -> Self {
        self.data_offset = data_offset;
        self.data_size = data_size;
        self
    }

    /// Sets the per-call timeout override.
    pub fn with_timeout(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Switches to the `V1` layout, which records error codes.
    pub fn with_error_field(mut self) -> Self {
        self.version = RpcVersion::V1;
        self
    }

    /// Records an auxiliary error code when the layout has room for it.
    pub fn record_error(&mut self, code: i32) {
        if self.version == RpcVersion::V1 {
            self.error = Some(code);
        }
    }
}

/// Transfer-control (RMPP) header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RmppHeader {
    /// Protocol version; 1 when the header is in use.
    pub version: u8,
    /// Segment type (data, ack, stop, abort).
    pub rmpp_type: u8,
    /// Response time hint.
    pub resp_time: u8,
    /// Flags; bit 0 is active, bit 1 first segment, bit 2 last segment.
    pub flags: u8,
    /// Status.
    pub status: u8,
    /// First data word (segment number).
    pub d1: u32,
    /// Second data word (payload length or new window).
    pub d2: u32,
}

impl RmppHeader {
    /// Flag bit marking the header as active.
    pub const FLAG_ACTIVE: u8 = 0x1;
    /// Flag bit marking the first segment.
    pub const FLAG_FIRST: u8 = 0x2;
    /// Flag bit marking the last segment.
    pub const FLAG_LAST: u8 = 0x4;

    /// Whether the low flag bits announce a multi-segment transfer.
    pub fn is_active(&self) -> bool {
        self.flags & (Self::FLAG_ACTIVE | Self::FLAG_FIRST) != 0
    }
}
