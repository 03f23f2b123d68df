//! Transport abstraction for pluggable datagram channels.
//!
//! A `Transport` opens channels on a device; a `Channel` registers delivery
//! agents and moves fixed-size datagrams with explicit timeouts. Both are
//! implemented outside this workspace (kernel MAD interface, simulators,
//! test doubles).

use std::{fmt, io};

use crate::{
    class::MgmtClass,
    constants::{errno, MAD_SIZE},
};

/// Identifier of a delivery agent registered on a channel.
pub type AgentId = u32;

/// Addressing carried alongside a datagram.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MadAddress {
    /// Destination or source LID.
    pub lid: u16,
    /// Queue pair number.
    pub qpn: u32,
    /// Queue key.
    pub qkey: u32,
    /// Service level.
    pub sl: u8,
}

/// Per-datagram completion status reported by the transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Delivered without error.
    Success,
    /// The transport ran short of resources but delivered a response.
    NoResources,
    /// The transport gave up waiting for the response.
    TimedOut,
    /// Any other transport-specific failure code.
    Failed(i32),
}

impl CompletionStatus {
    /// Converts a raw transport status code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => CompletionStatus::Success,
            errno::ENOMEM => CompletionStatus::NoResources,
            errno::ETIMEDOUT => CompletionStatus::TimedOut,
            other => CompletionStatus::Failed(other),
        }
    }

    /// Returns the raw transport status code.
    pub fn to_raw(self) -> i32 {
        match self {
            CompletionStatus::Success => 0,
            CompletionStatus::NoResources => errno::ENOMEM,
            CompletionStatus::TimedOut => errno::ETIMEDOUT,
            CompletionStatus::Failed(code) => code,
        }
    }

    /// Whether a response with this status should be handed to the caller.
    pub fn is_delivered(self) -> bool {
        matches!(self, CompletionStatus::Success | CompletionStatus::NoResources)
    }
}

/// A management datagram together with its transport envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Addressing for sends; source address for receives.
    pub addr: MadAddress,
    /// Raw completion status, filled in by the transport on receive.
    pub status: i32,
    /// Number of valid bytes in `mad`.
    pub length: usize,
    mad: [u8; MAD_SIZE],
}

impl Datagram {
    /// Creates a zeroed datagram.
    pub fn new() -> Self {
        Self { addr: MadAddress::default(), status: 0, length: 0, mad: [0; MAD_SIZE] }
    }

    /// Zeroes the payload and envelope.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// The management datagram bytes.
    pub fn mad(&self) -> &[u8] {
        &self.mad
    }

    /// Mutable access to the management datagram bytes.
    pub fn mad_mut(&mut self) -> &mut [u8] {
        &mut self.mad
    }

    /// The valid portion of the datagram.
    pub fn payload(&self) -> &[u8] {
        &self.mad[..self.length.min(MAD_SIZE)]
    }

    /// Completion status of a received datagram.
    pub fn completion(&self) -> CompletionStatus {
        CompletionStatus::from_raw(self.status)
    }
}

impl Default for Datagram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datagram")
            .field("addr", &self.addr)
            .field("status", &self.status)
            .field("length", &self.length)
            .finish()
    }
}

/// Name and port of one channel endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Device name.
    pub device: String,
    /// Port number on the device.
    pub port: u32,
}

/// The two endpoints a device resolves to for dual-path operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPair {
    /// Subnet-management endpoint, when the device has one.
    pub smi: Option<ChannelIdentity>,
    /// General-services endpoint.
    pub gsi: ChannelIdentity,
}

/// An open datagram endpoint.
pub trait Channel {
    /// Identifier of the underlying endpoint, for diagnostics.
    fn port_id(&self) -> i32;

    /// Registers a delivery agent for a management class.
    fn register_agent(&mut self, class: MgmtClass, rmpp_version: u8) -> io::Result<AgentId>;

    /// Sends one datagram through an agent.
    fn send(&mut self, agent: AgentId, datagram: &Datagram, timeout_ms: i32) -> io::Result<()>;

    /// Receives one datagram, waiting at most `timeout_ms`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. On success the
    /// datagram's `status` carries the completion status.
    fn recv(&mut self, datagram: &mut Datagram, timeout_ms: i32) -> io::Result<Option<usize>>;

    /// Releases the endpoint.
    fn close(&mut self);
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn port_id(&self) -> i32 {
        (**self).port_id()
    }

    fn register_agent(&mut self, class: MgmtClass, rmpp_version: u8) -> io::Result<AgentId> {
        (**self).register_agent(class, rmpp_version)
    }

    fn send(&mut self, agent: AgentId, datagram: &Datagram, timeout_ms: i32) -> io::Result<()> {
        (**self).send(agent, datagram, timeout_ms)
    }

    fn recv(&mut self, datagram: &mut Datagram, timeout_ms: i32) -> io::Result<Option<usize>> {
        (**self).recv(datagram, timeout_ms)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Opens channels on management devices.
pub trait Transport {
    /// Channel type produced by this transport.
    type Channel: Channel;

    /// Opens a channel on `device` (or the default device) and `port`.
    fn open(&mut self, device: Option<&str>, port: u32) -> io::Result<Self::Channel>;

    /// Resolves a device into its SMI/GSI endpoint pair.
    ///
    /// With `enforce_smi`, a device without an SMI endpoint is an error.
    fn resolve_pair(
        &mut self,
        device: Option<&str>,
        port: u32,
        enforce_smi: bool,
    ) -> io::Result<ChannelPair>;
}
