//! Building requests and reading fields out of received datagrams.
//!
//! The orchestrators only talk to the [`MadCodec`] trait, so an alternative
//! layout (vendor classes, a recording test codec) can be swapped in per
//! context. [`StandardCodec`] implements the common MAD header, the RMPP
//! header and the subnet administration header.

use std::time::{SystemTime, UNIX_EPOCH};

use madrpc_core::{
    class::MgmtClass,
    constants::MAD_SIZE,
    error::{ErrorKind, Result},
    transport::Datagram,
};

use crate::{
    field::{self, MadField},
    types::{PortId, RmppHeader, RpcRequest},
};

/// Serializes requests and extracts fields from responses.
pub trait MadCodec {
    /// Builds the wire request into `datagram` and returns its length.
    fn build(
        &mut self,
        datagram: &mut Datagram,
        rpc: &RpcRequest,
        dport: &PortId,
        rmpp: Option<&RmppHeader>,
        payload: Option<&[u8]>,
    ) -> Result<usize>;

    /// Reads a field of up to 32 bits, `base` bytes into the MAD.
    fn get_field(&self, mad: &[u8], base: usize, field: MadField) -> u32 {
        field::get_field(mad, base, field)
    }

    /// Reads a field of up to 64 bits, `base` bytes into the MAD.
    fn get_field64(&self, mad: &[u8], base: usize, field: MadField) -> u64 {
        field::get_field64(mad, base, field)
    }
}

/// Codec for the standard MAD layout.
///
/// Transaction identifiers keep a random high half and count up in the low
/// half, which is the part responses are matched on.
#[derive(Debug, Clone)]
pub struct StandardCodec {
    next_tid: u64,
}

impl StandardCodec {
    /// Creates a codec with a time-seeded transaction identifier.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::with_tid_seed(seed)
    }

    /// Creates a codec whose first transaction identifier is derived from `seed`.
    pub fn with_tid_seed(seed: u64) -> Self {
        // Responses are matched on the low half, which is never zero.
        let low = (seed as u32).max(1);
        Self { next_tid: (seed & 0xffff_ffff_0000_0000) | u64::from(low) }
    }

    /// Returns the next transaction identifier.
    pub fn next_tid(&mut self) -> u64 {
        let tid = self.next_tid;
        let low = (tid as u32).wrapping_add(1).max(1);
        self.next_tid = (tid & 0xffff_ffff_0000_0000) | u64::from(low);
        tid
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MadCodec for StandardCodec {
    fn build(
        &mut self,
        datagram: &mut Datagram,
        rpc: &RpcRequest,
        dport: &PortId,
        rmpp: Option<&RmppHeader>,
        payload: Option<&[u8]>,
    ) -> Result<usize> {
        rpc.data_offset
            .checked_add(rpc.data_size)
            .filter(|end| *end <= MAD_SIZE)
            .ok_or_else(|| {
                ErrorKind::Encoding(format!(
                    "payload window {}+{} exceeds MAD size {}",
                    rpc.data_offset, rpc.data_size, MAD_SIZE
                ))
            })?;

        datagram.clear();
        datagram.addr = dport.address();
        let tid = self.next_tid();
        let mad = datagram.mad_mut();

        field::set_field(mad, 0, MadField::BaseVersion, 1);
        field::set_field(mad, 0, MadField::MgmtClass, u32::from(rpc.mgmt_class.code()));
        field::set_field(mad, 0, MadField::ClassVersion, u32::from(rpc.mgmt_class.class_version()));
        field::set_field(mad, 0, MadField::Method, u32::from(rpc.method));
        field::set_field64(mad, 0, MadField::Tid, tid);
        field::set_field(mad, 0, MadField::AttrId, u32::from(rpc.attr_id));
        field::set_field(mad, 0, MadField::AttrMod, rpc.attr_mod);

        if rpc.mgmt_class.is_smi() {
            field::set_field64(mad, 0, MadField::Mkey, rpc.mkey);
        } else if let Some(hdr) = rmpp {
            field::set_field(mad, 0, MadField::RmppVersion, u32::from(hdr.version));
            field::set_field(mad, 0, MadField::RmppType, u32::from(hdr.rmpp_type));
            field::set_field(mad, 0, MadField::RmppRespTime, u32::from(hdr.resp_time));
            field::set_field(mad, 0, MadField::RmppFlags, u32::from(hdr.flags));
            field::set_field(mad, 0, MadField::RmppStatus, u32::from(hdr.status));
            field::set_field(mad, 0, MadField::RmppD1, hdr.d1);
            field::set_field(mad, 0, MadField::RmppD2, hdr.d2);
        }

        if rpc.mgmt_class == MgmtClass::SUBN_ADM {
            field::set_field64(mad, 0, MadField::SaComponentMask, rpc.mask);
        }

        // At most `data_size` bytes of the payload go on the wire.
        if let Some(payload) = payload {
            let len = payload.len().min(rpc.data_size);
            mad[rpc.data_offset..rpc.data_offset + len].copy_from_slice(&payload[..len]);
        }

        datagram.length = MAD_SIZE;
        Ok(MAD_SIZE)
    }
}
