//! Requests carrying a transfer-control (RMPP) header.

use madrpc_core::{
    constants::RMPP_VERSION,
    error::{ErrorKind, Result},
    transport::{Channel, Datagram},
};
use madrpc_protocol::{
    field::MadField,
    types::{PortId, RmppHeader, RpcRequest},
};
use tracing::{debug, warn};

use crate::{context::TransactionContext, rpc::copy_payload, RpcOutcome};

impl<C: Channel> TransactionContext<C> {
    /// Sends `rpc` with the transfer header `rmpp` and reads the response
    /// header back into it.
    ///
    /// Redirects are not followed. `data` is both the outgoing payload and the
    /// buffer the response payload is copied into.
    pub fn request_rmpp(
        &mut self,
        rpc: &mut RpcRequest,
        dport: &PortId,
        mut rmpp: Option<&mut RmppHeader>,
        mut data: Option<&mut [u8]>,
    ) -> Result<RpcOutcome> {
        rpc.record_error(0);
        let mut send = Datagram::new();
        let mut recv = Datagram::new();

        let header = rmpp.as_deref().copied();
        let exchange = self.transact(rpc, dport, header.as_ref(), data.as_deref(), &mut send, &mut recv)?;

        let mad = recv.mad();
        let status = self.codec.get_field(mad, 0, MadField::Status);
        rpc.rstatus = status;
        if status != 0 {
            report!(self.config, "MAD completed with error status {:#x}; dport ({})", status, dport);
            return Err(ErrorKind::RemoteStatus { status, dport: dport.to_string() });
        }

        if let Some(hdr) = rmpp.as_deref_mut() {
            hdr.flags = self.codec.get_field(mad, 0, MadField::RmppFlags) as u8;
            let version = self.codec.get_field(mad, 0, MadField::RmppVersion);
            if hdr.is_active() && version != RMPP_VERSION {
                warn!("bad rmpp version {}", version);
                let err = ErrorKind::UnsupportedVersion(version);
                rpc.record_error(err.errno());
                return Err(err);
            }
            hdr.rmpp_type = self.codec.get_field(mad, 0, MadField::RmppType) as u8;
            hdr.status = self.codec.get_field(mad, 0, MadField::RmppStatus) as u8;
            debug!("rmpp type {} status {}", hdr.rmpp_type, hdr.status);
            hdr.d1 = self.codec.get_field(mad, 0, MadField::RmppD1);
            hdr.d2 = self.codec.get_field(mad, 0, MadField::RmppD2);
        }

        if let Some(out) = data.as_deref_mut() {
            copy_payload(mad, rpc, out);
        }

        rpc.rec_size = self.codec.get_field(mad, 0, MadField::SaAttrOffset);

        Ok(RpcOutcome { length: exchange.length, redirects: Vec::new() })
    }
}
