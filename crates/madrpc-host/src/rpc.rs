//! Request orchestration with address-based redirect handling.

use madrpc_core::{
    constants::MAD_STS_REDIRECT,
    error::{ErrorKind, Result},
    transport::{Channel, Datagram},
};
use madrpc_protocol::{
    field::{MadField, DATA_AREA_OFFSET},
    types::{PortId, RmppHeader, RpcRequest},
};
use tracing::{debug, warn};

use crate::{
    context::TransactionContext,
    exchange::{exchange, Exchange, ExchangeRequest},
};

/// Result of a successful request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RpcOutcome {
    /// Length of the final response datagram.
    pub length: usize,
    /// Destinations the request was redirected to, in order. The last entry,
    /// if any, is where the final response came from.
    pub redirects: Vec<PortId>,
}

impl<C: Channel> TransactionContext<C> {
    /// Sends `rpc` to `dport` and copies the response payload into `rcvdata`.
    ///
    /// A response with the exact redirect status moves `dport` to the
    /// advertised port and sends again. Any other nonzero remote status fails
    /// with [`ErrorKind::RemoteStatus`].
    pub fn request(
        &mut self,
        rpc: &mut RpcRequest,
        dport: &mut PortId,
        payload: Option<&[u8]>,
        rcvdata: Option<&mut [u8]>,
    ) -> Result<RpcOutcome> {
        rpc.record_error(0);
        let mut send = Datagram::new();
        let mut recv = Datagram::new();
        let mut redirects = Vec::new();

        let (length, status) = loop {
            let exchange = self.transact(rpc, dport, None, payload, &mut send, &mut recv)?;
            let status = self.codec.get_field(recv.mad(), 0, MadField::DrsmpStatus);
            if status != MAD_STS_REDIRECT {
                break (exchange.length, status);
            }

            rpc.rstatus = status;
            let next = match self.redirect_target(recv.mad(), dport) {
                Ok(next) => next,
                Err(err) => {
                    rpc.record_error(err.errno());
                    return Err(err);
                }
            };
            if redirects.len() as u32 >= self.config.max_redirects {
                report!(self.config, "redirect limit {} reached; dport ({})", self.config.max_redirects, dport);
                let err = ErrorKind::TooManyRedirects { hops: redirects.len() as u32 };
                rpc.record_error(err.errno());
                return Err(err);
            }
            debug!("redirected to {}", next);
            *dport = next;
            redirects.push(next);
        };

        rpc.rstatus = status;
        if status != 0 {
            report!(self.config, "MAD completed with error status {:#x}; dport ({})", status, dport);
            return Err(ErrorKind::RemoteStatus { status, dport: dport.to_string() });
        }

        if let Some(rcvdata) = rcvdata {
            copy_payload(recv.mad(), rpc, rcvdata);
        }

        Ok(RpcOutcome { length, redirects })
    }

    /// Reads the redirect target out of a ClassPortInfo response.
    fn redirect_target(&self, mad: &[u8], dport: &PortId) -> Result<PortId> {
        let lid = self.codec.get_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectLid);
        if lid == 0 {
            warn!("GID-based redirection is not supported");
            return Err(ErrorKind::UnsupportedRedirect { dport: dport.to_string() });
        }

        Ok(PortId {
            lid: lid as u16,
            qp: self.codec.get_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectQp),
            qkey: self.codec.get_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectQkey),
            sl: self.codec.get_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectSl) as u8,
        })
    }

    /// Builds `rpc` and runs one exchange, recording failures on the descriptor.
    pub(crate) fn transact(
        &mut self,
        rpc: &mut RpcRequest,
        dport: &PortId,
        rmpp: Option<&RmppHeader>,
        payload: Option<&[u8]>,
        send: &mut Datagram,
        recv: &mut Datagram,
    ) -> Result<Exchange> {
        self.codec.build(send, rpc, dport, rmpp, payload)?;

        let agent = self.agent_for(rpc.mgmt_class)?;
        let request = ExchangeRequest {
            datagram: send,
            agent,
            timeout_ms: self.effective_timeout(rpc.timeout_ms),
            max_attempts: self.retries(),
        };
        let capture = self.take_capture();

        let result = exchange(
            &mut self.channel,
            &request,
            recv,
            capture,
            &self.config,
            self.clock.as_ref(),
        )
        .and_then(|exchange| {
            if exchange.status.is_delivered() {
                Ok(exchange)
            } else {
                Err(ErrorKind::Completion(exchange.status.to_raw()))
            }
        });

        if let Err(err) = &result {
            rpc.record_error(err.errno());
            warn!("exchange failed; dport ({}): {}", dport, err);
        }
        result
    }
}

/// Copies the response payload window into the caller's buffer.
pub(crate) fn copy_payload(mad: &[u8], rpc: &RpcRequest, out: &mut [u8]) {
    let start = rpc.data_offset.min(mad.len());
    let end = rpc.data_offset.saturating_add(rpc.data_size).min(mad.len());
    let len = (end - start).min(out.len());
    out[..len].copy_from_slice(&mad[start..start + len]);
}
