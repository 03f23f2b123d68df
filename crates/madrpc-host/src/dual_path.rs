//! A pair of transaction contexts: one on the subnet-management interface
//! (SMI) for SMP classes, one on the general-services interface (GSI) for
//! everything else.

use std::{fmt, io, sync::Arc};

use madrpc_core::{
    class::MgmtClass,
    config::Config,
    error::{ErrorKind, Result},
    transport::{Channel, ChannelIdentity, ChannelPair, Transport},
};
use madrpc_protocol::types::{PortId, RmppHeader, RpcRequest};
use tracing::{debug, warn};

use crate::{
    context::{check_class_count, TransactionContext},
    time::{Clock, SystemClock},
    RpcOutcome,
};

/// Two contexts resolved from one device.
///
/// Each side closes its own channel when dropped, so a pair that fails halfway
/// through construction never leaks an open channel.
pub struct DualPathContext<C: Channel> {
    smi: Option<TransactionContext<C>>,
    gsi: TransactionContext<C>,
    pair: ChannelPair,
    enforce_smi: bool,
}

impl<C: Channel> fmt::Debug for DualPathContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualPathContext")
            .field("smi", &self.smi)
            .field("gsi", &self.gsi)
            .field("pair", &self.pair)
            .field("enforce_smi", &self.enforce_smi)
            .finish()
    }
}

impl<C: Channel> DualPathContext<C> {
    /// Opens both paths of `device` and registers `classes`, with default configuration.
    pub fn open<T>(
        transport: &mut T,
        device: Option<&str>,
        port: u32,
        classes: &[MgmtClass],
        enforce_smi: bool,
    ) -> Result<Self>
    where
        T: Transport<Channel = C>,
    {
        Self::open_with_config(transport, device, port, classes, enforce_smi, Config::from_env())
    }

    /// Opens both paths of `device` and registers `classes`.
    pub fn open_with_config<T>(
        transport: &mut T,
        device: Option<&str>,
        port: u32,
        classes: &[MgmtClass],
        enforce_smi: bool,
        config: Config,
    ) -> Result<Self>
    where
        T: Transport<Channel = C>,
    {
        Self::open_with_config_and_clock(
            transport,
            device,
            port,
            classes,
            enforce_smi,
            config,
            Arc::new(SystemClock::default()),
        )
    }

    /// Opens both paths with a custom clock, for testing.
    ///
    /// Without `enforce_smi` a missing or unopenable SMI endpoint is tolerated
    /// and SMP classes are served by the GSI path instead.
    pub fn open_with_config_and_clock<T>(
        transport: &mut T,
        device: Option<&str>,
        port: u32,
        classes: &[MgmtClass],
        enforce_smi: bool,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self>
    where
        T: Transport<Channel = C>,
    {
        check_class_count(classes)?;

        let pair = transport.resolve_pair(device, port, enforce_smi).map_err(|err| {
            warn!("can't resolve channel pair ({}:{}): {}", device.unwrap_or("(default)"), port, err);
            ErrorKind::Init(err)
        })?;

        let smi = match &pair.smi {
            Some(identity) => match open_side(transport, identity, &config, &clock) {
                Ok(context) => Some(context),
                Err(err) if enforce_smi => {
                    warn!("can't open SMI channel ({}:{})", identity.device, identity.port);
                    return Err(err);
                }
                Err(err) => {
                    debug!("SMI channel unavailable, continuing on GSI: {}", err);
                    None
                }
            },
            None if enforce_smi => {
                warn!("no SMI channel for ({}:{})", device.unwrap_or("(default)"), port);
                return Err(ErrorKind::Init(io::Error::new(
                    io::ErrorKind::NotFound,
                    "device has no SMI endpoint",
                )));
            }
            None => None,
        };

        // `smi` is dropped, and its channel closed, if this fails.
        let gsi = open_side(transport, &pair.gsi, &config, &clock).map_err(|err| {
            warn!("can't open GSI channel ({}:{})", pair.gsi.device, pair.gsi.port);
            err
        })?;

        let mut context = Self { smi, gsi, pair, enforce_smi };
        for &class in classes {
            match context.context_for_mut(class) {
                Some(side) => {
                    side.register(class)?;
                }
                None => {
                    warn!("required channel for SMI is unavailable");
                    return Err(ErrorKind::Registration {
                        class,
                        source: io::Error::new(io::ErrorKind::NotFound, "no SMI channel"),
                    });
                }
            }
        }
        Ok(context)
    }

    /// Context that serves `class`, or `None` when it needs an SMI path that
    /// is absent and required.
    pub fn context_for(&self, class: MgmtClass) -> Option<&TransactionContext<C>> {
        match (class.is_smi(), self.smi.as_ref()) {
            (false, _) => Some(&self.gsi),
            (true, Some(smi)) => Some(smi),
            (true, None) if self.enforce_smi => None,
            (true, None) => Some(&self.gsi),
        }
    }

    /// Mutable access to the context that serves `class`.
    pub fn context_for_mut(&mut self, class: MgmtClass) -> Option<&mut TransactionContext<C>> {
        match (class.is_smi(), self.smi.as_mut()) {
            (false, _) => Some(&mut self.gsi),
            (true, Some(smi)) => Some(smi),
            (true, None) if self.enforce_smi => None,
            (true, None) => Some(&mut self.gsi),
        }
    }

    fn routed(&mut self, class: MgmtClass) -> Result<&mut TransactionContext<C>> {
        self.context_for_mut(class)
            .ok_or_else(|| ErrorKind::InvalidArgument(format!("no SMI channel for class {}", class)))
    }

    /// Sends `rpc` on the path serving its class. See [`TransactionContext::request`].
    pub fn request(
        &mut self,
        rpc: &mut RpcRequest,
        dport: &mut PortId,
        payload: Option<&[u8]>,
        rcvdata: Option<&mut [u8]>,
    ) -> Result<RpcOutcome> {
        self.routed(rpc.mgmt_class)?.request(rpc, dport, payload, rcvdata)
    }

    /// Sends `rpc` with a transfer header on the path serving its class.
    /// See [`TransactionContext::request_rmpp`].
    pub fn request_rmpp(
        &mut self,
        rpc: &mut RpcRequest,
        dport: &PortId,
        rmpp: Option<&mut RmppHeader>,
        data: Option<&mut [u8]>,
    ) -> Result<RpcOutcome> {
        self.routed(rpc.mgmt_class)?.request_rmpp(rpc, dport, rmpp, data)
    }

    /// The SMI context, if that path is open.
    pub fn smi(&self) -> Option<&TransactionContext<C>> {
        self.smi.as_ref()
    }

    /// The GSI context.
    pub fn gsi(&self) -> &TransactionContext<C> {
        &self.gsi
    }

    /// Endpoints the device resolved to.
    pub fn pair(&self) -> &ChannelPair {
        &self.pair
    }

    /// Closes both channels.
    pub fn close(self) {
        drop(self);
    }
}

fn open_side<T: Transport>(
    transport: &mut T,
    identity: &ChannelIdentity,
    config: &Config,
    clock: &Arc<dyn Clock>,
) -> Result<TransactionContext<T::Channel>> {
    let channel = transport
        .open(Some(&identity.device), identity.port)
        .map_err(ErrorKind::Init)?;
    Ok(TransactionContext::from_channel(channel, config.clone(), Arc::clone(clock)))
}
