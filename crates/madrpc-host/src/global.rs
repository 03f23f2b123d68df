//! Process-wide default context.
//!
//! Callers that don't want to thread a [`TransactionContext`] through their
//! code can install one here with [`init`] or [`init_with`] and use the free
//! functions below. Every call locks the slot for its whole duration, so
//! concurrent callers are serialised. Nothing is opened implicitly: calls made
//! before `init` or after [`shutdown`] fail with
//! [`ErrorKind::NotInitialized`].

use std::io;

use madrpc_core::{
    capture::MadCapture,
    class::MgmtClass,
    config::Config,
    error::{ErrorKind, Result},
    transport::{Channel, ChannelPair, Transport},
};
use madrpc_protocol::types::{PortId, RmppHeader, RpcRequest};
use parking_lot::{const_mutex, Mutex};
use tracing::debug;

use crate::{context::TransactionContext, RpcOutcome};

/// Channel type held by the default context.
pub type DefaultChannel = Box<dyn Channel + Send>;

/// Context type held by the default slot.
pub type DefaultContext = TransactionContext<DefaultChannel>;

static DEFAULT: Mutex<Option<DefaultContext>> = const_mutex(None);

/// Opens channels through `T` and boxes them for the default slot.
struct Boxed<'a, T>(&'a mut T);

impl<T> Transport for Boxed<'_, T>
where
    T: Transport,
    T::Channel: Send + 'static,
{
    type Channel = DefaultChannel;

    fn open(&mut self, device: Option<&str>, port: u32) -> io::Result<DefaultChannel> {
        let channel = self.0.open(device, port)?;
        Ok(Box::new(channel))
    }

    fn resolve_pair(&mut self, device: Option<&str>, port: u32, enforce_smi: bool) -> io::Result<ChannelPair> {
        self.0.resolve_pair(device, port, enforce_smi)
    }
}

/// Installs `context` as the default, closing any context it replaces.
pub fn init(context: DefaultContext) {
    let previous = DEFAULT.lock().replace(context);
    if previous.is_some() {
        debug!("replacing default context");
    }
}

/// Opens a context through `transport` and installs it as the default.
pub fn init_with<T>(
    transport: &mut T,
    device: Option<&str>,
    port: u32,
    classes: &[MgmtClass],
    config: Config,
) -> Result<()>
where
    T: Transport,
    T::Channel: Send + 'static,
{
    let context = TransactionContext::open_with_config(&mut Boxed(transport), device, port, classes, config)?;
    init(context);
    Ok(())
}

/// Whether a default context is installed.
pub fn is_initialized() -> bool {
    DEFAULT.lock().is_some()
}

/// Runs `f` against the default context while holding its lock.
pub fn with_default<R>(f: impl FnOnce(&mut DefaultContext) -> Result<R>) -> Result<R> {
    let mut slot = DEFAULT.lock();
    let context = slot.as_mut().ok_or(ErrorKind::NotInitialized)?;
    f(context)
}

/// [`TransactionContext::request`] on the default context.
pub fn madrpc(
    rpc: &mut RpcRequest,
    dport: &mut PortId,
    payload: Option<&[u8]>,
    rcvdata: Option<&mut [u8]>,
) -> Result<RpcOutcome> {
    with_default(|context| context.request(rpc, dport, payload, rcvdata))
}

/// [`TransactionContext::request_rmpp`] on the default context.
pub fn madrpc_rmpp(
    rpc: &mut RpcRequest,
    dport: &PortId,
    rmpp: Option<&mut RmppHeader>,
    data: Option<&mut [u8]>,
) -> Result<RpcOutcome> {
    with_default(|context| context.request_rmpp(rpc, dport, rmpp, data))
}

/// Sets the default context's attempt count; returns the value in effect.
pub fn set_retries(retries: i32) -> Result<i32> {
    with_default(|context| Ok(context.set_retries(retries)))
}

/// Sets the default context's per-attempt timeout.
pub fn set_timeout(timeout_ms: i32) -> Result<()> {
    with_default(|context| {
        context.set_timeout(timeout_ms);
        Ok(())
    })
}

/// Arms a capture of the next MAD sent through the default context.
pub fn save_next_mad(max_len: Option<usize>) -> Result<MadCapture> {
    with_default(|context| Ok(context.save_next_mad(max_len)))
}

/// Closes and removes the default context. Returns whether one was installed.
pub fn shutdown() -> bool {
    let previous = DEFAULT.lock().take();
    match previous {
        Some(context) => {
            context.close();
            true
        }
        None => false,
    }
}
