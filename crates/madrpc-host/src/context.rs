use std::{collections::HashMap, fmt, sync::Arc};

use madrpc_core::{
    capture::{CaptureHook, MadCapture},
    class::MgmtClass,
    config::Config,
    constants::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS, MAX_CLASS},
    error::{ErrorKind, Result},
    transport::{AgentId, Channel, Transport},
};
use madrpc_protocol::codec::{MadCodec, StandardCodec};
use tracing::debug;

use crate::time::{Clock, SystemClock};

/// An open channel plus the agents registered on it.
///
/// The context owns its channel: dropping the context (or calling
/// [`close`](Self::close)) releases it. Every exchange takes `&mut self`, so
/// sharing a context between threads needs an outer lock.
pub struct TransactionContext<C: Channel> {
    pub(crate) channel: C,
    agents: HashMap<MgmtClass, AgentId>,
    retries: i32,
    timeout_ms: i32,
    pub(crate) config: Config,
    pub(crate) codec: Box<dyn MadCodec + Send>,
    pub(crate) clock: Arc<dyn Clock>,
    capture: Option<CaptureHook>,
}

impl<C: Channel> fmt::Debug for TransactionContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("port_id", &self.channel.port_id())
            .field("agents", &self.agents)
            .field("retries", &self.retries)
            .field("timeout_ms", &self.timeout_ms)
            .field("config", &self.config)
            .field("codec", &"<codec>")
            .field("capture_armed", &self.capture.is_some())
            .finish()
    }
}

impl<C: Channel> TransactionContext<C> {
    /// Opens a channel and registers an agent per class, with default configuration.
    pub fn open<T>(
        transport: &mut T,
        device: Option<&str>,
        port: u32,
        classes: &[MgmtClass],
    ) -> Result<Self>
    where
        T: Transport<Channel = C>,
    {
        Self::open_with_config(transport, device, port, classes, Config::from_env())
    }

    /// Opens a channel and registers an agent per class.
    pub fn open_with_config<T>(
        transport: &mut T,
        device: Option<&str>,
        port: u32,
        classes: &[MgmtClass],
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
            config,
            Arc::new(SystemClock::default()),
        )
    }

    /// Opens a channel with a custom clock, for testing.
    ///
    /// Nothing is opened when `classes` exceeds the table capacity. If any
    /// registration fails the channel is closed before the error returns.
    pub fn open_with_config_and_clock<T>(
        transport: &mut T,
        device: Option<&str>,
        port: u32,
        classes: &[MgmtClass],
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self>
    where
        T: Transport<Channel = C>,
    {
        check_class_count(classes)?;

        let channel = transport.open(device, port).map_err(|err| {
            tracing::warn!("can't open channel ({}:{}): {}", device.unwrap_or("(default)"), port, err);
            ErrorKind::Init(err)
        })?;

        let mut context = Self::from_channel(channel, config, clock);
        for &class in classes {
            context.register(class)?;
        }
        Ok(context)
    }

    /// Wraps an already open channel with no agents registered.
    pub fn from_channel(channel: C, config: Config, clock: Arc<dyn Clock>) -> Self {
        let retries = if config.retries > 0 { config.retries } else { DEFAULT_RETRIES };
        let timeout_ms = config.timeout_ms;
        Self {
            channel,
            agents: HashMap::new(),
            retries,
            timeout_ms,
            config,
            codec: Box::new(StandardCodec::new()),
            clock,
            capture: None,
        }
    }

    /// Replaces the codec used to build requests and read responses.
    pub fn with_codec(mut self, codec: Box<dyn MadCodec + Send>) -> Self {
        self.codec = codec;
        self
    }

    /// Registers a delivery agent for `class`, replacing any earlier one.
    pub fn register(&mut self, class: MgmtClass) -> Result<AgentId> {
        let agent = self
            .channel
            .register_agent(class, class.rmpp_version())
            .map_err(|source| {
                tracing::warn!("client_register for mgmt class {} failed: {}", class, source);
                ErrorKind::Registration { class, source }
            })?;
        debug!("registered class {} as agent {}", class, agent);
        self.agents.insert(class, agent);
        Ok(agent)
    }

    /// Agent registered for `class`. Class 0 is never registered.
    pub fn class_agent(&self, class: MgmtClass) -> Option<AgentId> {
        if class.code() == 0 {
            return None;
        }
        self.agents.get(&class).copied()
    }

    pub(crate) fn agent_for(&self, class: MgmtClass) -> Result<AgentId> {
        self.class_agent(class).ok_or_else(|| {
            ErrorKind::InvalidArgument(format!("no agent registered for class {}", class))
        })
    }

    /// Identifier of the underlying channel.
    pub fn port_id(&self) -> i32 {
        self.channel.port_id()
    }

    /// Sets the attempt count. Non-positive values are ignored.
    ///
    /// Returns the attempt count in effect afterwards.
    pub fn set_retries(&mut self, retries: i32) -> i32 {
        if retries > 0 {
            self.retries = retries;
        }
        self.retries
    }

    /// Current attempt count.
    pub fn retries(&self) -> i32 {
        self.retries
    }

    /// Sets the default per-attempt timeout. Any value is accepted.
    pub fn set_timeout(&mut self, timeout_ms: i32) {
        self.timeout_ms = timeout_ms;
    }

    /// Current default per-attempt timeout.
    pub fn timeout(&self) -> i32 {
        self.timeout_ms
    }

    /// Timeout for a request: its override, else this context's, else the built-in default.
    pub fn effective_timeout(&self, override_ms: i32) -> i32 {
        if override_ms != 0 {
            override_ms
        } else if self.timeout_ms != 0 {
            self.timeout_ms
        } else {
            DEFAULT_TIMEOUT_MS
        }
    }

    /// Sets the diagnostic verbosity.
    pub fn set_debug_level(&mut self, level: i32) {
        self.config.debug_level = level;
    }

    /// Reports exchange failures at `warn` level regardless of debug level.
    pub fn show_errors(&mut self, show: bool) {
        self.config.show_errors = show;
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Arms a capture of the next outgoing MAD, truncated to `max_len` bytes
    /// (`None` uses the configured length).
    pub fn save_next_mad(&mut self, max_len: Option<usize>) -> MadCapture {
        let capture = MadCapture::new();
        let len = max_len.unwrap_or(self.config.capture_len);
        self.capture = Some(CaptureHook::new(capture.clone(), len));
        capture
    }

    pub(crate) fn take_capture(&mut self) -> Option<CaptureHook> {
        self.capture.take()
    }

    /// Closes the channel and releases the context.
    pub fn close(self) {
        drop(self);
    }
}

impl<C: Channel> Drop for TransactionContext<C> {
    fn drop(&mut self) {
        debug!("closing channel {}", self.channel.port_id());
        self.channel.close();
    }
}

pub(crate) fn check_class_count(classes: &[MgmtClass]) -> Result<()> {
    if classes.len() >= MAX_CLASS {
        tracing::warn!("too many classes {} requested", classes.len());
        return Err(ErrorKind::TooManyClasses { requested: classes.len(), max: MAX_CLASS });
    }
    Ok(())
}
