//! Scripted transport and simulated clock shared by the integration suites.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use madrpc_core::{
    class::MgmtClass,
    config::Config,
    transport::{AgentId, Channel, ChannelIdentity, ChannelPair, Datagram, MadAddress, Transport},
};
use madrpc_host::{time::Clock, DualPathContext, TransactionContext};
use madrpc_protocol::{
    field::{get_field64, set_field, set_field64, MadField, DATA_AREA_OFFSET},
    method,
    PortId, RmppHeader,
};
use parking_lot::Mutex;

pub const DEVICE: &str = "fake0";

/// A clock that only moves when a channel waits out a timeout.
pub struct SimClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// What a channel does on its next receive.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Answer the last request.
    Respond(Response),
    /// Answer with a transaction identifier nobody asked for.
    Stale,
    /// Nothing arrives before the timeout.
    Silence,
    /// The receive itself fails.
    Fail,
}

/// Contents of a scripted response.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub mad_status: u16,
    pub completion: i32,
    pub redirect: Option<PortId>,
    pub data: Option<(usize, Vec<u8>)>,
    pub rmpp: Option<RmppHeader>,
    pub attr_offset: u16,
}

impl Response {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_data(offset: usize, bytes: &[u8]) -> Self {
        Self { data: Some((offset, bytes.to_vec())), ..Self::default() }
    }

    pub fn redirect(to: PortId) -> Self {
        Self { mad_status: 0x0002, redirect: Some(to), ..Self::default() }
    }

    pub fn status(mad_status: u16) -> Self {
        Self { mad_status, ..Self::default() }
    }

    pub fn completion(code: i32) -> Self {
        Self { completion: code, ..Self::default() }
    }
}

/// A datagram as it left a channel.
#[derive(Clone, Debug)]
pub struct Sent {
    pub device: String,
    pub agent: AgentId,
    pub addr: MadAddress,
    pub mad: Vec<u8>,
}

#[derive(Default)]
pub struct State {
    pub opens: usize,
    pub closes: usize,
    pub sent: Vec<Sent>,
    pub registrations: Vec<(String, MgmtClass, u8)>,
    scripts: HashMap<String, VecDeque<Reply>>,
    fail_open: HashSet<String>,
    refuse: HashSet<MgmtClass>,
    smi_missing: bool,
}

/// Transport whose channels replay per-device scripts.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
    offset: Arc<Mutex<Duration>>,
    base: Instant,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            base: Instant::now(),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(SimClock { base: self.base, offset: Arc::clone(&self.offset) })
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    pub fn script(&self, device: &str, replies: Vec<Reply>) {
        self.state.lock().scripts.entry(device.to_string()).or_default().extend(replies);
    }

    pub fn fail_open(&self, device: &str) {
        self.state.lock().fail_open.insert(device.to_string());
    }

    pub fn refuse(&self, class: MgmtClass) {
        self.state.lock().refuse.insert(class);
    }

    pub fn without_smi(&self) {
        self.state.lock().smi_missing = true;
    }

    pub fn stats(&self) -> parking_lot::MutexGuard<'_, State> {
        self.state.lock()
    }

    pub fn open_context(&mut self, classes: &[MgmtClass], config: Config) -> madrpc_core::error::Result<TransactionContext<FakeChannel>> {
        let clock = self.clock();
        TransactionContext::open_with_config_and_clock(self, Some(DEVICE), 1, classes, config, clock)
    }

    pub fn open_dual(
        &mut self,
        classes: &[MgmtClass],
        enforce_smi: bool,
    ) -> madrpc_core::error::Result<DualPathContext<FakeChannel>> {
        let clock = self.clock();
        DualPathContext::open_with_config_and_clock(self, Some(DEVICE), 1, classes, enforce_smi, quiet_config(), clock)
    }
}

/// Default configuration with a short timeout.
pub fn quiet_config() -> Config {
    Config { timeout_ms: 100, ..Config::default() }
}

pub fn smi_device() -> String {
    format!("{}_smi", DEVICE)
}

impl Transport for FakeTransport {
    type Channel = FakeChannel;

    fn open(&mut self, device: Option<&str>, _port: u32) -> io::Result<FakeChannel> {
        let device = device.unwrap_or(DEVICE).to_string();
        let mut state = self.state.lock();
        if state.fail_open.contains(&device) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("no such device {}", device)));
        }
        state.opens += 1;
        Ok(FakeChannel {
            id: state.opens as i32,
            device,
            state: Arc::clone(&self.state),
            offset: Arc::clone(&self.offset),
            last: None,
            next_agent: 0,
            closed: false,
        })
    }

    fn resolve_pair(&mut self, device: Option<&str>, port: u32, _enforce_smi: bool) -> io::Result<ChannelPair> {
        let device = device.unwrap_or(DEVICE);
        let smi = if self.state.lock().smi_missing {
            None
        } else {
            Some(ChannelIdentity { device: format!("{}_smi", device), port })
        };
        Ok(ChannelPair { smi, gsi: ChannelIdentity { device: device.to_string(), port } })
    }
}

pub struct FakeChannel {
    id: i32,
    device: String,
    state: Arc<Mutex<State>>,
    offset: Arc<Mutex<Duration>>,
    last: Option<(u64, u8, u8)>,
    next_agent: AgentId,
    closed: bool,
}

impl Channel for FakeChannel {
    fn port_id(&self) -> i32 {
        self.id
    }

    fn register_agent(&mut self, class: MgmtClass, rmpp_version: u8) -> io::Result<AgentId> {
        let mut state = self.state.lock();
        if state.refuse.contains(&class) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "class refused"));
        }
        state.registrations.push((self.device.clone(), class, rmpp_version));
        self.next_agent += 1;
        Ok(self.next_agent)
    }

    fn send(&mut self, agent: AgentId, datagram: &Datagram, _timeout_ms: i32) -> io::Result<()> {
        let mad = datagram.mad();
        self.last = Some((get_field64(mad, 0, MadField::Tid), mad[1], mad[3]));
        self.state.lock().sent.push(Sent {
            device: self.device.clone(),
            agent,
            addr: datagram.addr,
            mad: datagram.payload().to_vec(),
        });
        Ok(())
    }

    fn recv(&mut self, datagram: &mut Datagram, timeout_ms: i32) -> io::Result<Option<usize>> {
        let reply = self
            .state
            .lock()
            .scripts
            .get_mut(&self.device)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Silence);
        let (tid, class, req_method) = self.last.unwrap_or_default();

        let response = match reply {
            Reply::Silence => {
                *self.offset.lock() += Duration::from_millis(timeout_ms.max(0) as u64);
                return Ok(None);
            }
            Reply::Fail => return Err(io::Error::new(io::ErrorKind::ConnectionReset, "recv failed")),
            Reply::Stale => {
                datagram.clear();
                set_field64(datagram.mad_mut(), 0, MadField::Tid, tid.wrapping_add(0x1000));
                datagram.length = 256;
                return Ok(Some(256));
            }
            Reply::Respond(response) => response,
        };

        datagram.clear();
        datagram.status = response.completion;
        let mad = datagram.mad_mut();
        mad[0] = 1;
        mad[1] = class;
        mad[3] = req_method | method::RESPONSE;
        set_field64(mad, 0, MadField::Tid, tid);
        set_field(mad, 0, MadField::Status, u32::from(response.mad_status));

        if let Some(to) = response.redirect {
            set_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectLid, u32::from(to.lid));
            set_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectQp, to.qp);
            set_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectQkey, to.qkey);
            set_field(mad, DATA_AREA_OFFSET, MadField::CpiRedirectSl, u32::from(to.sl));
        }
        if let Some(hdr) = response.rmpp {
            set_field(mad, 0, MadField::RmppVersion, u32::from(hdr.version));
            set_field(mad, 0, MadField::RmppType, u32::from(hdr.rmpp_type));
            set_field(mad, 0, MadField::RmppFlags, u32::from(hdr.flags));
            set_field(mad, 0, MadField::RmppStatus, u32::from(hdr.status));
            set_field(mad, 0, MadField::RmppD1, hdr.d1);
            set_field(mad, 0, MadField::RmppD2, hdr.d2);
        }
        set_field(mad, 0, MadField::SaAttrOffset, u32::from(response.attr_offset));
        if let Some((offset, bytes)) = response.data {
            mad[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }

        datagram.length = 256;
        Ok(Some(256))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().closes += 1;
        }
    }
}
