//! The single-attempt exchange: send a built datagram and wait for the
//! response carrying the same transaction identifier, re-sending on timeout.
//!
//! Only the absence of a response drives a retry. Send and receive failures
//! abort immediately, and any delivered response is handed back with its
//! completion status for the caller to interpret.

use madrpc_core::{
    capture::CaptureHook,
    config::Config,
    error::{ErrorKind, Result},
    transport::{AgentId, Channel, CompletionStatus, Datagram},
};
use madrpc_protocol::{dump::hex_dump, field::transaction_id};
use tracing::{trace, warn};

use crate::time::Clock;

/// A built request and how to deliver it.
#[derive(Debug)]
pub struct ExchangeRequest<'a> {
    /// The datagram to send; its transaction identifier is read once.
    pub datagram: &'a Datagram,
    /// Agent registered for the request's class.
    pub agent: AgentId,
    /// Timeout for each send and each receive.
    pub timeout_ms: i32,
    /// Attempts before giving up; must be positive.
    pub max_attempts: i32,
}

/// A matched response.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    /// Length of the received datagram.
    pub length: usize,
    /// Completion status reported by the transport.
    pub status: CompletionStatus,
    /// Attempt (1-based) that produced the response.
    pub attempt: u32,
}

/// Sends `request` and waits for its response in `response`.
///
/// `capture`, when armed, receives a copy of the first send only.
pub fn exchange<C: Channel + ?Sized>(
    channel: &mut C,
    request: &ExchangeRequest<'_>,
    response: &mut Datagram,
    mut capture: Option<CaptureHook>,
    config: &Config,
    clock: &dyn Clock,
) -> Result<Exchange> {
    let send = request.datagram;

    if config.dump_buffers() {
        trace!("sending: len {}", send.length);
        trace!("{}", hex_dump("send buf", send.payload()));
    }

    if request.max_attempts <= 0 {
        report!(config, "max attempts {} <= 0", request.max_attempts);
        return Err(ErrorKind::InvalidArgument(format!(
            "max attempts {} <= 0",
            request.max_attempts
        )));
    }

    let tid = transaction_id(send.mad());
    let started = clock.now();

    for attempt in 1..=request.max_attempts as u32 {
        if attempt > 1 {
            report!(config, "retry {} (timeout {} ms)", attempt - 1, request.timeout_ms);
        }

        if let Some(hook) = capture.take() {
            hook.record(send.payload());
        }

        if let Err(err) = channel.send(request.agent, send, request.timeout_ms) {
            warn!("send failed; {}", err);
            return Err(ErrorKind::Transport(err));
        }

        if !receive_matching(channel, response, tid, request.timeout_ms, config)? {
            continue;
        }

        match response.completion() {
            // The transport's own verdict that the request went unanswered.
            CompletionStatus::TimedOut => continue,
            status => return Ok(Exchange { length: response.length, status, attempt }),
        }
    }

    let waited = clock.elapsed_since(started);
    report!(config, "timeout after {} retries, {} ms", request.max_attempts, waited.as_millis());
    Err(ErrorKind::Timeout { attempts: request.max_attempts as u32, waited })
}

/// Receives until a datagram carries `tid`. Returns `false` on timeout.
fn receive_matching<C: Channel + ?Sized>(
    channel: &mut C,
    response: &mut Datagram,
    tid: u32,
    timeout_ms: i32,
    config: &Config,
) -> Result<bool> {
    loop {
        let length = match channel.recv(response, timeout_ms) {
            Ok(Some(length)) => length,
            Ok(None) => return Ok(false),
            Err(err) => {
                warn!("recv failed: {}", err);
                return Err(ErrorKind::Transport(err));
            }
        };
        response.length = length;

        if config.dump_addresses() {
            trace!("rcv addr: {:?}", response.addr);
        }
        if config.dump_buffers() {
            trace!("{}", hex_dump("rcv buf", response.mad()));
        }

        let received = transaction_id(response.mad());
        if received == tid {
            return Ok(true);
        }
        trace!("discarding datagram with tid {:#x}, expecting {:#x}", received, tid);
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io};

    use madrpc_core::{capture::MadCapture, class::MgmtClass, constants::errno};
    use madrpc_protocol::field::{set_field64, MadField};

    use super::*;
    use crate::time::SystemClock;

    enum Step {
        Reply { tid: u64, status: i32 },
        Silence,
        Fail,
    }

    #[derive(Default)]
    struct ScriptedChannel {
        steps: VecDeque<Step>,
        sends: usize,
        fail_send: bool,
    }

    impl ScriptedChannel {
        fn with(steps: Vec<Step>) -> Self {
            Self { steps: steps.into(), ..Default::default() }
        }
    }

    impl Channel for ScriptedChannel {
        fn port_id(&self) -> i32 {
            0
        }

        fn register_agent(&mut self, _class: MgmtClass, _rmpp_version: u8) -> io::Result<AgentId> {
            Ok(0)
        }

        fn send(&mut self, _agent: AgentId, _datagram: &Datagram, _timeout_ms: i32) -> io::Result<()> {
            self.sends += 1;
            if self.fail_send {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "send"));
            }
            Ok(())
        }

        fn recv(&mut self, datagram: &mut Datagram, _timeout_ms: i32) -> io::Result<Option<usize>> {
            match self.steps.pop_front() {
                Some(Step::Reply { tid, status }) => {
                    datagram.clear();
                    set_field64(datagram.mad_mut(), 0, MadField::Tid, tid);
                    datagram.status = status;
                    Ok(Some(256))
                }
                Some(Step::Fail) => Err(io::Error::new(io::ErrorKind::Other, "recv")),
                Some(Step::Silence) | None => Ok(None),
            }
        }

        fn close(&mut self) {}
    }

    fn request_with_tid(tid: u64) -> Datagram {
        let mut datagram = Datagram::new();
        set_field64(datagram.mad_mut(), 0, MadField::Tid, tid);
        datagram.length = 256;
        datagram
    }

    fn run(channel: &mut ScriptedChannel, send: &Datagram, attempts: i32) -> Result<Exchange> {
        let request = ExchangeRequest { datagram: send, agent: 1, timeout_ms: 10, max_attempts: attempts };
        let mut response = Datagram::new();
        exchange(channel, &request, &mut response, None, &Config::default(), &SystemClock)
    }

    #[test]
    fn test_zero_attempts_is_invalid_without_send() {
        let mut channel = ScriptedChannel::default();
        let send = request_with_tid(1);

        for attempts in [0, -1] {
            let err = run(&mut channel, &send, attempts).unwrap_err();
            assert!(matches!(err, ErrorKind::InvalidArgument(_)));
        }
        assert_eq!(channel.sends, 0);
    }

    #[test]
    fn test_silence_sends_exactly_max_attempts() {
        for attempts in 1..=4 {
            let mut channel = ScriptedChannel::default();
            let err = run(&mut channel, &request_with_tid(1), attempts).unwrap_err();
            assert!(matches!(err, ErrorKind::Timeout { attempts: a, .. } if a == attempts as u32));
            assert_eq!(channel.sends, attempts as usize);
        }
    }

    #[test]
    fn test_mismatched_tid_is_discarded() {
        let mut channel = ScriptedChannel::with(vec![
            Step::Reply { tid: 0x99, status: 0 },
            Step::Reply { tid: 0x98, status: 0 },
            Step::Reply { tid: 0x42, status: 0 },
        ]);

        let exchange = run(&mut channel, &request_with_tid(0x42), 3).unwrap();

        assert_eq!(exchange.status, CompletionStatus::Success);
        assert_eq!(exchange.attempt, 1);
        assert_eq!(channel.sends, 1);
    }

    #[test]
    fn test_only_low_32_bits_of_tid_are_compared() {
        let mut channel = ScriptedChannel::with(vec![Step::Reply { tid: 0xffff_0000_0000_0042, status: 0 }]);
        assert!(run(&mut channel, &request_with_tid(0x42), 1).is_ok());
    }

    #[test]
    fn test_no_resources_is_success() {
        let mut channel = ScriptedChannel::with(vec![Step::Reply { tid: 7, status: errno::ENOMEM }]);
        let exchange = run(&mut channel, &request_with_tid(7), 3).unwrap();
        assert_eq!(exchange.status, CompletionStatus::NoResources);
        assert_eq!(channel.sends, 1);
    }

    #[test]
    fn test_other_status_is_returned_not_retried() {
        let mut channel = ScriptedChannel::with(vec![Step::Reply { tid: 7, status: 71 }]);
        let exchange = run(&mut channel, &request_with_tid(7), 3).unwrap();
        assert_eq!(exchange.status, CompletionStatus::Failed(71));
        assert_eq!(channel.sends, 1);
    }

    #[test]
    fn test_timed_out_completion_triggers_retry() {
        let mut channel = ScriptedChannel::with(vec![
            Step::Reply { tid: 7, status: errno::ETIMEDOUT },
            Step::Silence,
            Step::Reply { tid: 7, status: 0 },
        ]);
        let exchange = run(&mut channel, &request_with_tid(7), 3).unwrap();
        assert_eq!(exchange.attempt, 3);
        assert_eq!(channel.sends, 3);
    }

    #[test]
    fn test_send_failure_is_not_retried() {
        let mut channel = ScriptedChannel { fail_send: true, ..Default::default() };
        let err = run(&mut channel, &request_with_tid(1), 3).unwrap_err();
        assert!(matches!(err, ErrorKind::Transport(_)));
        assert_eq!(channel.sends, 1);
    }

    #[test]
    fn test_recv_failure_aborts() {
        let mut channel = ScriptedChannel::with(vec![Step::Fail]);
        let err = run(&mut channel, &request_with_tid(1), 3).unwrap_err();
        assert!(matches!(err, ErrorKind::Transport(_)));
        assert_eq!(channel.sends, 1);
    }

    #[test]
    fn test_capture_records_first_send_only() {
        let mut channel = ScriptedChannel::default();
        let send = request_with_tid(0x55);
        let capture = MadCapture::new();
        let hook = CaptureHook::new(capture.clone(), 16);
        let request = ExchangeRequest { datagram: &send, agent: 1, timeout_ms: 10, max_attempts: 2 };
        let mut response = Datagram::new();

        let _ = exchange(&mut channel, &request, &mut response, Some(hook), &Config::default(), &SystemClock);

        let captured = capture.take().unwrap();
        assert_eq!(captured.len(), 16);
        assert_eq!(&captured[8..16], &0x55u64.to_be_bytes());
        assert!(!capture.is_filled());
        assert_eq!(channel.sends, 2);
    }
}
