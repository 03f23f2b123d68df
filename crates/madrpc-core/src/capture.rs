//! One-shot capture of an outgoing MAD.
//!
//! A context can be armed to copy the next datagram it sends into a shared
//! buffer. The copy happens on the first send of the next exchange only;
//! retries of that exchange and later exchanges are not captured.
//!
//! # Examples
//! ```
//! use madrpc_core::capture::{CaptureHook, MadCapture};
//!
//! let capture = MadCapture::new();
//! let hook = CaptureHook::new(capture.clone(), 4);
//!
//! hook.record(&[1, 2, 3, 4, 5, 6]);
//! assert_eq!(capture.take(), Some(vec![1, 2, 3, 4]));
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

/// Shared handle to the bytes of a captured MAD.
#[derive(Clone, Debug, Default)]
pub struct MadCapture {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MadCapture {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether bytes have been captured and not yet taken.
    pub fn is_filled(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Takes the captured bytes, leaving the capture empty.
    pub fn take(&self) -> Option<Vec<u8>> {
        self.slot.lock().take()
    }

    fn fill(&self, bytes: Vec<u8>) {
        *self.slot.lock() = Some(bytes);
    }
}

/// An armed capture, consumed by the first send that sees it.
#[derive(Debug)]
pub struct CaptureHook {
    sink: MadCapture,
    max_len: usize,
}

impl CaptureHook {
    /// Arms `sink` to receive at most `max_len` bytes.
    pub fn new(sink: MadCapture, max_len: usize) -> Self {
        Self { sink, max_len }
    }

    /// Copies `mad` (truncated) into the sink and disarms the hook.
    pub fn record(self, mad: &[u8]) {
        let len = self.max_len.min(mad.len());
        self.sink.fill(mad[..len].to_vec());
    }
}
