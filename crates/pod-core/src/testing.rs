//! In-memory test fixtures, available to this crate's own unit tests
//! unconditionally and to downstream crates behind the `test-support`
//! feature — mirroring how fixture helpers are kept next to the code they
//! exercise rather than duplicated per consumer.

use std::sync::Mutex;

use crate::frame::Frame;
use crate::transport::{Transport, TransportError};

/// A [`Transport`] that records every outbound frame and serves inbound
/// frames from a pre-loaded queue, so dispatcher/scheduler tests don't
/// need real stdio or sockets.
pub struct MemoryTransport {
    inbound: Mutex<Vec<Frame>>,
    outbound: Mutex<Vec<Frame>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport { inbound: Mutex::new(Vec::new()), outbound: Mutex::new(Vec::new()) }
    }

    /// Queues frames to be returned by `read_frame`, in order.
    pub fn with_inbound(frames: Vec<Frame>) -> Self {
        let mut frames = frames;
        frames.reverse();
        MemoryTransport { inbound: Mutex::new(frames), outbound: Mutex::new(Vec::new()) }
    }

    pub fn written(&self) -> Vec<Frame> {
        self.outbound.lock().expect("outbound mutex poisoned").clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn read_frame(&self) -> Result<Frame, TransportError> {
        self.inbound
            .lock()
            .expect("inbound mutex poisoned")
            .pop()
            .ok_or_else(|| TransportError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no more queued frames")))
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        self.outbound.lock().expect("outbound mutex poisoned").push(frame.clone());
        Ok(())
    }
}
