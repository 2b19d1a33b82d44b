//! Transports (component B): the raw byte-level channel a pod reads
//! requests from and writes frames to.

mod portfile;
mod stdio;
mod tcp;

pub use portfile::{remove_portfile, spit_portfile, PortfileError};
pub use stdio::StdioTransport;
pub use tcp::TcpTransport;

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::frame::{decode_some, encode_to, Frame, FrameError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bidirectional, frame-oriented channel. Implementations serialize
/// concurrent writes internally: the scheduler calls `write_frame` from
/// whichever worker thread finishes an invocation step, so write ordering
/// between threads is only guaranteed to be atomic per-call, not globally
/// sequenced with reads.
pub trait Transport: Send + Sync {
    fn read_frame(&self) -> Result<Frame, TransportError>;
    fn write_frame(&self, frame: &Frame) -> Result<(), TransportError>;
}

/// Shared plumbing for transports backed by a `BufRead` + `Write` pair
/// behind a write mutex, used by both [`StdioTransport`] and
/// [`TcpTransport`].
pub(crate) struct FramedChannel<R, W> {
    reader: std::sync::Mutex<R>,
    writer: std::sync::Mutex<W>,
}

impl<R: BufRead, W: Write> FramedChannel<R, W> {
    pub(crate) fn new(reader: R, writer: W) -> Self {
        FramedChannel { reader: std::sync::Mutex::new(reader), writer: std::sync::Mutex::new(writer) }
    }

    pub(crate) fn read_frame(&self) -> Result<Frame, TransportError> {
        let mut guard = self.reader.lock().expect("reader mutex poisoned");
        Ok(decode_some(&mut *guard)?)
    }

    pub(crate) fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().expect("writer mutex poisoned");
        Ok(encode_to(&mut *guard, frame)?)
    }
}
