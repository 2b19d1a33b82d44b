use std::io::{self, BufReader, Stdin, Stdout};

use crate::frame::Frame;

use super::{FramedChannel, Transport, TransportError};

/// The default transport: frames read from stdin, frames written to
/// stdout. This is how babashka itself launches a pod subprocess.
pub struct StdioTransport {
    channel: FramedChannel<BufReader<Stdin>, Stdout>,
}

impl StdioTransport {
    pub fn new() -> Self {
        StdioTransport { channel: FramedChannel::new(BufReader::new(io::stdin()), io::stdout()) }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn read_frame(&self) -> Result<Frame, TransportError> {
        self.channel.read_frame()
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        self.channel.write_frame(frame)
    }
}
