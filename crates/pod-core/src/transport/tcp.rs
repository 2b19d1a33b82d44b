use std::io::BufReader;
use std::net::{TcpListener, TcpStream};

use crate::frame::Frame;

use super::{FramedChannel, Transport, TransportError};

/// TCP transport for the `babashka.pod.transport=socket` launch mode.
/// Binds once, accepts exactly one connection (babashka only ever opens
/// one), and serves frames over it for the remainder of the pod's life.
pub struct TcpTransport {
    channel: FramedChannel<BufReader<TcpStream>, TcpStream>,
    local_port: u16,
}

impl TcpTransport {
    /// Binds to `addr` (use port `0` for an ephemeral port) and blocks
    /// until a single peer connects.
    pub fn bind_and_accept(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        let local_port = listener.local_addr()?.port();
        let (stream, _peer) = listener.accept()?;
        let read_half = stream.try_clone()?;
        Ok(TcpTransport {
            channel: FramedChannel::new(BufReader::new(read_half), stream),
            local_port,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Transport for TcpTransport {
    fn read_frame(&self) -> Result<Frame, TransportError> {
        self.channel.read_frame()
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        self.channel.write_frame(frame)
    }
}
