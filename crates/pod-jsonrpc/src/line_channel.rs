//! Line-oriented byte channels the JSON-RPC adapter speaks over: one JSON
//! value per line, newline-terminated, mirroring how the bencode
//! transports share a single write mutex but split read/write ownership.

use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;

pub trait LineChannel: Send + Sync {
    fn read_line(&self) -> io::Result<Option<String>>;
    fn write_line(&self, line: &str) -> io::Result<()>;
}

pub struct StdioLineChannel {
    reader: Mutex<BufReader<Stdin>>,
    writer: Mutex<Stdout>,
}

impl StdioLineChannel {
    pub fn new() -> Self {
        StdioLineChannel { reader: Mutex::new(BufReader::new(io::stdin())), writer: Mutex::new(io::stdout()) }
    }
}

impl Default for StdioLineChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LineChannel for StdioLineChannel {
    fn read_line(&self) -> io::Result<Option<String>> {
        read_one_line(&mut *self.reader.lock().expect("reader mutex poisoned"))
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        write_one_line(&mut *self.writer.lock().expect("writer mutex poisoned"), line)
    }
}

pub struct TcpLineChannel {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<TcpStream>,
}

impl TcpLineChannel {
    /// Binds to `addr` (port `0` for an ephemeral port) and blocks until a
    /// single peer connects, mirroring `pod_core::TcpTransport`.
    pub fn bind_and_accept(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let (stream, _peer) = listener.accept()?;
        let read_half = stream.try_clone()?;
        Ok(TcpLineChannel { reader: Mutex::new(BufReader::new(read_half)), writer: Mutex::new(stream) })
    }
}

impl LineChannel for TcpLineChannel {
    fn read_line(&self) -> io::Result<Option<String>> {
        read_one_line(&mut *self.reader.lock().expect("reader mutex poisoned"))
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        write_one_line(&mut *self.writer.lock().expect("writer mutex poisoned"), line)
    }
}

fn read_one_line<R: BufRead>(r: &mut R) -> io::Result<Option<String>> {
    let mut buf = String::new();
    let n = r.read_line(&mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    while buf.ends_with('\n') || buf.ends_with('\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

fn write_one_line<W: Write>(w: &mut W, line: &str) -> io::Result<()> {
    w.write_all(line.as_bytes())?;
    w.write_all(b"\n")?;
    w.flush()
}
