//! Bencode frame codec (component A).
//!
//! A [`Frame`] is a bencode value restricted to the shapes the pod wire
//! format actually uses: integers, UTF-8 byte strings, lists, and
//! dictionaries with string keys kept in lexicographic order. `decode_some`
//! reads exactly one frame from a buffered reader and leaves any trailing
//! bytes in the reader's internal buffer for the next call.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unexpected eof while decoding a frame")]
    Eof,
    #[error("malformed bencode: {0}")]
    Syntax(&'static str),
    #[error("bencode byte string is not valid UTF-8")]
    InvalidUtf8,
    #[error("bencode dict key must be a byte string")]
    NonStringKey,
    #[error("i/o error decoding frame: {0}")]
    Io(#[from] io::Error),
}

/// One complete bencode dictionary (or, recursively, one of its values) on
/// the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Int(i64),
    Str(String),
    List(Vec<Frame>),
    Dict(BTreeMap<String, Frame>),
}

impl Frame {
    pub fn dict() -> Self {
        Frame::Dict(BTreeMap::new())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Frame::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Frame>) -> Self {
        Frame::List(items.into_iter().collect())
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Frame>> {
        match self {
            Frame::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Frame]> {
        match self {
            Frame::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Frame> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Builds a dict frame from `(key, value)` pairs, dropping `None` values
    /// so optional fields are simply omitted from the wire frame.
    pub fn dict_from(pairs: impl IntoIterator<Item = (&'static str, Option<Frame>)>) -> Self {
        let mut d = BTreeMap::new();
        for (k, v) in pairs {
            if let Some(v) = v {
                d.insert(k.to_string(), v);
            }
        }
        Frame::Dict(d)
    }
}

/// Reads exactly one frame from `r`, leaving any bytes past the frame's end
/// buffered in `r` for a subsequent call.
pub fn decode_some<R: BufRead>(r: &mut R) -> Result<Frame, FrameError> {
    let b = read_byte(r)?;
    decode_value(r, b)
}

fn decode_value<R: BufRead>(r: &mut R, lead: u8) -> Result<Frame, FrameError> {
    match lead {
        b'i' => decode_int(r),
        b'l' => decode_list(r),
        b'd' => decode_dict(r),
        b'0'..=b'9' => decode_str(r, lead),
        _ => Err(FrameError::Syntax("unexpected leading byte")),
    }
}

fn read_byte<R: BufRead>(r: &mut R) -> Result<u8, FrameError> {
    let mut b = [0u8; 1];
    let n = r.read(&mut b)?;
    if n == 0 {
        return Err(FrameError::Eof);
    }
    Ok(b[0])
}

fn read_until<R: BufRead>(r: &mut R, terminator: u8) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    loop {
        let b = read_byte(r)?;
        if b == terminator {
            return Ok(buf);
        }
        buf.push(b);
    }
}

fn decode_int<R: BufRead>(r: &mut R) -> Result<Frame, FrameError> {
    let digits = read_until(r, b'e')?;
    let s = std::str::from_utf8(&digits).map_err(|_| FrameError::Syntax("non-UTF-8 integer"))?;
    let v: i64 = s.parse().map_err(|_| FrameError::Syntax("invalid integer"))?;
    Ok(Frame::Int(v))
}

fn decode_str<R: BufRead>(r: &mut R, first_digit: u8) -> Result<Frame, FrameError> {
    let mut len_digits = vec![first_digit];
    len_digits.extend(read_until(r, b':')?);
    let s = std::str::from_utf8(&len_digits)
        .map_err(|_| FrameError::Syntax("non-UTF-8 string length"))?;
    let len: usize = s.parse().map_err(|_| FrameError::Syntax("invalid string length"))?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Eof
        } else {
            FrameError::Io(e)
        }
    })?;
    String::from_utf8(buf).map(Frame::Str).map_err(|_| FrameError::InvalidUtf8)
}

fn decode_list<R: BufRead>(r: &mut R) -> Result<Frame, FrameError> {
    let mut items = Vec::new();
    loop {
        let b = read_byte(r)?;
        if b == b'e' {
            return Ok(Frame::List(items));
        }
        items.push(decode_value(r, b)?);
    }
}

fn decode_dict<R: BufRead>(r: &mut R) -> Result<Frame, FrameError> {
    let mut map = BTreeMap::new();
    loop {
        let b = read_byte(r)?;
        if b == b'e' {
            return Ok(Frame::Dict(map));
        }
        let key = match decode_value(r, b)? {
            Frame::Str(s) => s,
            _ => return Err(FrameError::NonStringKey),
        };
        let value_lead = read_byte(r)?;
        let value = decode_value(r, value_lead)?;
        map.insert(key, value);
    }
}

/// Writes one frame and flushes the writer.
pub fn encode_to<W: Write>(w: &mut W, frame: &Frame) -> Result<(), FrameError> {
    encode_value(w, frame)?;
    w.flush()?;
    Ok(())
}

fn encode_value<W: Write>(w: &mut W, frame: &Frame) -> Result<(), FrameError> {
    match frame {
        Frame::Int(v) => write!(w, "i{v}e").map_err(FrameError::from),
        Frame::Str(s) => {
            let bytes = s.as_bytes();
            write!(w, "{}:", bytes.len())?;
            w.write_all(bytes).map_err(FrameError::from)
        }
        Frame::List(items) => {
            w.write_all(b"l")?;
            for item in items {
                encode_value(w, item)?;
            }
            w.write_all(b"e").map_err(FrameError::from)
        }
        Frame::Dict(map) => {
            w.write_all(b"d")?;
            // BTreeMap iterates keys in lexicographic order already.
            for (k, v) in map {
                encode_value(w, &Frame::Str(k.clone()))?;
                encode_value(w, v)?;
            }
            w.write_all(b"e").map_err(FrameError::from)
        }
    }
}

pub fn encode_to_vec(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(&mut buf, frame).expect("encoding into a Vec<u8> cannot fail");
    buf
}
