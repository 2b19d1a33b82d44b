//! Derefer (component F): the per-invocation handle a [`crate::var::Var`]
//! uses to stream values and signal completion back to the caller.
//!
//! A derefer may be used from any thread — async vars hand it off to
//! worker threads of their own — but it must emit exactly one terminal
//! frame (`success` or `error`). Calling a terminal method twice, or
//! calling `callback` after a terminal method, is a bug in the var; rather
//! than panicking the whole pod over it, the extra call is logged and
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::frame::Frame;
use crate::payload::PayloadCodec;
use crate::transport::Transport;

pub struct Derefer {
    invoke_id: String,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn PayloadCodec>,
    done: AtomicBool,
}

impl Derefer {
    pub fn new(invoke_id: String, transport: Arc<dyn Transport>, codec: Arc<dyn PayloadCodec>) -> Self {
        Derefer { invoke_id, transport, codec, done: AtomicBool::new(false) }
    }

    pub fn invoke_id(&self) -> &str {
        &self.invoke_id
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Streams a non-terminal value. No-op once the invocation is done.
    pub fn callback(&self, value: Value) {
        if self.done.load(Ordering::SeqCst) {
            tracing::warn!(id = %self.invoke_id, "callback called after invocation already finished");
            return;
        }
        let frame = Frame::dict_from([
            ("id", Some(Frame::str(self.invoke_id.clone()))),
            ("value", Some(Frame::str(self.codec.encode(&value)))),
            ("status", Some(Frame::list([]))),
        ]);
        self.send(frame);
    }

    pub fn send_stdout(&self, text: impl Into<String>) {
        let frame = Frame::dict_from([
            ("id", Some(Frame::str(self.invoke_id.clone()))),
            ("out", Some(Frame::str(text.into()))),
        ]);
        self.send(frame);
    }

    pub fn send_stderr(&self, text: impl Into<String>) {
        let frame = Frame::dict_from([
            ("id", Some(Frame::str(self.invoke_id.clone()))),
            ("err", Some(Frame::str(text.into()))),
        ]);
        self.send(frame);
    }

    /// Terminal success, optionally carrying a final value.
    pub fn success(&self, value: Value) {
        if self.done.swap(true, Ordering::SeqCst) {
            tracing::warn!(id = %self.invoke_id, "success called twice");
            return;
        }
        let frame = Frame::dict_from([
            ("id", Some(Frame::str(self.invoke_id.clone()))),
            ("value", Some(Frame::str(self.codec.encode(&value)))),
            ("status", Some(Frame::list([Frame::str("done")]))),
        ]);
        self.send(frame);
    }

    /// Terminal failure, with an optional structured `ex-data` payload.
    pub fn error(&self, message: impl Into<String>, data: Option<Value>) {
        if self.done.swap(true, Ordering::SeqCst) {
            tracing::warn!(id = %self.invoke_id, "error called after invocation already finished");
            return;
        }
        let frame = Frame::dict_from([
            ("id", Some(Frame::str(self.invoke_id.clone()))),
            ("status", Some(Frame::list([Frame::str("done"), Frame::str("error")]))),
            ("ex-message", Some(Frame::str(message.into()))),
            ("ex-data", data.map(|d| Frame::str(self.codec.encode(&d)))),
        ]);
        self.send(frame);
    }

    fn send(&self, frame: Frame) {
        if let Err(err) = self.transport.write_frame(&frame) {
            tracing::error!(id = %self.invoke_id, %err, "failed to write frame");
        }
    }
}
