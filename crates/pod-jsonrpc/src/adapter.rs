//! JSON-RPC 2.0 adapter transport.
//!
//! Wraps a [`LineChannel`] and presents it to [`pod_core::dispatcher`] as an
//! ordinary [`pod_core::Transport`], translating bencode-shaped request/
//! response frames to and from JSON-RPC messages. The three
//! `lotuc.babashka.pods/*` methods map onto the matching pod ops directly;
//! every other method call becomes an `invoke` of the qualified var with
//! that name, its params becoming the invocation's args.
//!
//! Because a pod var may stream any number of non-terminal frames before
//! its one terminal frame, and JSON-RPC only has one response per request,
//! every non-terminal frame (streamed `value`, `out`, `err`) and every
//! frame the host didn't ask a question for (the unsolicited `describe`
//! reply some hosts send eagerly) is translated into a
//! `lotuc.babashka.pods/notification` with its own `type`. A frame that
//! still carries the original request's id becomes a direct response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pod_core::{Frame, JsonPayloadCodec, PayloadCodec, Transport, TransportError};
use serde_json::{json, Value};

use crate::error::JsonRpcError;
use crate::line_channel::LineChannel;

const NOTIFICATION_METHOD: &str = "lotuc.babashka.pods/notification";
const METHOD_SHUTDOWN: &str = "lotuc.babashka.pods/shutdown";
const METHOD_DESCRIBE: &str = "lotuc.babashka.pods/describe";
const METHOD_LOAD_NS: &str = "lotuc.babashka.pods/load-ns";

pub struct JsonRpcAdapterTransport<C> {
    channel: C,
    codec: Arc<dyn PayloadCodec>,
    /// Original JSON-RPC ids (which may be numbers or strings) keyed by the
    /// synthetic string invoke id this adapter handed to the pod core, so a
    /// response can be sent back with the id in its original JSON shape.
    ids: Mutex<HashMap<String, Value>>,
    notification_seq: AtomicU64,
}

impl<C: LineChannel> JsonRpcAdapterTransport<C> {
    pub fn new(channel: C) -> Self {
        JsonRpcAdapterTransport {
            channel,
            codec: Arc::new(JsonPayloadCodec),
            ids: Mutex::new(HashMap::new()),
            notification_seq: AtomicU64::new(0),
        }
    }
}

impl<C: LineChannel> Transport for JsonRpcAdapterTransport<C> {
    fn read_frame(&self) -> Result<Frame, TransportError> {
        loop {
            let line = self
                .channel
                .read_line()
                .map_err(JsonRpcError::from)
                .map_err(to_transport_error)?
                .ok_or_else(|| JsonRpcError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "line channel closed")))
                .map_err(to_transport_error)?;
            let request: Value = serde_json::from_str(&line).map_err(JsonRpcError::from).map_err(to_transport_error)?;
            return Ok(self.translate_inbound(&request).map_err(to_transport_error)?);
        }
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let message = self.translate_outbound(frame);
        let line = serde_json::to_string(&message).expect("JSON-RPC message always serializes");
        self.channel.write_line(&line).map_err(JsonRpcError::from).map_err(to_transport_error)
    }
}

fn to_transport_error(err: JsonRpcError) -> TransportError {
    TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}

impl<C> JsonRpcAdapterTransport<C> {
    fn translate_inbound(&self, request: &Value) -> Result<Frame, JsonRpcError> {
        let method = request.get("method").and_then(Value::as_str).ok_or(JsonRpcError::MissingMethod)?;
        let params = request.get("params").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        let original_id = request.get("id").cloned();

        let op = match method {
            METHOD_SHUTDOWN => "shutdown",
            METHOD_DESCRIBE => "describe",
            METHOD_LOAD_NS => "load-ns",
            _ => "invoke",
        };

        let mut fields: Vec<(&'static str, Option<Frame>)> = vec![("op", Some(Frame::str(op)))];

        match op {
            "shutdown" | "describe" => {
                if let Some(id) = &original_id {
                    let invoke_id = self.remember_id(id);
                    fields.push(("id", Some(Frame::str(invoke_id))));
                }
            }
            "load-ns" => {
                let ns = params.get(0).and_then(Value::as_str).unwrap_or_default().to_string();
                fields.push(("ns", Some(Frame::str(ns))));
                if let Some(id) = &original_id {
                    let invoke_id = self.remember_id(id);
                    fields.push(("id", Some(Frame::str(invoke_id))));
                }
            }
            _ => {
                let invoke_id = self.remember_id(&original_id.clone().unwrap_or_else(|| json!(method)));
                fields.push(("var", Some(Frame::str(method.to_string()))));
                fields.push(("args", Some(Frame::str(self.codec.encode(&params)))));
                fields.push(("id", Some(Frame::str(invoke_id))));
            }
        }

        Ok(Frame::dict_from(fields))
    }

    fn remember_id(&self, json_id: &Value) -> String {
        let invoke_id = json_id.as_str().map(str::to_string).unwrap_or_else(|| json_id.to_string());
        self.ids.lock().expect("ids mutex poisoned").insert(invoke_id.clone(), json_id.clone());
        invoke_id
    }

    fn original_id(&self, invoke_id: &str) -> Option<Value> {
        self.ids.lock().expect("ids mutex poisoned").get(invoke_id).cloned()
    }

    fn forget_id(&self, invoke_id: &str) -> Option<Value> {
        self.ids.lock().expect("ids mutex poisoned").remove(invoke_id)
    }

    fn next_notification_id(&self) -> u64 {
        self.notification_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn translate_outbound(&self, frame: &Frame) -> Value {
        let id_str = frame.get("id").and_then(Frame::as_str).map(str::to_string);
        let is_terminal = frame
            .get("status")
            .and_then(Frame::as_list)
            .is_some_and(|items| items.iter().any(|f| f.as_str() == Some("done")));
        let is_stdout = frame.get("out").is_some();
        let is_stderr = frame.get("err").is_some();

        if is_terminal {
            let is_error = frame
                .get("status")
                .and_then(Frame::as_list)
                .map(|items| items.iter().any(|f| f.as_str() == Some("error")))
                .unwrap_or(false);
            let original = id_str.as_deref().and_then(|id| self.forget_id(id));
            return match original {
                Some(json_id) if is_error => json!({
                    "jsonrpc": "2.0",
                    "id": json_id,
                    "error": {
                        "code": -32000,
                        "message": frame.get("ex-message").and_then(Frame::as_str).unwrap_or("invocation failed"),
                        "data": frame.get("ex-data").and_then(Frame::as_str).map(|raw| self.decode_or_raw(raw)),
                    },
                }),
                Some(json_id) => json!({
                    "jsonrpc": "2.0",
                    "id": json_id,
                    "result": frame.get("value").and_then(Frame::as_str).map(|raw| self.decode_or_raw(raw)),
                }),
                None => self.notification(if is_error { "error" } else { "partial" }, id_str, frame),
            };
        }

        if is_stdout || is_stderr {
            return self.notification(if is_stdout { "stdout" } else { "stderr" }, id_str, frame);
        }

        match id_str.as_deref().and_then(|id| self.original_id(id)) {
            Some(json_id) => json!({ "jsonrpc": "2.0", "id": json_id, "result": frame_to_json(frame) }),
            None => {
                let kind = if frame.get("namespaces").is_some() { "describe" } else { "unknown" };
                self.notification(kind, id_str, frame)
            }
        }
    }

    fn notification(&self, kind: &str, id_str: Option<String>, frame: &Frame) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": NOTIFICATION_METHOD,
            "params": {
                "type": kind,
                "id": id_str,
                "notification-id": self.next_notification_id(),
                "value": frame_to_json(frame),
            },
        })
    }

    fn decode_or_raw(&self, raw: &str) -> Value {
        self.codec.decode(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

fn frame_to_json(frame: &Frame) -> Value {
    match frame {
        Frame::Int(v) => json!(v),
        Frame::Str(s) => json!(s),
        Frame::List(items) => Value::Array(items.iter().map(frame_to_json).collect()),
        Frame::Dict(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), frame_to_json(v))).collect()),
    }
}
