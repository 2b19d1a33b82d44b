use thiserror::Error;

use crate::frame::FrameError;
use crate::payload::PayloadError;
use crate::registry::RegistryError;
use crate::transport::TransportError;

/// Error returned by the dispatcher's read-eval loop. Every variant ends
/// the loop: once a frame cannot be decoded, or the transport itself has
/// failed, there is no well-defined frame boundary left to recover at.
#[derive(Debug, Error)]
pub enum PodError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unknown op {op:?}")]
    UnknownOp { op: String },

    #[error("request frame is missing required field {field:?}")]
    MissingField { field: &'static str },
}

/// Structured description of a var-invocation failure, carried over the
/// wire as `ex-message` / `ex-data` on an error terminal frame.
#[derive(Debug, Clone)]
pub struct VarError {
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl VarError {
    pub fn plain(message: impl Into<String>) -> Self {
        VarError { message: message.into(), data: None }
    }

    pub fn with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        VarError { message: message.into(), data: Some(data) }
    }

    /// Converts a caught panic payload into a `VarError`, for vars that
    /// panic instead of returning `Err`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "var panicked with a non-string payload".to_string()
        };
        VarError::plain(message)
    }
}
