use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonRpcError {
    #[error("failed to decode JSON-RPC message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("JSON-RPC request is missing a `method` field")]
    MissingMethod,
    #[error("i/o error on the line channel: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transport(#[from] pod_core::TransportError),
}
