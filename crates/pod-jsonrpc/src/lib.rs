#![forbid(unsafe_code)]
//! JSON-RPC 2.0 transport for the babashka pod protocol.
//!
//! Some hosts speak JSON-RPC natively and would rather not learn bencode
//! just to talk to a pod. [`JsonRpcAdapterTransport`] implements
//! [`pod_core::Transport`] by translating JSON-RPC requests into the ops
//! `pod_core::dispatcher` already understands, and translating the
//! dispatcher's outgoing frames back into JSON-RPC responses or
//! `lotuc.babashka.pods/notification` notifications.

mod adapter;
mod error;
mod line_channel;

pub use adapter::JsonRpcAdapterTransport;
pub use error::JsonRpcError;
pub use line_channel::{LineChannel, StdioLineChannel, TcpLineChannel};
