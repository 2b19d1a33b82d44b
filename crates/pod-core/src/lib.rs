#![forbid(unsafe_code)]
//! Pod-side runtime for the babashka pod protocol.
//!
//! A pod is a subprocess that a host (babashka, or anything else willing
//! to speak the protocol) launches and talks to over a framed channel.
//! This crate implements the pod side of that conversation: decoding and
//! encoding frames ([`frame`]), the transports that carry them
//! ([`transport`]), a JSON payload codec for invocation arguments and
//! return values ([`payload`]), a registry of namespaces and vars
//! ([`registry`], [`var`]), the per-invocation streaming/termination
//! handle a var uses to reply ([`derefer`]), the bounded-concurrency
//! scheduler that runs async vars on their own threads ([`scheduler`]),
//! shared per-pod state ([`context`]), and the read-eval loop that ties
//! all of it together ([`dispatcher`]).
//!
//! [`pod_jsonrpc`](https://docs.rs/pod-jsonrpc) layers a JSON-RPC 2.0
//! transport on top of [`transport::Transport`] for hosts that would
//! rather speak JSON-RPC than raw bencode.

pub mod config;
pub mod context;
pub mod derefer;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod payload;
pub mod registry;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;
pub mod var;

pub use config::{PodConfig, TransportKind};
pub use context::Context;
pub use derefer::Derefer;
pub use error::PodError;
pub use frame::Frame;
pub use payload::{JsonPayloadCodec, PayloadCodec};
pub use registry::{Namespace, Registry};
pub use scheduler::Scheduler;
pub use transport::{StdioTransport, TcpTransport, Transport, TransportError};
pub use var::{Var, VarSpec};

/// The built-in namespace every pod should register first, holding
/// introspection vars such as `pendings`.
pub const BUILTIN_NAMESPACE: &str = "lotuc.babashka.pods";

/// Builds the `lotuc.babashka.pods` namespace's `pendings` var, which
/// reports in-flight asynchronous invocations. Pods register this
/// namespace ahead of their own so it describes first.
pub fn builtin_namespace(scheduler: std::sync::Arc<Scheduler>) -> Namespace {
    Namespace::new(BUILTIN_NAMESPACE, move || {
        let scheduler = scheduler.clone();
        vec![VarSpec::new(BUILTIN_NAMESPACE, "pendings")
            .handler(move |d, _ctx, _args| {
                d.success(crate::payload::encode_pendings(&scheduler.pendings()))
            })
            .build()]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::JsonPayloadCodec;
    use crate::testing::MemoryTransport;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn builtin_namespace_reports_pendings_var() {
        let scheduler = Arc::new(Scheduler::new(1));
        let ns = builtin_namespace(scheduler);
        let vars = ns.ensure_loaded();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name(), "pendings");
    }

    #[test]
    fn pendings_var_reports_a_mapping_of_id_to_args_and_start_ts() {
        let scheduler = Arc::new(Scheduler::new(1));
        let registry = {
            let mut r = Registry::new();
            r.add_namespace(builtin_namespace(scheduler.clone()));
            r.add_namespace(Namespace::new("test-pod", || {
                vec![VarSpec::new("test-pod", "sleep")
                    .async_()
                    .handler(|d, _ctx, _args| {
                        thread::sleep(Duration::from_millis(30));
                        d.success(serde_json::Value::Null);
                    })
                    .build()]
            }));
            r
        };
        let transport = Arc::new(MemoryTransport::new());
        let ctx = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let var = ctx.registry().find_qualified("test-pod/sleep").unwrap();
        let derefer = Derefer::new("42".into(), ctx.transport().clone(), ctx.codec().clone());
        scheduler.dispatch(&ctx, var, derefer, vec![serde_json::json!(7)]);

        let pendings_var = ctx.registry().find_qualified(&format!("{BUILTIN_NAMESPACE}/pendings")).unwrap();
        let report_derefer = Derefer::new("99".into(), ctx.transport().clone(), ctx.codec().clone());
        pendings_var.invoke(&report_derefer, &ctx, vec![]);

        let frames = transport.written();
        let report_frame = frames.iter().find(|f| f.get("id").and_then(Frame::as_str) == Some("99")).unwrap();
        let value_str = report_frame.get("value").and_then(Frame::as_str).unwrap();
        let value: serde_json::Value = serde_json::from_str(value_str).unwrap();
        let entry = &value["42"];
        assert_eq!(entry["args"], serde_json::json!([7]));
        assert!(entry["start-ts"].is_u64());

        thread::sleep(Duration::from_millis(100));
    }
}
