//! `demo-pod`: a runnable babashka pod serving the `test-pod` and
//! `test-pod-defer` namespaces defined in [`demo_pod`].
//!
//! Transport and protocol are both environment-selected so the same binary
//! can be driven as a plain bencode pod or behind the JSON-RPC adapter:
//! `BABASHKA_POD_TRANSPORT=socket` picks TCP over stdio (see
//! `pod_core::config`), and `BABASHKA_POD_PROTOCOL=jsonrpc` wraps whichever
//! byte channel that picks in [`pod_jsonrpc::JsonRpcAdapterTransport`]
//! instead of speaking native bencode frames directly.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use pod_core::transport::{remove_portfile, spit_portfile};
use pod_core::{
    builtin_namespace, dispatcher, Context, JsonPayloadCodec, PodConfig, Registry, Scheduler,
    StdioTransport, TcpTransport, Transport, TransportKind,
};
use pod_jsonrpc::{JsonRpcAdapterTransport, StdioLineChannel, TcpLineChannel};
use thiserror::Error;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to bind transport: {0}")]
    Transport(#[from] pod_core::TransportError),
    #[error("failed to bind JSON-RPC channel: {0}")]
    JsonRpcChannel(#[from] std::io::Error),
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = PodConfig::from_env_and_args(&args);

    if let Err(err) = run(&config) {
        tracing::error!(%err, "pod exited with an error");
        std::process::exit(1);
    }
}

/// Binds the transport the config asks for, runs the dispatcher loop to
/// completion, and tears down anything the transport left behind (a
/// portfile, in the TCP case).
fn run(config: &PodConfig) -> Result<(), Box<dyn std::error::Error>> {
    let protocol_is_jsonrpc = env::var("BABASHKA_POD_PROTOCOL").map(|p| p == "jsonrpc").unwrap_or(false);

    let mut portfile: Option<PathBuf> = None;
    let transport: Arc<dyn Transport> = match (&config.transport, protocol_is_jsonrpc) {
        (TransportKind::Stdio, false) => Arc::new(StdioTransport::new()),
        (TransportKind::Stdio, true) => Arc::new(JsonRpcAdapterTransport::new(StdioLineChannel::new())),
        (TransportKind::Socket { addr }, false) => {
            let tcp = TcpTransport::bind_and_accept(addr).map_err(StartupError::from)?;
            portfile = Some(spit_portfile(&env::current_dir()?, std::process::id(), tcp.local_port())?);
            tracing::info!(port = tcp.local_port(), "accepted connection");
            Arc::new(tcp)
        }
        (TransportKind::Socket { addr }, true) => {
            let channel = TcpLineChannel::bind_and_accept(addr).map_err(StartupError::from)?;
            Arc::new(JsonRpcAdapterTransport::new(channel))
        }
    };

    let scheduler = Arc::new(Scheduler::new(config.max_concurrent_invocations));
    let mut registry = Registry::new();
    registry.add_namespace(builtin_namespace(scheduler.clone()));
    registry.add_namespace(demo_pod::namespace());
    registry.add_namespace(demo_pod::deferred_namespace());

    let context = Arc::new(Context::new(config.pod_id.clone(), transport, Arc::new(JsonPayloadCodec), registry));
    let result = dispatcher::run(context, scheduler);

    if let Some(path) = portfile {
        remove_portfile(&path);
    }
    Ok(result?)
}
