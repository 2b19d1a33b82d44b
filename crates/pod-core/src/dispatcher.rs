//! Dispatcher (component G): the pod's read-eval loop. Reads one request
//! frame at a time from the transport and dispatches it to the registry
//! or scheduler. The loop itself only ever does synchronous, short work —
//! all it does for `invoke` is hand the var and a fresh [`Derefer`] to the
//! scheduler, which decides whether to run it inline or on its own thread.

use std::sync::Arc;

use crate::context::Context;
use crate::derefer::Derefer;
use crate::error::PodError;
use crate::frame::Frame;
use crate::payload::decode_args;
use crate::scheduler::Scheduler;

const OP_DESCRIBE: &str = "describe";
const OP_INVOKE: &str = "invoke";
const OP_LOAD_NS: &str = "load-ns";
const OP_SHUTDOWN: &str = "shutdown";

/// Runs the read-eval loop until a `shutdown` op is received or the
/// transport fails. Returns normally on a clean shutdown.
pub fn run(context: Arc<Context>, scheduler: Arc<Scheduler>) -> Result<(), PodError> {
    loop {
        let frame = context.transport().read_frame()?;
        let dict = frame.as_dict().ok_or(PodError::MissingField { field: "op" })?;
        let op = dict.get("op").and_then(Frame::as_str).ok_or(PodError::MissingField { field: "op" })?;

        match op {
            OP_DESCRIBE => handle_describe(&context, &frame)?,
            OP_INVOKE => handle_invoke(&context, &scheduler, &frame)?,
            OP_LOAD_NS => handle_load_ns(&context, &frame)?,
            OP_SHUTDOWN => {
                context.cleanup();
                return Ok(());
            }
            other => return Err(PodError::UnknownOp { op: other.to_string() }),
        }
    }
}

fn handle_describe(context: &Arc<Context>, frame: &Frame) -> Result<(), PodError> {
    let namespaces = context
        .describe()
        .into_iter()
        .map(|ns| {
            if ns.deferred {
                return Frame::dict_from([
                    ("name", Some(Frame::str(ns.name))),
                    ("defer", Some(Frame::str("true"))),
                ]);
            }
            let vars = ns
                .vars
                .into_iter()
                .map(|v| {
                    Frame::dict_from([
                        ("name", Some(Frame::str(v.name))),
                        ("async", v.is_async.then(|| Frame::str("true"))),
                        ("code", v.code.map(Frame::str)),
                        ("meta", v.meta.map(Frame::str)),
                    ])
                })
                .collect::<Vec<_>>();
            Frame::dict_from([("name", Some(Frame::str(ns.name))), ("vars", Some(Frame::List(vars)))])
        })
        .collect::<Vec<_>>();

    let ops = Frame::dict_from([("shutdown", context.has_cleanup().then(Frame::dict))]);

    let reply = Frame::dict_from([
        ("id", frame.get("id").and_then(Frame::as_str).map(Frame::str)),
        ("format", Some(Frame::str(context.codec().format()))),
        ("pod-id", Some(Frame::str(context.pod_id().to_string()))),
        ("ops", Some(ops)),
        ("namespaces", Some(Frame::List(namespaces))),
    ]);
    context.transport().write_frame(&reply)?;
    Ok(())
}

fn handle_invoke(context: &Arc<Context>, scheduler: &Arc<Scheduler>, frame: &Frame) -> Result<(), PodError> {
    let invoke_id =
        frame.get("id").and_then(Frame::as_str).ok_or(PodError::MissingField { field: "id" })?.to_string();
    let qualified =
        frame.get("var").and_then(Frame::as_str).ok_or(PodError::MissingField { field: "var" })?.to_string();
    let raw_args = frame.get("args").and_then(Frame::as_str);

    let derefer = Derefer::new(invoke_id.clone(), context.transport().clone(), context.codec().clone());

    let args = match decode_args(context.codec().as_ref(), raw_args) {
        Ok(args) => args,
        Err(err) => {
            derefer.error(err.to_string(), None);
            return Ok(());
        }
    };

    match context.registry().find_qualified(&qualified) {
        Ok(var) => scheduler.dispatch(context, var, derefer, args),
        Err(err) => derefer.error(err.to_string(), None),
    }
    Ok(())
}

fn handle_load_ns(context: &Arc<Context>, frame: &Frame) -> Result<(), PodError> {
    let ns = frame.get("ns").and_then(Frame::as_str).ok_or(PodError::MissingField { field: "ns" })?;
    context.registry().load_ns(ns)?;
    if let Some(id) = frame.get("id").and_then(Frame::as_str) {
        let reply = Frame::dict_from([
            ("id", Some(Frame::str(id.to_string()))),
            ("status", Some(Frame::list([Frame::str("done")]))),
        ]);
        context.transport().write_frame(&reply)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::JsonPayloadCodec;
    use crate::registry::{Namespace, Registry};
    use crate::scheduler::Scheduler;
    use crate::testing::MemoryTransport;
    use crate::var::VarSpec;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn request(op: &str, fields: Vec<(&'static str, Option<Frame>)>) -> Frame {
        let mut dict: BTreeMap<String, Frame> = BTreeMap::new();
        dict.insert("op".to_string(), Frame::str(op));
        if let Frame::Dict(extra) = Frame::dict_from(fields) {
            dict.extend(extra);
        }
        Frame::Dict(dict)
    }

    fn request_op_only(op: &str) -> Frame {
        request(op, vec![])
    }

    #[test]
    fn describe_reports_pod_id_and_namespaces() {
        let mut registry = Registry::new();
        registry.add_namespace(Namespace::new("test-pod", || {
            vec![VarSpec::new("test-pod", "echo").handler(|d, _ctx, args| d.success(Value::Array(args))).build()]
        }));
        let transport = Arc::new(MemoryTransport::with_inbound(vec![request_op_only(OP_DESCRIBE), request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].get("pod-id").and_then(Frame::as_str), Some("test-pod"));
    }

    #[test]
    fn describe_echoes_the_request_id() {
        let registry = Registry::new();
        let describe = request(OP_DESCRIBE, vec![("id", Some(Frame::str("d")))]);
        let transport = Arc::new(MemoryTransport::with_inbound(vec![describe, request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        assert_eq!(written[0].get("id").and_then(Frame::as_str), Some("d"));
    }

    #[test]
    fn describe_advertises_shutdown_op_only_when_cleanup_registered() {
        let registry = Registry::new();
        let transport = Arc::new(MemoryTransport::with_inbound(vec![request_op_only(OP_DESCRIBE), request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        context.add_cleanup(|| {});
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        assert!(written[0].get("ops").and_then(|o| o.get("shutdown")).is_some());
    }

    #[test]
    fn describe_reports_deferred_namespace_without_vars() {
        let mut registry = Registry::new();
        registry.add_namespace(Namespace::deferred("test-pod-defer", || {
            vec![VarSpec::new("test-pod-defer", "echo").handler(|d, _ctx, args| d.success(Value::Array(args))).build()]
        }));
        let transport = Arc::new(MemoryTransport::with_inbound(vec![request_op_only(OP_DESCRIBE), request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        let namespaces = written[0].get("namespaces").and_then(Frame::as_list).unwrap();
        let defer_ns = namespaces.iter().find(|ns| ns.get("name").and_then(Frame::as_str) == Some("test-pod-defer")).unwrap();
        assert_eq!(defer_ns.get("defer").and_then(Frame::as_str), Some("true"));
        assert!(defer_ns.get("vars").is_none());
    }

    #[test]
    fn describe_reports_var_meta() {
        let mut registry = Registry::new();
        registry.add_namespace(Namespace::new("test-pod", || {
            vec![VarSpec::new("test-pod", "echo")
                .meta("a docstring")
                .handler(|d, _ctx, args| d.success(Value::Array(args)))
                .build()]
        }));
        let transport = Arc::new(MemoryTransport::with_inbound(vec![request_op_only(OP_DESCRIBE), request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        let namespaces = written[0].get("namespaces").and_then(Frame::as_list).unwrap();
        let ns = namespaces.iter().find(|ns| ns.get("name").and_then(Frame::as_str) == Some("test-pod")).unwrap();
        let vars = ns.get("vars").and_then(Frame::as_list).unwrap();
        assert_eq!(vars[0].get("meta").and_then(Frame::as_str), Some("a docstring"));
    }

    #[test]
    fn invoke_runs_the_var_and_reports_success() {
        let mut registry = Registry::new();
        registry.add_namespace(Namespace::new("test-pod", || {
            vec![VarSpec::new("test-pod", "echo").handler(|d, _ctx, args| d.success(Value::Array(args))).build()]
        }));
        let invoke = request(
            OP_INVOKE,
            vec![("id", Some(Frame::str("1"))), ("var", Some(Frame::str("test-pod/echo"))), ("args", Some(Frame::str("[1,2]")))],
        );
        let transport = Arc::new(MemoryTransport::with_inbound(vec![invoke, request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        assert_eq!(written.len(), 1);
        assert!(written[0].get("value").is_some());
    }

    #[test]
    fn invoke_on_unknown_var_reports_an_error_instead_of_failing_the_loop() {
        let registry = Registry::new();
        let invoke = request(OP_INVOKE, vec![("id", Some(Frame::str("1"))), ("var", Some(Frame::str("nope/nope")))]);
        let transport = Arc::new(MemoryTransport::with_inbound(vec![invoke, request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context, scheduler).unwrap();
        let written = transport.written();
        assert_eq!(written.len(), 1);
        assert!(written[0].get("ex-message").is_some());
    }

    #[test]
    fn load_ns_loads_a_deferred_namespace_and_replies_when_id_present() {
        let mut registry = Registry::new();
        registry.add_namespace(Namespace::deferred("test-pod-defer", || {
            vec![VarSpec::new("test-pod-defer", "echo").handler(|d, _ctx, args| d.success(Value::Array(args))).build()]
        }));
        let load = request(OP_LOAD_NS, vec![("id", Some(Frame::str("1"))), ("ns", Some(Frame::str("test-pod-defer")))]);
        let transport = Arc::new(MemoryTransport::with_inbound(vec![load, request_op_only(OP_SHUTDOWN)]));
        let context = Arc::new(Context::new("test-pod", transport.clone(), Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        run(context.clone(), scheduler).unwrap();
        assert!(context.registry().find_ns("test-pod-defer").unwrap().is_loaded());
        let written = transport.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].get("id").and_then(Frame::as_str), Some("1"));
    }

    #[test]
    fn unknown_op_ends_the_loop_with_an_error() {
        let registry = Registry::new();
        let transport = Arc::new(MemoryTransport::with_inbound(vec![request_op_only("not-an-op")]));
        let context = Arc::new(Context::new("test-pod", transport, Arc::new(JsonPayloadCodec), registry));
        let scheduler = Arc::new(Scheduler::new(4));
        let err = run(context, scheduler).unwrap_err();
        assert!(matches!(err, PodError::UnknownOp { .. }));
    }
}
