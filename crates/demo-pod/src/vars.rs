//! The `test-pod` / `test-pod-defer` namespaces: a small fixture pod used
//! both as the example binary and as the shared harness the pod-core and
//! pod-jsonrpc test suites drive. Every var here mirrors a scenario the
//! protocol needs to prove out: summation, streaming, error shapes,
//! stdout/stderr capture, a var that never sends a terminal frame, panics,
//! sleeping, and per-pod mutable state.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pod_core::{Context, Derefer, Var, VarSpec};
use serde_json::{json, Value};

pub const NAMESPACE: &str = "test-pod";
pub const DEFERRED_NAMESPACE: &str = "test-pod-defer";

const MIS_IMPLEMENTATION_DEFAULT: &str = "no-finish-message-sent";

fn arg_i64(args: &[Value], idx: usize, default: i64) -> i64 {
    args.get(idx).and_then(Value::as_i64).unwrap_or(default)
}

fn sum_args(args: &[Value]) -> i64 {
    args.iter().filter_map(Value::as_i64).sum()
}

/// Builds every var in `test-pod`. Used both for the eager namespace and,
/// with a different name, for the deferred one — the protocol doesn't
/// care which namespace a var lives in.
pub fn build_vars(namespace: &'static str) -> Vec<Arc<dyn Var>> {
    vec![
        VarSpec::new(namespace, "add-sync").handler(|d, _ctx, args| d.success(json!(sum_args(&args)))).build(),
        VarSpec::new(namespace, "add-async")
            .async_()
            .handler(|d, _ctx, args| d.success(json!(sum_args(&args))))
            .build(),
        VarSpec::new(namespace, "range-stream").async_().handler(range_stream).build(),
        VarSpec::new(namespace, "echo").handler(|d, _ctx, args| d.success(Value::Array(args))).build(),
        VarSpec::new(namespace, "error")
            .handler(|d, _ctx, args| d.error("Illegal arguments", Some(json!({"args": args}))))
            .build(),
        VarSpec::new(namespace, "print")
            .handler(|d, _ctx, args| {
                d.send_stdout(format!("{}\n", Value::Array(args)));
                d.success(json!({}));
            })
            .build(),
        VarSpec::new(namespace, "print-err")
            .handler(|d, _ctx, args| {
                d.send_stderr(format!("{}\n", Value::Array(args)));
                d.success(json!({}));
            })
            .build(),
        VarSpec::new(namespace, "return-nil").handler(|d, _ctx, _args| d.success(json!({}))).build(),
        VarSpec::new(namespace, "do-twice").code("(fn [f] (f) (f))").build(),
        VarSpec::new(namespace, "fn-call").code("(fn [f & args] (apply f args))").build(),
        VarSpec::new(namespace, "multi-threaded-test").handler(multi_threaded_test).build(),
        VarSpec::new(namespace, "mis-implementation").handler(mis_implementation).build(),
        VarSpec::new(namespace, "sleep")
            .handler(|d, _ctx, args| {
                thread::sleep(Duration::from_millis(arg_i64(&args, 0, 0) as u64));
                d.success(json!({}));
            })
            .build(),
        VarSpec::new(namespace, "async-sleep")
            .async_()
            .handler(|d, _ctx, args| {
                thread::sleep(Duration::from_millis(arg_i64(&args, 0, 0) as u64));
                d.success(json!({}));
            })
            .build(),
        VarSpec::new(namespace, "counter-set").async_().handler(counter_set).build(),
        VarSpec::new(namespace, "counter-get-inc").async_().handler(counter_get_inc).build(),
    ]
}

fn range_stream(d: &Derefer, _ctx: &Context, args: Vec<Value>) {
    let (start, end, step) = match args.len() {
        0 => (0, i64::MAX, 1),
        1 => (0, arg_i64(&args, 0, 0), 1),
        2 => (arg_i64(&args, 0, 0), arg_i64(&args, 1, 0), 1),
        _ => (arg_i64(&args, 0, 0), arg_i64(&args, 1, 0), arg_i64(&args, 2, 1)),
    };
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        d.callback(json!(i));
        thread::sleep(Duration::from_millis(100));
        i += step;
    }
    d.success(json!({}));
}

fn multi_threaded_test(d: &Derefer, _ctx: &Context, _args: Vec<Value>) {
    let handles: Vec<_> = (0..100)
        .map(|i| {
            let transport = d.invoke_id().to_string();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                (i, transport)
            })
        })
        .collect();
    for handle in handles {
        let (i, _id) = handle.join().expect("worker thread panicked");
        d.callback(json!(format!("thread-{i}-done")));
    }
    d.success(json!({}));
}

fn mis_implementation(d: &Derefer, _ctx: &Context, args: Vec<Value>) {
    let marker = args.first().and_then(Value::as_str).unwrap_or(MIS_IMPLEMENTATION_DEFAULT);
    if marker == MIS_IMPLEMENTATION_DEFAULT {
        // Deliberately sends no terminal frame, to exercise a host's
        // handling of a var that never replies.
        return;
    }
    panic!("mis-implementation invoked with non-default args: {args:?}");
}

fn counter_set(d: &Derefer, ctx: &Context, args: Vec<Value>) {
    let value = arg_i64(&args, 0, 0);
    ctx.insert_component(value);
    d.success(json!({}));
}

fn counter_get_inc(d: &Derefer, ctx: &Context, _args: Vec<Value>) {
    let previous = ctx.with_component::<i64, i64>(|c| {
        let old = *c;
        *c += 1;
        old
    });
    d.success(json!(previous.unwrap_or(0)));
}
