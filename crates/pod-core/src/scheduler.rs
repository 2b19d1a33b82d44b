//! Invocation scheduler (component H).
//!
//! Synchronous vars run straight on the dispatcher's read-eval thread.
//! Asynchronous vars each get their own OS thread; total concurrently
//! *running* async invocations are capped by a counting semaphore built on
//! `Mutex` + `Condvar`, so a burst of invocations beyond the cap simply
//! parks the excess threads rather than rejecting or queuing the work —
//! this runtime has no invocation queue, by design.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::context::Context;
use crate::derefer::Derefer;
use crate::error::VarError;
use crate::var::Var;

struct Semaphore {
    available: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Semaphore { available: Mutex::new(permits), condvar: Condvar::new() }
    }

    fn acquire(&self) {
        let mut available = self.available.lock().expect("semaphore mutex poisoned");
        while *available == 0 {
            available = self.condvar.wait(available).expect("semaphore mutex poisoned");
        }
        *available -= 1;
    }

    fn release(&self) {
        let mut available = self.available.lock().expect("semaphore mutex poisoned");
        *available += 1;
        self.condvar.notify_one();
    }
}

#[derive(Debug, Clone)]
pub struct PendingInvocation {
    pub invoke_id: String,
    pub var: String,
    pub args: Vec<Value>,
    pub started_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_millis() as u64
}

pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    pending: Arc<Mutex<HashMap<String, PendingInvocation>>>,
}

impl Scheduler {
    pub fn new(max_concurrent_invocations: usize) -> Self {
        Scheduler {
            semaphore: Arc::new(Semaphore::new(max_concurrent_invocations.max(1))),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A snapshot of in-flight asynchronous invocations, surfaced through
    /// the built-in `pendings` var.
    pub fn pendings(&self) -> Vec<PendingInvocation> {
        self.pending.lock().expect("pending mutex poisoned").values().cloned().collect()
    }

    /// Runs `var` against `args`, dispatching it synchronously or onto its
    /// own thread depending on `var.is_async()`.
    pub fn dispatch(&self, context: &Arc<Context>, var: Arc<dyn Var>, derefer: Derefer, args: Vec<Value>) {
        if !var.is_async() {
            run_var(var, &derefer, context, args);
            return;
        }

        let qualified = format!("{}/{}", var.namespace(), var.name());
        let invoke_id = derefer.invoke_id().to_string();
        let pending_entry = PendingInvocation {
            invoke_id: invoke_id.clone(),
            var: qualified,
            args: args.clone(),
            started_at_ms: now_ms(),
        };
        self.pending.lock().expect("pending mutex poisoned").insert(invoke_id.clone(), pending_entry);

        let semaphore = self.semaphore.clone();
        let pending = self.pending.clone();
        let context = context.clone();
        thread::spawn(move || {
            semaphore.acquire();
            run_var(var, &derefer, &context, args);
            semaphore.release();
            pending.lock().expect("pending mutex poisoned").remove(&invoke_id);
        });
    }
}

fn run_var(var: Arc<dyn Var>, derefer: &Derefer, context: &Context, args: Vec<Value>) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| var.invoke(derefer, context, args)));
    match result {
        Err(payload) if !derefer.is_done() => {
            let err = VarError::from_panic(payload);
            derefer.error(err.message, err.data);
        }
        Err(_) => {
            tracing::error!(id = %derefer.invoke_id(), "var panicked after already finishing");
        }
        Ok(()) if !derefer.is_done() => {
            derefer.error("illegal var implementation, deref returned without any notice", None);
        }
        Ok(()) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::JsonPayloadCodec;
    use crate::registry::Registry;
    use crate::testing::MemoryTransport;
    use crate::var::VarSpec;
    use serde_json::json;
    use std::time::Duration;

    fn context_with(transport: Arc<MemoryTransport>) -> Arc<Context> {
        Arc::new(Context::new("test-pod", transport, Arc::new(JsonPayloadCodec), Registry::new()))
    }

    #[test]
    fn sync_var_runs_inline() {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = context_with(transport.clone());
        let scheduler = Scheduler::new(4);
        let var = VarSpec::new("test-pod", "echo").handler(|d, _ctx, args| d.success(Value::Array(args))).build();
        let derefer = Derefer::new("1".into(), ctx.transport().clone(), ctx.codec().clone());
        scheduler.dispatch(&ctx, var, derefer, vec![json!(1)]);
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn async_var_is_pending_until_it_finishes() {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = context_with(transport.clone());
        let scheduler = Scheduler::new(4);
        let var = VarSpec::new("test-pod", "sleep")
            .async_()
            .handler(|d, _ctx, _args| {
                thread::sleep(Duration::from_millis(20));
                d.success(Value::Null);
            })
            .build();
        let derefer = Derefer::new("1".into(), ctx.transport().clone(), ctx.codec().clone());
        scheduler.dispatch(&ctx, var, derefer, vec![]);
        assert_eq!(scheduler.pendings().len(), 1);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(scheduler.pendings().len(), 0);
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn panicking_var_is_reported_as_an_error_when_not_already_done() {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = context_with(transport.clone());
        let scheduler = Scheduler::new(4);
        let var = VarSpec::new("test-pod", "boom").handler(|_d, _ctx, _args| panic!("kaboom")).build();
        let derefer = Derefer::new("1".into(), ctx.transport().clone(), ctx.codec().clone());
        scheduler.dispatch(&ctx, var, derefer, vec![]);
        let frames = transport.written();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].get("ex-message").is_some());
    }

    #[test]
    fn a_var_that_sends_no_terminal_frame_gets_a_synthesized_error() {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = context_with(transport.clone());
        let scheduler = Scheduler::new(4);
        let var = VarSpec::new("test-pod", "mis-implementation").handler(|_d, _ctx, _args| {}).build();
        let derefer = Derefer::new("1".into(), ctx.transport().clone(), ctx.codec().clone());
        scheduler.dispatch(&ctx, var, derefer, vec![]);
        let frames = transport.written();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].get("ex-message").and_then(crate::frame::Frame::as_str),
            Some("illegal var implementation, deref returned without any notice")
        );
    }

    #[test]
    fn semaphore_bounds_concurrent_async_invocations() {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = context_with(transport.clone());
        let scheduler = Arc::new(Scheduler::new(1));
        let concurrent = Arc::new(Mutex::new(0usize));
        let max_seen = Arc::new(Mutex::new(0usize));
        for i in 0..3 {
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            let var = VarSpec::new("test-pod", "slow")
                .async_()
                .handler(move |d, _ctx, _args| {
                    *concurrent.lock().unwrap() += 1;
                    let seen = *concurrent.lock().unwrap();
                    let mut m = max_seen.lock().unwrap();
                    if seen > *m {
                        *m = seen;
                    }
                    drop(m);
                    thread::sleep(Duration::from_millis(30));
                    *concurrent.lock().unwrap() -= 1;
                    d.success(Value::Null);
                })
                .build();
            let derefer = Derefer::new(i.to_string(), ctx.transport().clone(), ctx.codec().clone());
            scheduler.dispatch(&ctx, var, derefer, vec![]);
        }
        thread::sleep(Duration::from_millis(200));
        assert_eq!(*max_seen.lock().unwrap(), 1);
    }
}
