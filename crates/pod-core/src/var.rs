//! Vars: the unit of functionality a pod exposes. A var belongs to a
//! namespace, is either synchronous (the dispatcher's invoking thread runs
//! it to completion) or asynchronous (the scheduler hands it its own
//! thread and returns immediately), and is either backed by Rust code or
//! by a `code` string the host evaluates itself without ever invoking the
//! pod (used for thin host-side wrapper functions).

use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::derefer::Derefer;

pub trait Var: Send + Sync {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;
    fn is_async(&self) -> bool;
    fn code(&self) -> Option<&str>;

    /// Opaque metadata string advertised in describe output. The runtime
    /// never interprets this; it's a passthrough for whatever the host's
    /// var-lookup conventions expect (docstrings, argument lists, etc).
    fn meta(&self) -> Option<&str> {
        None
    }

    /// Runs the var's body. For code-only vars this is never called — the
    /// host evaluates `code()` locally instead. `context` gives the var
    /// access to the pod's shared component bag.
    fn invoke(&self, derefer: &Derefer, context: &Context, args: Vec<Value>);
}

impl std::fmt::Debug for dyn Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Var")
            .field("namespace", &self.namespace())
            .field("name", &self.name())
            .field("is_async", &self.is_async())
            .finish()
    }
}

type Handler = dyn Fn(&Derefer, &Context, Vec<Value>) + Send + Sync;

/// Builder used in place of the C macro family that defines pod vars in
/// the original implementation.
pub struct VarSpec {
    namespace: String,
    name: String,
    is_async: bool,
    code: Option<String>,
    meta: Option<String>,
    handler: Option<Arc<Handler>>,
}

impl VarSpec {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        VarSpec { namespace: namespace.into(), name: name.into(), is_async: false, code: None, meta: None, handler: None }
    }

    pub fn async_(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Marks this var as host-evaluated: `code` is Clojure source the
    /// host runs directly, and the pod never receives an invoke for it.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Opaque metadata advertised alongside this var in describe output.
    pub fn meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn handler(mut self, f: impl Fn(&Derefer, &Context, Vec<Value>) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<dyn Var> {
        Arc::new(BuiltVar {
            namespace: self.namespace,
            name: self.name,
            is_async: self.is_async,
            code: self.code,
            meta: self.meta,
            handler: self.handler,
        })
    }
}

struct BuiltVar {
    namespace: String,
    name: String,
    is_async: bool,
    code: Option<String>,
    meta: Option<String>,
    handler: Option<Arc<Handler>>,
}

impl Var for BuiltVar {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn meta(&self) -> Option<&str> {
        self.meta.as_deref()
    }

    fn invoke(&self, derefer: &Derefer, context: &Context, args: Vec<Value>) {
        match &self.handler {
            Some(handler) => handler(derefer, context, args),
            None => tracing::warn!(ns = %self.namespace, name = %self.name, "invoked a var with no handler"),
        }
    }
}
