//! Context (component I): the state shared by every invocation of a pod —
//! its id, transport, payload codec, var registry, a bag of arbitrary
//! per-pod components vars can stash state in (a counter, a cache, a
//! database handle), and a cleanup list run once at shutdown.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::payload::PayloadCodec;
use crate::registry::{NamespaceDescription, Registry};
use crate::transport::Transport;

type CleanupFn = Box<dyn FnOnce() + Send>;

pub struct Context {
    pod_id: String,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn PayloadCodec>,
    registry: Registry,
    components: Mutex<HashMap<TypeId, Box<dyn Any + Send>>>,
    cleanup: Mutex<Vec<CleanupFn>>,
    cleaned_up: AtomicBool,
}

impl Context {
    pub fn new(pod_id: impl Into<String>, transport: Arc<dyn Transport>, codec: Arc<dyn PayloadCodec>, registry: Registry) -> Self {
        Context {
            pod_id: pod_id.into(),
            transport,
            codec,
            registry,
            components: Mutex::new(HashMap::new()),
            cleanup: Mutex::new(Vec::new()),
            cleaned_up: AtomicBool::new(false),
        }
    }

    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn codec(&self) -> &Arc<dyn PayloadCodec> {
        &self.codec
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Describes every registered namespace, with the namespace matching
    /// this pod's id moved to the front (inventing an empty stub for it if
    /// no declared namespace matches), so the host can find "its" pod
    /// first in the list.
    pub fn describe(&self) -> Vec<NamespaceDescription> {
        let mut namespaces = self.registry.describe();
        if self.pod_id.is_empty() {
            return namespaces;
        }
        match namespaces.iter().position(|ns| ns.name == self.pod_id) {
            Some(pos) => {
                let found = namespaces.remove(pos);
                namespaces.insert(0, found);
            }
            None => namespaces.insert(0, NamespaceDescription { name: self.pod_id.clone(), deferred: false, vars: Vec::new() }),
        }
        namespaces
    }

    pub fn add_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.cleanup.lock().expect("cleanup mutex poisoned").push(Box::new(f));
    }

    /// Whether a cleanup callback has been registered — describe uses this
    /// to decide whether to advertise the `shutdown` op.
    pub fn has_cleanup(&self) -> bool {
        !self.cleanup.lock().expect("cleanup mutex poisoned").is_empty()
    }

    /// Runs every registered cleanup closure, in registration order.
    /// Calling this more than once only runs them the first time.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        let fns = std::mem::take(&mut *self.cleanup.lock().expect("cleanup mutex poisoned"));
        for f in fns {
            f();
        }
    }

    pub fn insert_component<T: Send + 'static>(&self, value: T) {
        self.components.lock().expect("components mutex poisoned").insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Runs `f` against the component of type `T`, returning `None` if no
    /// such component was inserted.
    pub fn with_component<T: Send + 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.components.lock().expect("components mutex poisoned");
        guard.get_mut(&TypeId::of::<T>()).and_then(|b| b.downcast_mut::<T>()).map(f)
    }
}
