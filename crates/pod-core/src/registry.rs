//! Var/namespace registry (component E).
//!
//! Namespaces are registered in the order a pod wants them described in —
//! by convention the pod's own `<pod-id>` namespace (holding introspection
//! vars such as `pendings`) is registered first, so `describe` lists it
//! before user namespaces. A namespace may be `deferred`: its vars are not
//! built until the host sends an explicit `load-ns` op, which is how a pod
//! avoids paying for expensive namespace setup the host may never use.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::var::Var;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("namespace {0:?} not found")]
    NamespaceNotFound(String),
    #[error("var {ns}/{name} not found")]
    VarNotFound { ns: String, name: String },
}

type Loader = dyn Fn() -> Vec<Arc<dyn Var>> + Send + Sync;

pub struct Namespace {
    name: String,
    deferred: bool,
    loader: Box<Loader>,
    vars: Mutex<Option<Vec<Arc<dyn Var>>>>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, loader: impl Fn() -> Vec<Arc<dyn Var>> + Send + Sync + 'static) -> Self {
        let name = name.into();
        let vars = loader();
        Namespace { name, deferred: false, loader: Box::new(loader), vars: Mutex::new(Some(vars)) }
    }

    pub fn deferred(name: impl Into<String>, loader: impl Fn() -> Vec<Arc<dyn Var>> + Send + Sync + 'static) -> Self {
        Namespace { name: name.into(), deferred: true, loader: Box::new(loader), vars: Mutex::new(None) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn is_loaded(&self) -> bool {
        self.vars.lock().expect("namespace mutex poisoned").is_some()
    }

    /// Builds the namespace's vars if they haven't been already. Calling
    /// this more than once is cheap and returns the same var set — the
    /// loader only ever runs on the first call.
    pub fn ensure_loaded(&self) -> Vec<Arc<dyn Var>> {
        let mut guard = self.vars.lock().expect("namespace mutex poisoned");
        if guard.is_none() {
            *guard = Some((self.loader)());
        }
        guard.as_ref().expect("just populated").clone()
    }

    fn vars_if_loaded(&self) -> Option<Vec<Arc<dyn Var>>> {
        self.vars.lock().expect("namespace mutex poisoned").clone()
    }
}

#[derive(Default)]
pub struct Registry {
    namespaces: Vec<Namespace>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { namespaces: Vec::new() }
    }

    pub fn add_namespace(&mut self, ns: Namespace) {
        self.namespaces.push(ns);
    }

    pub fn find_ns(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }

    /// Loads a deferred namespace, a no-op if it is already loaded or not
    /// deferred at all.
    pub fn load_ns(&self, name: &str) -> Result<(), RegistryError> {
        self.find_ns(name).ok_or_else(|| RegistryError::NamespaceNotFound(name.to_string()))?.ensure_loaded();
        Ok(())
    }

    pub fn find_var(&self, ns: &str, name: &str) -> Result<Arc<dyn Var>, RegistryError> {
        let namespace = self.find_ns(ns).ok_or_else(|| RegistryError::NamespaceNotFound(ns.to_string()))?;
        let vars = namespace.ensure_loaded();
        vars.into_iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| RegistryError::VarNotFound { ns: ns.to_string(), name: name.to_string() })
    }

    /// Finds a var by its fully-qualified `ns/name` string, splitting on
    /// the first `/` (a namespace name may itself contain `/`).
    pub fn find_qualified(&self, qualified: &str) -> Result<Arc<dyn Var>, RegistryError> {
        let (ns, name) = qualified
            .split_once('/')
            .ok_or_else(|| RegistryError::VarNotFound { ns: String::new(), name: qualified.to_string() })?;
        self.find_var(ns, name)
    }

    /// Describes every registered namespace, in registration order.
    /// Namespaces that are still deferred and unloaded are described
    /// without forcing their loader to run — their var list is empty
    /// until `load-ns` is called. `deferred` reflects the namespace's
    /// fixed declaration, not its load state: describe output doesn't
    /// change just because a `load-ns` op already ran.
    pub fn describe(&self) -> Vec<NamespaceDescription> {
        self.namespaces
            .iter()
            .map(|ns| {
                let vars = if ns.deferred { ns.vars_if_loaded().unwrap_or_default() } else { ns.ensure_loaded() };
                NamespaceDescription {
                    name: ns.name.clone(),
                    deferred: ns.deferred,
                    vars: vars.iter().map(|v| VarDescription::from(v.as_ref())).collect(),
                }
            })
            .collect()
    }
}

pub struct NamespaceDescription {
    pub name: String,
    pub deferred: bool,
    pub vars: Vec<VarDescription>,
}

pub struct VarDescription {
    pub name: String,
    pub is_async: bool,
    pub code: Option<String>,
    pub meta: Option<String>,
}

impl From<&dyn Var> for VarDescription {
    fn from(v: &dyn Var) -> Self {
        VarDescription {
            name: v.name().to_string(),
            is_async: v.is_async(),
            code: v.code().map(|s| s.to_string()),
            meta: v.meta().map(|s| s.to_string()),
        }
    }
}
