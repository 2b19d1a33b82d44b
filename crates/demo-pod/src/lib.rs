#![forbid(unsafe_code)]
//! `test-pod`: a reference babashka pod used as both a runnable example
//! and the fixture the pod-core and pod-jsonrpc test suites drive.
//!
//! Exposed as a library so integration tests in other crates can build the
//! same namespaces this binary serves without spawning a process.

mod vars;

pub use vars::{build_vars, DEFERRED_NAMESPACE, NAMESPACE};

use pod_core::Namespace;

/// The eagerly-loaded `test-pod` namespace.
pub fn namespace() -> Namespace {
    Namespace::new(NAMESPACE, || build_vars(NAMESPACE))
}

/// The same vars again, under a namespace the host must `load-ns` before
/// they're visible — exercises the deferred-namespace path end to end.
pub fn deferred_namespace() -> Namespace {
    Namespace::deferred(DEFERRED_NAMESPACE, || build_vars(DEFERRED_NAMESPACE))
}
