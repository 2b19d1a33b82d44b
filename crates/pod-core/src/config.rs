//! Pod configuration (ambient stack): how a pod binary decides its pod id,
//! concurrency ceiling and transport before it starts the dispatcher loop.
//! Kept as a pure function over `args`/env so tests can drive it without
//! touching the real process environment.

use std::env;

pub const DEFAULT_MAX_CONCURRENT_INVOCATIONS: usize = 1024;
const ENV_TRANSPORT: &str = "BABASHKA_POD_TRANSPORT";
const ENV_PORT: &str = "PORT";

#[derive(Debug, Clone, PartialEq)]
pub enum TransportKind {
    Stdio,
    Socket { addr: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PodConfig {
    pub pod_id: String,
    pub max_concurrent_invocations: usize,
    pub transport: TransportKind,
}

impl PodConfig {
    /// `args` is the process's positional arguments (not including argv[0]):
    /// `[pod_id] [max_concurrent_invocations]`. Transport selection reads
    /// `BABASHKA_POD_TRANSPORT` (`stdio`, the default, or `socket`) and, for
    /// sockets, `PORT` (default ephemeral port `0`).
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::from_parts(args, |k| env::var(k).ok())
    }

    /// Testable core of [`Self::from_env_and_args`], taking an env lookup
    /// function instead of reading the real process environment.
    pub fn from_parts(args: &[String], env_lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pod_id = args.first().cloned().unwrap_or_else(|| "test-pod".to_string());
        let max_concurrent_invocations = args
            .get(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT_INVOCATIONS);
        let transport = match env_lookup(ENV_TRANSPORT).as_deref() {
            Some("socket") => {
                let port = env_lookup(ENV_PORT).unwrap_or_else(|| "0".to_string());
                TransportKind::Socket { addr: format!("127.0.0.1:{port}") }
            }
            _ => TransportKind::Stdio,
        };
        PodConfig { pod_id, max_concurrent_invocations, transport }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stdio_and_the_default_concurrency_cap() {
        let cfg = PodConfig::from_parts(&[], |_| None);
        assert_eq!(cfg.pod_id, "test-pod");
        assert_eq!(cfg.max_concurrent_invocations, DEFAULT_MAX_CONCURRENT_INVOCATIONS);
        assert_eq!(cfg.transport, TransportKind::Stdio);
    }

    #[test]
    fn reads_positional_pod_id_and_concurrency() {
        let args = vec!["my-pod".to_string(), "8".to_string()];
        let cfg = PodConfig::from_parts(&args, |_| None);
        assert_eq!(cfg.pod_id, "my-pod");
        assert_eq!(cfg.max_concurrent_invocations, 8);
    }

    #[test]
    fn invalid_concurrency_falls_back_to_default() {
        let args = vec!["my-pod".to_string(), "not-a-number".to_string()];
        let cfg = PodConfig::from_parts(&args, |_| None);
        assert_eq!(cfg.max_concurrent_invocations, DEFAULT_MAX_CONCURRENT_INVOCATIONS);
    }

    #[test]
    fn socket_transport_reads_port_from_env() {
        let cfg = PodConfig::from_parts(&[], |k| match k {
            "BABASHKA_POD_TRANSPORT" => Some("socket".to_string()),
            "PORT" => Some("9999".to_string()),
            _ => None,
        });
        assert_eq!(cfg.transport, TransportKind::Socket { addr: "127.0.0.1:9999".to_string() });
    }
}
