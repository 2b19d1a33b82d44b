use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfileError {
    #[error("failed to write port file at `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes the `.babashka-pod-<pid>.port` file the TCP transport's caller
/// greps out of stderr or the working directory to learn which port the
/// pod bound to. Callers are expected to register [`remove_portfile`]
/// against process exit so a crashed pod doesn't leave a stale file behind.
pub fn spit_portfile(dir: &Path, pid: u32, port: u16) -> Result<PathBuf, PortfileError> {
    let path = portfile_path(dir, pid);
    fs::write(&path, format!("{port}\n"))
        .map_err(|source| PortfileError::Write { path: path.clone(), source })?;
    Ok(path)
}

pub fn remove_portfile(path: &Path) {
    // Best-effort: the file may already be gone, and a failure here must
    // never mask the real shutdown error.
    let _ = fs::remove_file(path);
}

fn portfile_path(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!(".babashka-pod-{pid}.port"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_removes_portfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = spit_portfile(dir.path(), 1234, 5555).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "5555\n");
        remove_portfile(&path);
        assert!(!path.exists());
    }

    #[test]
    fn remove_is_a_noop_when_file_is_already_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = portfile_path(dir.path(), 1);
        remove_portfile(&path);
    }
}
