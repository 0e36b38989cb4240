//! Client identity snapshot streamed to the server for audit.

use std::env;
use std::path::Path;

/// Ambient client attributes, captured once at driver construction.
///
/// Snapshotting keeps the handshake deterministic: two attempts built from
/// the same context send byte-identical metadata, which is what the tests
/// rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// Operating system name
    pub os: String,
    /// Local host name
    pub host_name: String,
    /// OS-level user running the process
    pub os_user: String,
    /// Process id, announced under REMOTE_PID
    pub pid: u32,
    /// Application name, defaulting to the executable basename
    pub app_name: String,
}

impl ClientContext {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            host_name: env::var("HOSTNAME")
                .or_else(|_| env::var("COMPUTERNAME"))
                .unwrap_or_else(|_| "localhost".to_string()),
            os_user: env::var("USER")
                .or_else(|_| env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            app_name: default_app_name(),
        }
    }
}

/// Basename of the host process's executable.
fn default_app_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|path| app_name_from_path(&path))
        .unwrap_or_else(|| "netezza-driver".to_string())
}

fn app_name_from_path(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_capture_populates_fields() {
        let context = ClientContext::capture();
        assert!(!context.os.is_empty());
        assert!(!context.host_name.is_empty());
        assert!(!context.os_user.is_empty());
        assert!(context.pid > 0);
        assert!(!context.app_name.is_empty());
    }

    #[test]
    fn test_capture_is_stable() {
        // Two snapshots in the same process observe the same environment
        assert_eq!(ClientContext::capture(), ClientContext::capture());
    }

    #[test]
    fn test_app_name_from_path() {
        let path = PathBuf::from("/usr/local/bin/nzsql");
        assert_eq!(app_name_from_path(&path), Some("nzsql".to_string()));
    }

    #[test]
    fn test_app_name_from_bare_name() {
        let path = PathBuf::from("loader.exe");
        assert_eq!(app_name_from_path(&path), Some("loader.exe".to_string()));
    }
}
