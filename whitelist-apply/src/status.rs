//! Read-only health report for a configuration file

use crate::nginx::{NginxControl, TestResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tokio::fs;

/// What the dashboard shows about the server and its configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    pub running: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub config_exists: bool,
    pub config_valid: TestResult,
    pub writable: bool,
}

#[derive(Debug, Clone)]
pub struct StatusInspector {
    nginx: NginxControl,
}

impl StatusInspector {
    pub fn new(nginx: NginxControl) -> Self {
        Self { nginx }
    }

    pub async fn status(&self, path: &Path) -> ConfigStatus {
        let metadata = fs::metadata(path).await.ok();
        let config_exists = metadata.is_some();
        let last_modified = metadata
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        let (running, config_valid) = if config_exists {
            tokio::join!(self.nginx.is_running(), self.nginx.test_config(path))
        } else {
            (
                self.nginx.is_running().await,
                TestResult::failed("not tested"),
            )
        };

        ConfigStatus {
            running,
            last_modified,
            config_exists,
            config_valid,
            writable: writable_off_runtime(path).await,
        }
    }
}

/// [`is_writable`] on the blocking pool
async fn writable_off_runtime(path: &Path) -> bool {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || is_writable(&path)).await {
        Ok(writable) => writable,
        Err(e) => {
            tracing::warn!("Writability check did not complete: {}", e);
            false
        }
    }
}

/// Whether `path` could be written: the file itself if it exists, otherwise
/// the nearest existing ancestor directory
pub fn is_writable(path: &Path) -> bool {
    path.ancestors()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .find(|p| p.exists())
        .is_some_and(access_writable)
}

#[cfg(unix)]
fn access_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn access_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
