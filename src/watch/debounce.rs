use crate::config::WatchConfig;
use std::path::Path;
use std::time::Duration;

/// Holds a freshly created file back until its writer has likely finished.
///
/// The settle delay is always served in full. When stability checks are
/// configured the gate then waits for the file size to stop changing. A file
/// that disappears ends the wait early; the conversion still runs and reports
/// the missing file.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    settle: Duration,
    stability_checks: u32,
    stability_interval: Duration,
}

impl DebounceGate {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            stability_checks: 0,
            stability_interval: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            settle: Duration::from_millis(config.settle_time_ms),
            stability_checks: config.stability_checks,
            stability_interval: Duration::from_millis(config.stability_interval_ms),
        }
    }

    /// Require `checks` identical size readings, `interval` apart.
    pub fn with_stability(mut self, checks: u32, interval: Duration) -> Self {
        self.stability_checks = checks;
        self.stability_interval = interval;
        self
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Wait until `path` is considered ready.
    pub async fn wait(&self, path: &Path) {
        tokio::time::sleep(self.settle).await;

        if self.stability_checks == 0 {
            return;
        }

        let mut last = match file_size(path).await {
            Some(size) => size,
            None => return,
        };
        let mut stable = 0;

        while stable < self.stability_checks {
            tokio::time::sleep(self.stability_interval).await;
            match file_size(path).await {
                Some(size) if size == last => stable += 1,
                Some(size) => {
                    tracing::debug!("{:?} still growing ({} -> {} bytes)", path, last, size);
                    last = size;
                    stable = 0;
                }
                None => return,
            }
        }
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}
