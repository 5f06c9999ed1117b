//! systemd backend for the service controller and runtime.
//!
//! Registration writes a unit file into the unit directory and enables it so
//! the watcher starts with the system. The log source is a directory under
//! the configured log root that the service-mode subscriber writes into.
//!
//! While running as a unit, systemd control maps onto signals:
//! `SIGTERM` is a stop, `SIGINT` a shutdown, `SIGUSR1` an interrogate. Status
//! goes back through the notification socket (`Type=notify`).

use super::controller::{ServiceManager, ServiceSpec};
use super::runtime::StatusSink;
use super::{ControlRequest, Result, ServiceError, ServiceState, ServiceStatus};
use crate::config::ServiceConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tokio::sync::mpsc;

/// Service manager driven through `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemdManager {
    unit_dir: PathBuf,
    log_root: PathBuf,
    systemctl: PathBuf,
}

impl SystemdManager {
    pub fn new(unit_dir: impl Into<PathBuf>, log_root: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            log_root: log_root.into(),
            systemctl: PathBuf::from("systemctl"),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.unit_dir, &config.log_root)
    }

    /// Use a different `systemctl` binary.
    pub fn with_systemctl(mut self, systemctl: impl Into<PathBuf>) -> Self {
        self.systemctl = systemctl.into();
        self
    }

    fn unit_name(name: &str) -> String {
        format!("{}.service", name)
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(Self::unit_name(name))
    }

    fn log_dir(&self, name: &str) -> PathBuf {
        self.log_root.join(name)
    }

    fn systemctl(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!("Running systemctl {}", args.join(" "));
        Command::new(&self.systemctl)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ServiceError::Manager(format!("{} not found", self.systemctl.display()))
                } else {
                    ServiceError::Io(e)
                }
            })
    }

    /// Run systemctl and turn a non-zero exit into a manager error.
    fn systemctl_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.systemctl(args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ServiceError::Manager(format!(
                "systemctl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl ServiceManager for SystemdManager {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.unit_path(name).exists())
    }

    fn create(&self, spec: &ServiceSpec) -> Result<()> {
        let unit_path = self.unit_path(&spec.name);
        fs::write(&unit_path, render_unit(spec))?;
        tracing::debug!("Wrote unit file {:?}", unit_path);

        let unit = Self::unit_name(&spec.name);
        let enabled = self
            .systemctl_checked(&["daemon-reload"])
            .and_then(|_| self.systemctl_checked(&["enable", &unit]));

        if let Err(e) = enabled {
            if let Err(rollback) = fs::remove_file(&unit_path) {
                tracing::warn!("Failed to remove unit file {:?}: {}", unit_path, rollback);
            }
            if let Err(rollback) = self.systemctl_checked(&["daemon-reload"]) {
                tracing::warn!("Failed to reload systemd after rollback: {}", rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let unit = Self::unit_name(name);
        if let Err(e) = self.systemctl_checked(&["disable", &unit]) {
            tracing::warn!("{}", e);
        }
        fs::remove_file(self.unit_path(name))?;
        self.systemctl_checked(&["daemon-reload"])
    }

    fn start(&self, name: &str) -> Result<()> {
        let output = self.systemctl(&["start", &Self::unit_name(name)])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ServiceError::ControlRejected {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn request_stop(&self, name: &str) -> Result<()> {
        let output = self.systemctl(&["stop", "--no-block", &Self::unit_name(name)])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ServiceError::ControlRejected {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn query_state(&self, name: &str) -> Result<ServiceState> {
        let output = self.systemctl(&[
            "show",
            "--property=ActiveState",
            "--value",
            &Self::unit_name(name),
        ])?;
        if !output.status.success() {
            return Err(ServiceError::Manager(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_active_state(&String::from_utf8_lossy(&output.stdout)))
    }

    fn install_log_source(&self, name: &str) -> Result<()> {
        let dir = self.log_dir(name);
        fs::create_dir_all(&dir).map_err(|e| ServiceError::LogSource {
            name: name.to_string(),
            reason: format!("{:?}: {}", dir, e),
        })
    }

    fn remove_log_source(&self, name: &str) -> Result<()> {
        let dir = self.log_dir(name);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir).map_err(|e| ServiceError::LogSource {
            name: name.to_string(),
            reason: format!("{:?}: {}", dir, e),
        })
    }
}

/// Map `systemctl show -p ActiveState` output onto the service states.
pub fn parse_active_state(value: &str) -> ServiceState {
    match value.trim() {
        "active" | "reloading" => ServiceState::Running,
        "activating" => ServiceState::StartPending,
        "deactivating" => ServiceState::StopPending,
        // inactive, failed, and units systemd no longer knows about
        _ => ServiceState::Stopped,
    }
}

/// Render the unit file registered for `spec`.
pub fn render_unit(spec: &ServiceSpec) -> String {
    let mut exec = quote_arg(&spec.executable.to_string_lossy());
    for arg in &spec.args {
        exec.push(' ');
        exec.push_str(&quote_arg(&arg.to_string_lossy()));
    }

    format!(
        "[Unit]\n\
         Description={description}\n\
         After=local-fs.target\n\
         \n\
         [Service]\n\
         Type=notify\n\
         ExecStart={exec}\n\
         KillSignal=SIGTERM\n\
         TimeoutStopSec=20\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        description = spec.description,
        exec = exec,
    )
}

/// Quote an ExecStart argument when it contains whitespace or quotes.
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        return arg.to_string();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Reports status changes over the systemd notification socket.
///
/// Outside of systemd there is no socket and every report is a no-op.
pub struct SdNotifySink {
    description: String,
}

impl SdNotifySink {
    pub fn new(source_dir: &Path) -> Self {
        Self {
            description: format!("Watching {}", source_dir.display()),
        }
    }
}

impl StatusSink for SdNotifySink {
    fn report(&mut self, status: ServiceStatus) {
        let result = match status.state {
            ServiceState::StartPending => {
                sd_notify::notify(false, &[sd_notify::NotifyState::Status("Starting")])
            }
            ServiceState::Running => sd_notify::notify(
                false,
                &[
                    sd_notify::NotifyState::Ready,
                    sd_notify::NotifyState::Status(&self.description),
                ],
            ),
            ServiceState::StopPending => sd_notify::notify(
                false,
                &[
                    sd_notify::NotifyState::Stopping,
                    sd_notify::NotifyState::Status("Stopping"),
                ],
            ),
            ServiceState::Stopped => {
                sd_notify::notify(false, &[sd_notify::NotifyState::Status("Stopped")])
            }
        };

        if let Err(e) = result {
            tracing::debug!("sd_notify failed: {}", e);
        }
    }
}

/// Translate process signals into control requests.
#[cfg(unix)]
pub fn control_requests() -> std::io::Result<mpsc::Receiver<ControlRequest>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = terminate.recv() => ControlRequest::Stop,
                _ = interrupt.recv() => ControlRequest::Shutdown,
                _ = user1.recv() => ControlRequest::Interrogate,
                _ = hangup.recv() => ControlRequest::Other(SignalKind::hangup().as_raw_value()),
            };
            if tx.send(request).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Translate Ctrl-C into a shutdown request.
#[cfg(not(unix))]
pub fn control_requests() -> std::io::Result<mpsc::Receiver<ControlRequest>> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(ControlRequest::Shutdown).await;
        }
    });
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Accepts;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn spec() -> ServiceSpec {
        ServiceSpec {
            name: "tsremux".to_string(),
            description: "TS to MP4 Converter Service".to_string(),
            executable: PathBuf::from("/usr/local/bin/tsremux"),
            args: vec![
                "--service".into(),
                "--src".into(),
                "/srv/My Recordings".into(),
            ],
        }
    }

    #[test]
    fn test_render_unit() {
        let unit = render_unit(&spec());
        assert!(unit.contains("Description=TS to MP4 Converter Service\n"));
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/tsremux --service --src \"/srv/My Recordings\"\n"
        ));
        assert!(unit.contains("Type=notify\n"));
        assert!(unit.contains("WantedBy=multi-user.target\n"));
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("/plain/path"), "/plain/path");
        assert_eq!(quote_arg("a b"), "\"a b\"");
        assert_eq!(quote_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_arg(""), "\"\"");
    }

    #[test]
    fn test_parse_active_state() {
        assert_eq!(parse_active_state("active\n"), ServiceState::Running);
        assert_eq!(parse_active_state("activating"), ServiceState::StartPending);
        assert_eq!(parse_active_state("deactivating"), ServiceState::StopPending);
        assert_eq!(parse_active_state("inactive"), ServiceState::Stopped);
        assert_eq!(parse_active_state("failed"), ServiceState::Stopped);
    }

    #[test]
    fn test_log_source_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SystemdManager::new(dir.path().join("units"), dir.path().join("log"));

        manager.install_log_source("tsremux").unwrap();
        assert!(dir.path().join("log/tsremux").is_dir());

        manager.remove_log_source("tsremux").unwrap();
        assert!(!dir.path().join("log/tsremux").exists());

        // removing an absent source is not an error
        manager.remove_log_source("tsremux").unwrap();
    }

    #[test]
    fn test_exists_follows_unit_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SystemdManager::new(dir.path(), dir.path().join("log"));
        assert!(!manager.exists("tsremux").unwrap());

        fs::write(dir.path().join("tsremux.service"), "").unwrap();
        assert!(manager.exists("tsremux").unwrap());
    }

    #[test]
    fn test_missing_systemctl_is_manager_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SystemdManager::new(dir.path(), dir.path().join("log"))
            .with_systemctl("nonexistent_systemctl_12345");

        assert_matches!(manager.start("tsremux"), Err(ServiceError::Manager(_)));
    }

    #[test]
    fn test_create_rolls_back_unit_file_when_enable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SystemdManager::new(dir.path(), dir.path().join("log"))
            .with_systemctl("nonexistent_systemctl_12345");

        assert!(manager.create(&spec()).is_err());
        assert!(!dir.path().join("tsremux.service").exists());
    }

    #[test]
    fn test_create_rollback_failures_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SystemdManager::new(dir.path(), dir.path().join("log"))
            .with_systemctl("nonexistent_systemctl_12345");

        let logs = Arc::new(Mutex::new(Vec::new()));
        let writer_logs = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || CapturedLog(writer_logs.clone()))
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || manager.create(&spec()));
        assert_matches!(result, Err(ServiceError::Manager(_)));

        let output = String::from_utf8(logs.lock().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("Failed to reload systemd after rollback"));
    }

    #[test]
    fn test_sink_outside_systemd_is_silent() {
        let mut sink = SdNotifySink::new(Path::new("/in"));
        sink.report(ServiceStatus::new(
            ServiceState::Running,
            Accepts::STOP_AND_SHUTDOWN,
        ));
    }
}
