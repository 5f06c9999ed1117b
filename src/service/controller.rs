use super::{Result, ServiceError, ServiceState};
use crate::config::ServiceConfig;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What gets registered with the service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub executable: PathBuf,
    pub args: Vec<OsString>,
}

impl ServiceSpec {
    /// Register the running binary with `args`.
    pub fn for_current_exe(
        name: impl Into<String>,
        description: impl Into<String>,
        args: Vec<OsString>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            executable: std::env::current_exe()?,
            args,
        })
    }
}

/// Operations offered by the OS service-management facility.
///
/// Registrations created through [`ServiceManager::create`] start
/// automatically with the system.
pub trait ServiceManager {
    fn exists(&self, name: &str) -> Result<bool>;
    fn create(&self, spec: &ServiceSpec) -> Result<()>;
    fn delete(&self, name: &str) -> Result<()>;
    fn start(&self, name: &str) -> Result<()>;
    /// Ask the service to stop without waiting for it.
    fn request_stop(&self, name: &str) -> Result<()>;
    fn query_state(&self, name: &str) -> Result<ServiceState>;
    fn install_log_source(&self, name: &str) -> Result<()>;
    fn remove_log_source(&self, name: &str) -> Result<()>;
}

/// Install / remove / start / stop with existence checks and rollback.
pub struct ServiceController<M> {
    manager: M,
    stop_timeout: Duration,
    poll_interval: Duration,
}

impl<M: ServiceManager> ServiceController<M> {
    pub fn new(manager: M) -> Self {
        Self::from_config(manager, &ServiceConfig::default())
    }

    pub fn from_config(manager: M, config: &ServiceConfig) -> Self {
        Self {
            manager,
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            poll_interval: Duration::from_millis(config.stop_poll_interval_ms),
        }
    }

    pub fn with_stop_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.stop_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn install(&self, spec: &ServiceSpec) -> Result<()> {
        if self.manager.exists(&spec.name)? {
            return Err(ServiceError::AlreadyExists(spec.name.clone()));
        }

        self.manager.create(spec)?;

        if let Err(e) = self.manager.install_log_source(&spec.name) {
            tracing::warn!(
                "Log source registration for {} failed, removing the service again",
                spec.name
            );
            if let Err(rollback) = self.manager.delete(&spec.name) {
                tracing::error!("Failed to roll back service {}: {}", spec.name, rollback);
            }
            return Err(e);
        }

        tracing::info!("Service {} installed", spec.name);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.require(name)?;
        self.manager.delete(name)?;
        self.manager.remove_log_source(name)?;
        tracing::info!("Service {} removed", name);
        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<()> {
        self.require(name)?;
        self.manager.start(name)?;
        tracing::info!("Service {} started", name);
        Ok(())
    }

    /// Request a stop and wait until the service reports `Stopped`.
    pub fn stop(&self, name: &str) -> Result<()> {
        self.require(name)?;
        self.manager.request_stop(name)?;

        let deadline = Instant::now() + self.stop_timeout;
        loop {
            let state = self.manager.query_state(name)?;
            if state == ServiceState::Stopped {
                tracing::info!("Service {} stopped", name);
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ServiceError::StopTimeout {
                    name: name.to_string(),
                    timeout: self.stop_timeout,
                });
            }
            tracing::debug!("Service {} is {:?}, waiting", name, state);
            std::thread::sleep(self.poll_interval.min(remaining));
        }
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.manager.exists(name)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound(name.to_string()))
        }
    }
}
