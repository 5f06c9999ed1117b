//! Service lifecycle: registration with the OS service manager and the
//! state machine run while executing as a service.
//!
//! - [`controller`] installs, removes, starts and stops a registered service
//! - [`runtime`] drives `StartPending -> Running -> StopPending -> Stopped`
//! - [`systemd`] is the systemd backend for both

pub mod controller;
pub mod runtime;
pub mod systemd;

pub use controller::{ServiceController, ServiceManager, ServiceSpec};
pub use runtime::{ServiceExit, ServiceRuntime, StatusSink};

use std::io::IsTerminal;
use std::time::Duration;

/// Set by systemd for `Type=notify` units. `INVOCATION_ID` is inherited by
/// every child of a unit, login shells included, and is not a marker.
const SERVICE_ENV_MARKERS: &[&str] = &["NOTIFY_SOCKET"];

/// Execution state reported to the service manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

/// Control requests the service currently honours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accepts {
    pub stop: bool,
    pub shutdown: bool,
}

impl Accepts {
    pub const NONE: Accepts = Accepts {
        stop: false,
        shutdown: false,
    };
    pub const STOP_AND_SHUTDOWN: Accepts = Accepts {
        stop: true,
        shutdown: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepts: Accepts,
}

impl ServiceStatus {
    pub fn new(state: ServiceState, accepts: Accepts) -> Self {
        Self { state, accepts }
    }
}

/// Request delivered by the service manager to a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Shutdown,
    Interrogate,
    Other(i32),
}

/// Errors from service management actions.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service {0} already exists")]
    AlreadyExists(String),

    #[error("service {0} does not exist")]
    NotFound(String),

    #[error("service {name} rejected the request: {reason}")]
    ControlRejected { name: String, reason: String },

    #[error("log source for {name} failed: {reason}")]
    LogSource { name: String, reason: String },

    #[error("service {name} did not stop within {}s", timeout.as_secs())]
    StopTimeout { name: String, timeout: Duration },

    #[error("service manager error: {0}")]
    Manager(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Whether this process was started by the service manager rather than
/// from an interactive session.
///
/// A process attached to a terminal is always interactive.
pub fn is_service_session() -> bool {
    has_service_env() && !std::io::stdin().is_terminal()
}

fn has_service_env() -> bool {
    SERVICE_ENV_MARKERS
        .iter()
        .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
}
