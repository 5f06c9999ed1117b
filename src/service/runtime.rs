use super::{Accepts, ControlRequest, ServiceState, ServiceStatus};
use std::future::Future;
use tokio::sync::mpsc;

/// Receives every status the service reports to its manager.
pub trait StatusSink: Send {
    fn report(&mut self, status: ServiceStatus);
}

/// Why the service left the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceExit {
    /// A stop or shutdown request was honoured.
    Requested,
    /// The manager stopped delivering control requests.
    ControlClosed,
    /// The worker ended on its own while the service was running.
    WorkerEnded(String),
}

impl ServiceExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceExit::Requested | ServiceExit::ControlClosed => 0,
            ServiceExit::WorkerEnded(_) => 1,
        }
    }
}

/// Owns the service state and relays control requests around a worker.
pub struct ServiceRuntime<S> {
    status: ServiceStatus,
    sink: S,
}

impl<S: StatusSink> ServiceRuntime<S> {
    pub fn new(sink: S) -> Self {
        Self {
            status: ServiceStatus::new(ServiceState::Stopped, Accepts::NONE),
            sink,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn transition(&mut self, state: ServiceState, accepts: Accepts) {
        tracing::debug!("Service state {:?} -> {:?}", self.status.state, state);
        self.status = ServiceStatus::new(state, accepts);
        self.sink.report(self.status);
    }

    /// Spawn `worker`, report `Running`, and handle control requests until
    /// asked to stop or until the worker ends. Always finishes `Stopped`.
    ///
    /// The worker is abandoned, not awaited, once the service stops.
    pub async fn run<F>(&mut self, worker: F, mut requests: mpsc::Receiver<ControlRequest>) -> ServiceExit
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.transition(ServiceState::StartPending, Accepts::NONE);
        let mut worker = tokio::spawn(worker);
        self.transition(ServiceState::Running, Accepts::STOP_AND_SHUTDOWN);

        let exit = loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(ControlRequest::Interrogate) => {
                        self.sink.report(self.status);
                    }
                    Some(request @ (ControlRequest::Stop | ControlRequest::Shutdown)) => {
                        tracing::info!("Received {:?} request", request);
                        break ServiceExit::Requested;
                    }
                    Some(ControlRequest::Other(code)) => {
                        tracing::warn!("Ignoring unhandled control request {}", code);
                    }
                    None => {
                        tracing::warn!("Control request channel closed");
                        break ServiceExit::ControlClosed;
                    }
                },

                finished = &mut worker => {
                    let reason = match finished {
                        Ok(Ok(())) => "watch loop ended".to_string(),
                        Ok(Err(e)) => format!("{:#}", e),
                        Err(e) => format!("watch task failed: {}", e),
                    };
                    tracing::error!("Service worker stopped unexpectedly: {}", reason);
                    break ServiceExit::WorkerEnded(reason);
                }
            }
        };

        self.transition(ServiceState::StopPending, Accepts::NONE);
        worker.abort();
        self.transition(ServiceState::Stopped, Accepts::NONE);
        exit
    }
}
