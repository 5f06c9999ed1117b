pub mod debounce;

pub use debounce::DebounceGate;

use crate::config::{Config, WatchConfig};
use crate::convert::{ConversionOutcome, Converter};
use anyhow::{Context, Result};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tsremux_av::{tools, RemuxCommand};

/// Capacity of the channels bridging the notify thread to the loop
const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    Other,
}

/// A single path-level change reported by the notification source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Create,
        }
    }

    pub fn other(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Other,
        }
    }

    /// Split a notify event into one event per path.
    ///
    /// A name arriving by rename counts as created. inotify follows a
    /// rename's `To` with a `Both` event for the same move, so `Both` only
    /// ever yields `Other` and each move is dispatched once.
    fn from_notify(event: Event) -> impl Iterator<Item = FileEvent> {
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                FileEventKind::Create
            }
            _ => FileEventKind::Other,
        };
        event.paths.into_iter().map(move |path| FileEvent { path, kind })
    }
}

/// Non-recursive directory subscription feeding two channels
pub struct NotifySource {
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<FileEvent>,
    errors: mpsc::Receiver<notify::Error>,
}

impl NotifySource {
    /// Start receiving change notifications for `dir`
    pub fn subscribe(dir: &Path) -> Result<Self> {
        let (event_tx, events) = mpsc::channel::<FileEvent>(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel::<notify::Error>(CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(event) {
                        let _ = event_tx.blocking_send(file_event);
                    }
                }
                Err(e) => {
                    let _ = error_tx.blocking_send(e);
                }
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {:?}", dir))?;

        Ok(Self {
            watcher,
            events,
            errors,
        })
    }

    /// The watcher must outlive the loop; dropping it closes both channels.
    pub fn into_parts(
        self,
    ) -> (
        RecommendedWatcher,
        mpsc::Receiver<FileEvent>,
        mpsc::Receiver<notify::Error>,
    ) {
        (self.watcher, self.events, self.errors)
    }
}

/// Outcome of one dispatched job, for callers that want to observe the loop
#[derive(Debug)]
pub struct JobReport {
    pub source: PathBuf,
    pub outcome: ConversionOutcome,
}

/// Filters events and fans accepted files out to conversion tasks
pub struct WatchLoop {
    extension: String,
    gate: DebounceGate,
    converter: Arc<Converter>,
    permits: Option<Arc<Semaphore>>,
    reports: Option<mpsc::UnboundedSender<JobReport>>,
}

impl WatchLoop {
    /// Build a loop that remuxes with the configured ffmpeg
    pub fn new(config: &Config) -> Self {
        let program = config
            .tools
            .ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(tools::FFMPEG));

        if let Err(e) = tools::get_tool_path(tools::FFMPEG, config.tools.ffmpeg_path.as_deref()) {
            tracing::warn!("{}; conversions will fail until it is installed", e);
        }

        let converter = Converter::new(
            Arc::new(RemuxCommand::new(program)),
            &config.watch.dest_dir,
            &config.conversion,
        );
        Self::with_converter(&config.watch, Arc::new(converter), config.conversion.max_concurrent)
    }

    pub fn with_converter(
        watch: &WatchConfig,
        converter: Arc<Converter>,
        max_concurrent: usize,
    ) -> Self {
        let permits = (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent)));
        Self {
            extension: watch.extension.clone(),
            gate: DebounceGate::from_config(watch),
            converter,
            permits,
            reports: None,
        }
    }

    /// Send every finished job to `tx`
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<JobReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn with_gate(mut self, gate: DebounceGate) -> Self {
        self.gate = gate;
        self
    }

    /// Only freshly created files carrying the watched extension are converted
    pub fn accepts(&self, event: &FileEvent) -> bool {
        event.kind == FileEventKind::Create
            && tsremux_av::paths::has_extension(&event.path, &self.extension)
    }

    /// Consume events until the event stream closes.
    ///
    /// Watcher errors are logged and never end the loop.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<FileEvent>,
        mut errors: mpsc::Receiver<notify::Error>,
    ) -> Result<()> {
        let mut errors_open = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) if self.accepts(&event) => {
                        tracing::info!("Detected new file: {:?}", event.path);
                        self.dispatch(event.path);
                    }
                    Some(event) => {
                        tracing::trace!("Ignoring {:?} event for {:?}", event.kind, event.path);
                    }
                    None => {
                        tracing::info!("Event stream closed, stopping watch loop");
                        return Ok(());
                    }
                },

                error = errors.recv(), if errors_open => match error {
                    Some(e) => tracing::warn!("File watcher error: {}", e),
                    None => errors_open = false,
                },
            }
        }
    }

    /// Debounce then convert on a separate task; the loop never waits for it
    fn dispatch(&self, path: PathBuf) {
        let gate = self.gate.clone();
        let converter = self.converter.clone();
        let permits = self.permits.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            gate.wait(&path).await;

            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let job_path = path.clone();
            let outcome = match tokio::task::spawn_blocking(move || converter.convert(&job_path)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Conversion task for {:?} did not complete: {}", path, e);
                    ConversionOutcome::Failed {
                        destination: None,
                        error: std::io::Error::other(e.to_string()).into(),
                    }
                }
            };

            if let Some(tx) = reports {
                let _ = tx.send(JobReport {
                    source: path,
                    outcome,
                });
            }
        });
    }
}

/// Watch `config.watch.source_dir` and convert new recordings until the
/// notification source shuts down.
pub async fn watch(config: &Config) -> Result<()> {
    let dest_dir = &config.watch.dest_dir;
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create destination directory: {:?}", dest_dir))?;

    let source = NotifySource::subscribe(&config.watch.source_dir)?;
    tracing::info!(
        "Watching directory: {:?} (output: {:?})",
        config.watch.source_dir,
        dest_dir
    );

    let (watcher, events, errors) = source.into_parts();
    let result = WatchLoop::new(config).run(events, errors).await;
    drop(watcher);
    result
}
