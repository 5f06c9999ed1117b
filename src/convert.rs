//! Single-file conversion: remux one recording, then clean up the source.
//!
//! A conversion is attempted exactly once. Failures are reported through
//! [`ConversionOutcome`] and logged, never retried.

use crate::config::{CollisionPolicy, ConversionConfig};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tsremux_av::{paths, Remux};

/// Result of one conversion attempt.
#[derive(Debug)]
pub enum ConversionOutcome {
    /// The MP4 was written.
    Converted {
        destination: PathBuf,
        /// Whether the recording was deleted afterwards.
        source_removed: bool,
    },
    /// The destination was taken and the collision policy said to leave it.
    Skipped { destination: PathBuf },
    /// The remux did not produce an MP4. The recording is untouched.
    Failed {
        destination: Option<PathBuf>,
        error: tsremux_av::Error,
    },
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }
}

/// Converts recordings into a fixed destination directory.
pub struct Converter {
    remuxer: Arc<dyn Remux>,
    dest_dir: PathBuf,
    delete_source: bool,
    on_collision: CollisionPolicy,
    /// Destinations owned by conversions that are still running
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl Converter {
    pub fn new(remuxer: Arc<dyn Remux>, dest_dir: impl Into<PathBuf>, options: &ConversionConfig) -> Self {
        Self {
            remuxer,
            dest_dir: dest_dir.into(),
            delete_source: options.delete_source,
            on_collision: options.on_collision,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Remux `source` into the destination directory.
    ///
    /// Blocks until the external tool exits.
    pub fn convert(&self, source: &Path) -> ConversionOutcome {
        let planned = match paths::mp4_destination(source, &self.dest_dir) {
            Ok(path) => path,
            Err(error) => {
                tracing::error!("Conversion failed for {:?}: {}", source, error);
                return ConversionOutcome::Failed {
                    destination: None,
                    error,
                };
            }
        };

        let reservation = match self.reserve(&planned) {
            Some(reservation) => reservation,
            None => {
                tracing::warn!(
                    "Skipping {:?}: destination {:?} already exists",
                    source,
                    planned
                );
                return ConversionOutcome::Skipped {
                    destination: planned,
                };
            }
        };
        let destination = reservation.path.clone();

        // Overwrite keeps the old file aside until the new one is complete
        let backup = match self.set_aside(&destination) {
            Ok(backup) => backup,
            Err(e) => {
                tracing::error!("Conversion failed for {:?}: {}", source, e);
                return ConversionOutcome::Failed {
                    destination: Some(destination),
                    error: e.into(),
                };
            }
        };

        tracing::info!("Converting {:?} -> {:?}", source, destination);

        match self.remuxer.remux(source, &destination) {
            Ok(()) => {
                tracing::info!("Conversion succeeded: {:?}", destination);
                if let Some(backup) = backup {
                    if let Err(e) = std::fs::remove_file(&backup) {
                        tracing::warn!("Failed to remove replaced file {:?}: {}", backup, e);
                    }
                }

                let source_removed = self.delete_source && remove_source(source);
                ConversionOutcome::Converted {
                    destination,
                    source_removed,
                }
            }
            Err(error) => {
                tracing::error!("Conversion failed for {:?}: {}", source, error);
                discard_partial(&destination);
                if let Some(backup) = backup {
                    if let Err(e) = std::fs::rename(&backup, &destination) {
                        tracing::error!(
                            "Failed to restore {:?} from {:?}: {}",
                            destination,
                            backup,
                            e
                        );
                    }
                }
                ConversionOutcome::Failed {
                    destination: Some(destination),
                    error,
                }
            }
        }
    }

    /// Claim a destination according to the collision policy.
    ///
    /// Returns `None` when the policy says to skip the recording.
    fn reserve(&self, planned: &Path) -> Option<Reservation<'_>> {
        let mut in_flight = self.in_flight.lock();

        let chosen = match self.on_collision {
            CollisionPolicy::Uniquify => {
                paths::uniquify(planned, |p| p.exists() || in_flight.contains(p))
            }
            CollisionPolicy::Overwrite => {
                if in_flight.contains(planned) {
                    paths::uniquify(planned, |p| in_flight.contains(p) || p.exists())
                } else {
                    planned.to_path_buf()
                }
            }
            CollisionPolicy::Skip => {
                if planned.exists() || in_flight.contains(planned) {
                    return None;
                }
                planned.to_path_buf()
            }
        };

        in_flight.insert(chosen.clone());
        Some(Reservation {
            path: chosen,
            owner: &self.in_flight,
        })
    }

    fn set_aside(&self, destination: &Path) -> std::io::Result<Option<PathBuf>> {
        if self.on_collision != CollisionPolicy::Overwrite || !destination.exists() {
            return Ok(None);
        }

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup = destination.with_file_name(format!(".{}.replaced", file_name));
        std::fs::rename(destination, &backup)?;
        tracing::debug!("Moved existing {:?} to {:?}", destination, backup);
        Ok(Some(backup))
    }
}

/// Releases an in-flight destination when the conversion ends.
struct Reservation<'a> {
    path: PathBuf,
    owner: &'a Mutex<HashSet<PathBuf>>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.path);
    }
}

fn remove_source(source: &Path) -> bool {
    match std::fs::remove_file(source) {
        Ok(()) => {
            tracing::info!("Removed source file: {:?}", source);
            true
        }
        Err(e) => {
            tracing::warn!("Failed to remove source file {:?}: {}", source, e);
            false
        }
    }
}

/// The destination was free before the attempt, so anything there now is ours.
fn discard_partial(destination: &Path) {
    if destination.exists() {
        match std::fs::remove_file(destination) {
            Ok(()) => tracing::debug!("Removed partial output {:?}", destination),
            Err(e) => tracing::warn!("Failed to remove partial output {:?}: {}", destination, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Copies the input to the output, or fails when told to.
    #[derive(Default)]
    pub(crate) struct FakeRemux {
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeRemux {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    impl Remux for FakeRemux {
        fn remux(&self, input: &Path, output: &Path) -> tsremux_av::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                // leave a partial file behind like an interrupted ffmpeg would
                std::fs::write(output, b"partial")?;
                return Err(tsremux_av::Error::tool_failed("ffmpeg", Some(1), "Invalid data"));
            }
            std::fs::copy(input, output)?;
            Ok(())
        }
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        let dest = dir.path().join("out");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dest).unwrap();
        (dir, src, dest)
    }

    fn converter(remux: Arc<FakeRemux>, dest: &Path, policy: CollisionPolicy) -> Converter {
        let options = ConversionConfig {
            on_collision: policy,
            ..ConversionConfig::default()
        };
        Converter::new(remux, dest, &options)
    }

    #[test]
    fn test_success_removes_source() {
        let (_dir, src, dest) = setup();
        let source = src.join("a.ts");
        std::fs::write(&source, b"payload").unwrap();

        let remux = Arc::new(FakeRemux::default());
        let outcome = converter(remux.clone(), &dest, CollisionPolicy::Uniquify).convert(&source);

        assert_matches!(outcome, ConversionOutcome::Converted { ref destination, source_removed: true }
            if *destination == dest.join("a.mp4"));
        assert!(!source.exists());
        assert_eq!(std::fs::read(dest.join("a.mp4")).unwrap(), b"payload");
        assert_eq!(remux.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delete_source_disabled_keeps_recording() {
        let (_dir, src, dest) = setup();
        let source = src.join("a.ts");
        std::fs::write(&source, b"payload").unwrap();

        let options = ConversionConfig {
            delete_source: false,
            ..ConversionConfig::default()
        };
        let outcome = Converter::new(Arc::new(FakeRemux::default()), &dest, &options).convert(&source);

        assert_matches!(outcome, ConversionOutcome::Converted { source_removed: false, .. });
        assert!(source.exists());
    }

    #[test]
    fn test_failure_keeps_source_and_leaves_no_output() {
        let (_dir, src, dest) = setup();
        let source = src.join("b.ts");
        std::fs::write(&source, b"payload").unwrap();

        let remux = Arc::new(FakeRemux::failing());
        let outcome = converter(remux.clone(), &dest, CollisionPolicy::Uniquify).convert(&source);

        assert_matches!(outcome, ConversionOutcome::Failed { ref error, .. }
            if error.exit_code() == Some(1));
        assert!(source.exists());
        assert!(!dest.join("b.mp4").exists());
        assert_eq!(remux.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_source_fails_without_output() {
        let (_dir, src, dest) = setup();
        let outcome = Converter::new(
            Arc::new(tsremux_av::RemuxCommand::new("nonexistent_tool_12345")),
            &dest,
            &ConversionConfig::default(),
        )
        .convert(&src.join("gone.ts"));

        assert_matches!(outcome, ConversionOutcome::Failed { error: tsremux_av::Error::FileNotFound { .. }, .. });
        assert!(std::fs::read_dir(&dest).unwrap().next().is_none());
    }

    #[test]
    fn test_uniquify_does_not_touch_existing_file() {
        let (_dir, src, dest) = setup();
        std::fs::write(dest.join("a.mp4"), b"older").unwrap();
        let source = src.join("a.ts");
        std::fs::write(&source, b"newer").unwrap();

        let outcome = converter(Arc::new(FakeRemux::default()), &dest, CollisionPolicy::Uniquify)
            .convert(&source);

        assert_matches!(outcome, ConversionOutcome::Converted { ref destination, .. }
            if *destination == dest.join("a-1.mp4"));
        assert_eq!(std::fs::read(dest.join("a.mp4")).unwrap(), b"older");
        assert_eq!(std::fs::read(dest.join("a-1.mp4")).unwrap(), b"newer");
    }

    #[test]
    fn test_skip_leaves_recording_in_place() {
        let (_dir, src, dest) = setup();
        std::fs::write(dest.join("a.mp4"), b"older").unwrap();
        let source = src.join("a.TS");
        std::fs::write(&source, b"newer").unwrap();

        let remux = Arc::new(FakeRemux::default());
        let outcome = converter(remux.clone(), &dest, CollisionPolicy::Skip).convert(&source);

        assert_matches!(outcome, ConversionOutcome::Skipped { .. });
        assert!(source.exists());
        assert_eq!(std::fs::read(dest.join("a.mp4")).unwrap(), b"older");
        assert_eq!(remux.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_overwrite_replaces_on_success() {
        let (_dir, src, dest) = setup();
        std::fs::write(dest.join("a.mp4"), b"older").unwrap();
        let source = src.join("a.ts");
        std::fs::write(&source, b"newer").unwrap();

        let outcome = converter(Arc::new(FakeRemux::default()), &dest, CollisionPolicy::Overwrite)
            .convert(&source);

        assert!(outcome.is_converted());
        assert_eq!(std::fs::read(dest.join("a.mp4")).unwrap(), b"newer");
        assert!(!dest.join(".a.mp4.replaced").exists());
    }

    #[test]
    fn test_overwrite_restores_existing_file_on_failure() {
        let (_dir, src, dest) = setup();
        std::fs::write(dest.join("a.mp4"), b"older").unwrap();
        let source = src.join("a.ts");
        std::fs::write(&source, b"newer").unwrap();

        let outcome = converter(Arc::new(FakeRemux::failing()), &dest, CollisionPolicy::Overwrite)
            .convert(&source);

        assert_matches!(outcome, ConversionOutcome::Failed { .. });
        assert_eq!(std::fs::read(dest.join("a.mp4")).unwrap(), b"older");
        assert!(source.exists());
    }

    #[test]
    fn test_in_flight_destinations_are_not_shared() {
        let (_dir, _src, dest) = setup();
        let conv = converter(Arc::new(FakeRemux::default()), &dest, CollisionPolicy::Uniquify);

        let first = conv.reserve(&dest.join("a.mp4")).unwrap();
        let second = conv.reserve(&dest.join("a.mp4")).unwrap();
        assert_eq!(first.path, dest.join("a.mp4"));
        assert_eq!(second.path, dest.join("a-1.mp4"));

        drop(first);
        let third = conv.reserve(&dest.join("a.mp4")).unwrap();
        assert_eq!(third.path, dest.join("a.mp4"));
    }
}
