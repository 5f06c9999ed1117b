//! Shared fixtures for integration tests.
//!
//! A tiny shell script stands in for ffmpeg. It receives the same
//! `-i <source> -c copy <destination>` arguments the real tool would.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use tsremux::config::Config;

/// Copies the source to the destination like a successful remux.
pub const COPYING_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version fake"
    exit 0
fi
cp "$2" "$5"
"#;

/// Writes a truncated output and fails.
pub const FAILING_FFMPEG: &str = r#"#!/bin/sh
echo "partial" > "$5"
echo "$2: Invalid data found when processing input" >&2
exit 1
"#;

/// Temporary source/destination layout plus a fake ffmpeg.
pub struct Fixture {
    pub dir: TempDir,
    pub src: PathBuf,
    pub dest: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Fixture {
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        let dest = dir.path().join("out");
        std::fs::create_dir_all(&src).unwrap();

        let ffmpeg = dir.path().join("ffmpeg");
        write_script(&ffmpeg, script);

        Self {
            dir,
            src,
            dest,
            ffmpeg,
        }
    }

    /// Config with a short settle delay pointing at this fixture.
    pub fn config(&self, settle_ms: u64) -> Config {
        let mut config = Config::default();
        config.watch.source_dir = self.src.clone();
        config.watch.dest_dir = self.dest.clone();
        config.watch.settle_time_ms = settle_ms;
        config.tools.ffmpeg_path = Some(self.ffmpeg.clone());
        config
    }

    pub fn dest_entries(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.dest) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(unix)]
pub fn write_script(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
pub fn write_script(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

static LOG_BUFFER: OnceLock<Arc<Mutex<Vec<u8>>>> = OnceLock::new();

/// Everything the crate logged in this test binary.
///
/// The subscriber is global because conversions log from blocking-pool
/// threads. Tests tell their records apart by their temporary paths.
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install() -> Self {
        let buffer = LOG_BUFFER.get_or_init(|| {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            let writer = buffer.clone();
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("tsremux=debug,tsremux_av=debug"))
                .with_ansi(false)
                .with_writer(move || LogWriter(writer.clone()))
                .try_init();
            buffer
        });
        Self(buffer.clone())
    }

    /// Log lines mentioning `needle`.
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
