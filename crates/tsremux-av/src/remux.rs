//! Stream-copy remuxing through an external ffmpeg.

use crate::tools::FFMPEG;
use crate::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Number of trailing stderr lines kept on failure.
const STDERR_TAIL_LINES: usize = 20;

/// Something that can repackage one file into another container.
///
/// Implementations block until the output is complete.
pub trait Remux: Send + Sync {
    /// Remux `input` into `output` without re-encoding.
    fn remux(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Runs `<program> -i <input> -c copy <output>`.
#[derive(Debug, Clone)]
pub struct RemuxCommand {
    program: PathBuf,
}

impl RemuxCommand {
    /// Use a specific program instead of `ffmpeg` from `PATH`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use `ffmpeg` resolved from `PATH` at spawn time.
    pub fn ffmpeg() -> Self {
        Self::new(FFMPEG)
    }

    /// The program that will be spawned.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The exact argument list passed to the program.
    pub fn args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            input.as_os_str().to_owned(),
            "-c".into(),
            "copy".into(),
            output.as_os_str().to_owned(),
        ]
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl Default for RemuxCommand {
    fn default() -> Self {
        Self::ffmpeg()
    }
}

impl Remux for RemuxCommand {
    fn remux(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.exists() {
            return Err(Error::file_not_found(input));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Remuxing with {:?}: {:?} -> {:?}", self.program, input, output);

        // stdin is closed so ffmpeg can never sit on an overwrite prompt
        let result = Command::new(&self.program)
            .args(Self::args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(self.tool_name())
                } else {
                    Error::Io(e)
                }
            })?;

        if !result.status.success() {
            let stderr = stderr_tail(&result.stderr, STDERR_TAIL_LINES);
            return Err(Error::tool_failed(self.tool_name(), result.status.code(), stderr));
        }

        Ok(())
    }
}

fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
