//! Error types for tsremux-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while remuxing a file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool ran but exited unsuccessfully.
    #[error("{tool} exited with {}: {stderr}", describe_code(*code))]
    ToolFailed {
        tool: String,
        /// Exit code, `None` when the process was killed by a signal.
        code: Option<i32>,
        /// Tail of the captured standard error.
        stderr: String,
    },

    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Exit code of a failed tool run, if the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ToolFailed { code, .. } => *code,
            _ => None,
        }
    }
}
