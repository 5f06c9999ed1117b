//! # tsremux-av
//!
//! Repackage MPEG-TS recordings into MP4 without re-encoding.
//!
//! The heavy lifting is delegated to an external `ffmpeg` run as
//! `ffmpeg -i <input> -c copy <output>`. This crate provides:
//! - The [`Remux`] seam and its process-backed [`RemuxCommand`]
//! - Destination naming for converted files
//! - Tool detection for `check-tools` style reports
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use tsremux_av::{paths, Remux, RemuxCommand};
//!
//! let source = Path::new("/recordings/show.ts");
//! let output = paths::mp4_destination(source, Path::new("/library"))?;
//! RemuxCommand::ffmpeg().remux(source, &output)?;
//! # Ok::<(), tsremux_av::Error>(())
//! ```

mod error;
pub mod paths;
pub mod remux;
pub mod tools;

// Re-exports
pub use error::{Error, Result};
pub use remux::{Remux, RemuxCommand};
pub use tools::{check_tools, get_tool_path, require_tool, ToolInfo};
