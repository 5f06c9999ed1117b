//! tsremux - Watch a folder for MPEG-TS recordings and remux them to MP4
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod convert;
pub mod logging;
pub mod service;
pub mod watch;
