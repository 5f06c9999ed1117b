use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Directory watched (non-recursively) for new recordings
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Directory receiving the remuxed MP4 files
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,

    /// Extension of the files to convert, without the leading dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Minimum delay between a create event and the conversion
    #[serde(default = "default_settle_time")]
    pub settle_time_ms: u64,

    /// Consecutive unchanged size readings required after the settle delay (0 = off)
    #[serde(default)]
    pub stability_checks: u32,

    /// Delay between two size readings
    #[serde(default = "default_stability_interval")]
    pub stability_interval_ms: u64,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("~/Downloads")
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("~/Downloads/dest")
}

fn default_extension() -> String {
    "ts".to_string()
}

fn default_settle_time() -> u64 {
    2000
}

fn default_stability_interval() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            dest_dir: default_dest_dir(),
            extension: default_extension(),
            settle_time_ms: default_settle_time(),
            stability_checks: 0,
            stability_interval_ms: default_stability_interval(),
        }
    }
}

/// What to do when the MP4 name for a recording is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Pick the next free `name-N.mp4`
    #[default]
    Uniquify,
    /// Replace the existing file once the new one is complete
    Overwrite,
    /// Leave the recording alone and log a warning
    Skip,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Maximum number of remux processes running at once (0 = unlimited)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Delete the recording after a successful remux
    #[serde(default = "default_delete_source")]
    pub delete_source: bool,

    #[serde(default)]
    pub on_collision: CollisionPolicy,
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

fn default_delete_source() -> bool {
    true
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            delete_source: default_delete_source(),
            on_collision: CollisionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Path to the ffmpeg binary; looked up on `PATH` when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Name registered with the service manager
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_service_description")]
    pub description: String,

    /// How long `stop` waits for the service to reach the stopped state
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Delay between two status queries while stopping
    #[serde(default = "default_stop_poll_interval")]
    pub stop_poll_interval_ms: u64,

    /// Where unit files are written
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,

    /// Parent of the per-service log directory
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
}

fn default_service_name() -> String {
    "tsremux".to_string()
}

fn default_service_description() -> String {
    "TS to MP4 Converter Service".to_string()
}

fn default_stop_timeout() -> u64 {
    20
}

fn default_stop_poll_interval() -> u64 {
    300
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_log_root() -> PathBuf {
    PathBuf::from("/var/log")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            description: default_service_description(),
            stop_timeout_secs: default_stop_timeout(),
            stop_poll_interval_ms: default_stop_poll_interval(),
            unit_dir: default_unit_dir(),
            log_root: default_log_root(),
        }
    }
}

impl ServiceConfig {
    /// Log directory registered as the service's log source.
    pub fn log_dir(&self) -> PathBuf {
        self.log_root.join(&self.name)
    }
}
