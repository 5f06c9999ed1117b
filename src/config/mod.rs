mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    prepare_config(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./tsremux.toml",
        "~/.config/tsremux/config.toml",
        "/etc/tsremux/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    let mut config = Config::default();
    prepare_config(&mut config);
    Ok(config)
}

/// Expand `~` in a user supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

fn prepare_config(config: &mut Config) {
    config.watch.source_dir = expand_path(&config.watch.source_dir);
    config.watch.dest_dir = expand_path(&config.watch.dest_dir);
    config.watch.extension = config.watch.extension.trim_start_matches('.').to_string();
    config.tools.ffmpeg_path = config.tools.ffmpeg_path.as_deref().map(expand_path);
}

/// Apply command-line directory overrides and re-validate.
pub fn apply_overrides(
    config: &mut Config,
    source_dir: Option<&Path>,
    dest_dir: Option<&Path>,
) -> Result<()> {
    if let Some(src) = source_dir {
        config.watch.source_dir = expand_path(src);
    }
    if let Some(dest) = dest_dir {
        config.watch.dest_dir = expand_path(dest);
    }
    validate_config(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let extension = &config.watch.extension;
    if extension.is_empty() {
        anyhow::bail!("Watch extension cannot be empty");
    }
    if extension.eq_ignore_ascii_case(tsremux_av::paths::MP4_EXTENSION) {
        anyhow::bail!("Watch extension cannot be the output extension 'mp4'");
    }

    if config.watch.stability_checks > 0 && config.watch.stability_interval_ms == 0 {
        anyhow::bail!("stability_interval_ms must be positive when stability_checks is set");
    }

    if config.service.stop_timeout_secs == 0 {
        anyhow::bail!("Service stop timeout cannot be 0");
    }
    if config.service.stop_poll_interval_ms == 0 {
        anyhow::bail!("Service stop poll interval cannot be 0");
    }

    let name = &config.service.name;
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
    {
        anyhow::bail!("Invalid service name: {:?}", name);
    }

    if let Some(ref path) = config.tools.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    Ok(())
}
