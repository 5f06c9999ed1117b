//! Log sink selection.
//!
//! Interactive runs log to stderr. Service runs write a daily log file into
//! the service's log directory and fall back to stderr (captured by the
//! journal) when that directory is unusable.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// Where log records go.
#[derive(Debug, Clone)]
pub enum LogTarget {
    Console,
    /// `<dir>/<name>.<date>.log`
    ServiceDir { dir: PathBuf, name: String },
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "tsremux=debug,tsremux_av=debug"
    } else {
        "tsremux=info,tsremux_av=info"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the service log file and must be held until
/// the process exits.
pub fn init(verbose: bool, target: &LogTarget) -> Option<WorkerGuard> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(verbose));

    match target {
        LogTarget::Console => {
            builder.with_writer(std::io::stderr).init();
            None
        }
        LogTarget::ServiceDir { dir, name } => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(name)
                .filename_suffix("log")
                .build(dir);

            match appender {
                Ok(appender) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    builder.with_ansi(false).with_writer(writer).init();
                    Some(guard)
                }
                Err(e) => {
                    builder.with_ansi(false).with_writer(std::io::stderr).init();
                    tracing::warn!("Cannot log to {:?}, using stderr: {}", dir, e);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(false), "tsremux=info,tsremux_av=info");
        assert!(default_directives(true).contains("tsremux=debug"));
    }

    #[test]
    fn test_default_directives_parse() {
        for verbose in [false, true] {
            assert!(default_directives(verbose).parse::<EnvFilter>().is_ok());
        }
    }
}
