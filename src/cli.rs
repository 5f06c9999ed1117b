use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Long options that may also be spelled with a single dash (`-src`)
const LONG_FLAGS: &[&str] = &[
    "src",
    "dest",
    "config",
    "verbose",
    "install",
    "remove",
    "start",
    "stop",
    "check-tools",
    "service",
    "help",
    "version",
];

#[derive(Parser, Debug)]
#[command(name = "tsremux")]
#[command(author, version, about = "Watch a folder and remux new .ts recordings to .mp4")]
pub struct Cli {
    /// Directory to watch for new recordings
    #[arg(long)]
    pub src: Option<PathBuf>,

    /// Directory that receives the converted files
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Install the background service
    #[arg(long)]
    pub install: bool,

    /// Remove the background service
    #[arg(long)]
    pub remove: bool,

    /// Start the installed service
    #[arg(long)]
    pub start: bool,

    /// Stop the running service
    #[arg(long)]
    pub stop: bool,

    /// Check that the remux tool is available
    #[arg(long)]
    pub check_tools: bool,

    /// Run the service state machine even without a service manager session
    #[arg(long, hide = true)]
    pub service: bool,
}

/// One-shot action requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Remove,
    Start,
    Stop,
    CheckTools,
}

impl Cli {
    /// The first requested action wins: install, remove, start, stop, check-tools.
    pub fn action(&self) -> Option<Action> {
        [
            (self.install, Action::Install),
            (self.remove, Action::Remove),
            (self.start, Action::Start),
            (self.stop, Action::Stop),
            (self.check_tools, Action::CheckTools),
        ]
        .into_iter()
        .find_map(|(requested, action)| requested.then_some(action))
    }

    /// Arguments the installed service is started with.
    pub fn service_args(&self, src: &std::path::Path, dest: &std::path::Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--service".into(),
            "--src".into(),
            src.as_os_str().to_owned(),
            "--dest".into(),
            dest.as_os_str().to_owned(),
        ];
        if let Some(ref config) = self.config {
            let config = std::fs::canonicalize(config).unwrap_or_else(|_| config.clone());
            args.push("--config".into());
            args.push(config.into_os_string());
        }
        if self.verbose {
            args.push("--verbose".into());
        }
        args
    }
}

/// Accept `-src dir` as well as `--src dir`.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let mut normalized: Vec<OsString> = args.next().into_iter().collect();

    for arg in args {
        let rewritten = arg.to_str().and_then(|s| {
            let rest = s.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
            let name = rest.split('=').next().unwrap_or(rest);
            LONG_FLAGS
                .contains(&name)
                .then(|| OsString::from(format!("--{}", rest)))
        });
        normalized.push(rewritten.unwrap_or(arg));
    }
    normalized
}
