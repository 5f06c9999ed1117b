mod cli;

use tsremux::{
    config::{self, Config},
    logging::{self, LogTarget},
    service::{
        self,
        systemd::{self, SdNotifySink, SystemdManager},
        ServiceController, ServiceExit, ServiceRuntime, ServiceSpec,
    },
    watch,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Action, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os()));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let service_mode = cli.action().is_none() && (cli.service || service::is_service_session());
    let target = if service_mode {
        LogTarget::ServiceDir {
            dir: config.service.log_dir(),
            name: config.service.name.clone(),
        }
    } else {
        LogTarget::Console
    };
    let _guard = logging::init(cli.verbose, &target);

    let result = match cli.action() {
        Some(Action::Install) => install(&cli, &config),
        Some(Action::Remove) => controller(&config)
            .remove(&config.service.name)
            .context("Failed to remove service"),
        Some(Action::Start) => controller(&config)
            .start(&config.service.name)
            .context("Failed to start service"),
        Some(Action::Stop) => controller(&config)
            .stop(&config.service.name)
            .context("Failed to stop service"),
        Some(Action::CheckTools) => check_tools(&config),
        None if service_mode => run_service(config),
        None => run_interactive(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = config::load_config_or_default(cli.config.as_deref())?;
    config::apply_overrides(&mut config, cli.src.as_deref(), cli.dest.as_deref())?;
    Ok(config)
}

fn controller(config: &Config) -> ServiceController<SystemdManager> {
    ServiceController::from_config(SystemdManager::from_config(&config.service), &config.service)
}

fn install(cli: &Cli, config: &Config) -> Result<()> {
    let spec = ServiceSpec::for_current_exe(
        &config.service.name,
        &config.service.description,
        cli.service_args(&config.watch.source_dir, &config.watch.dest_dir),
    )?;
    controller(config)
        .install(&spec)
        .context("Failed to install service")
}

fn run_interactive(config: Config) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        tokio::select! {
            result = watch::watch(&config) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                Ok(())
            }
        }
    })
}

fn run_service(config: Config) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let exit = rt.block_on(async {
        let requests = systemd::control_requests().context("Failed to listen for control requests")?;
        let mut runtime = ServiceRuntime::new(SdNotifySink::new(&config.watch.source_dir));

        tracing::info!("Service {} starting", config.service.name);
        let watch_config = config.clone();
        let exit = runtime
            .run(async move { watch::watch(&watch_config).await }, requests)
            .await;
        tracing::info!("Service {} stopped", config.service.name);
        anyhow::Ok(exit)
    })?;

    // abandon conversions still in flight
    rt.shutdown_background();

    match exit {
        ServiceExit::WorkerEnded(reason) => anyhow::bail!("Watch loop ended: {}", reason),
        ServiceExit::Requested | ServiceExit::ControlClosed => Ok(()),
    }
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = tsremux_av::check_tools(config.tools.ffmpeg_path.as_deref());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg is missing; install it or set tools.ffmpeg_path")
    }
}
