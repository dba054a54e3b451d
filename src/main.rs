use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use pns::{shell, Config};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Shell,
    Daemon,
}

#[derive(Parser, Debug)]
#[command(name = "pns", about = "Personal Network Storage")]
struct Args {
    /// Run as an interactive shell or as a host daemon
    #[arg(short, long, value_enum)]
    mode: Mode,

    /// Path to the YAML config file
    #[arg(short, long)]
    config: PathBuf,

    /// Shell mode only: the command to execute
    #[arg(trailing_var_arg = true)]
    cmd: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    match args.mode {
        Mode::Daemon => {
            tracing::info!("starting daemon...");
            if let Err(e) = pns::server::start_daemon(config).await {
                tracing::error!(error = %e, "daemon failed");
                return ExitCode::FAILURE;
            }
        }
        Mode::Shell => {
            if args.cmd.is_empty() {
                tracing::info!("please enter a command");
                return ExitCode::FAILURE;
            }
            if let Err(e) = shell::run(&config, &args.cmd).await {
                tracing::error!(error = %e, "shell command failed");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
