use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use waymux::config::Config;
use waymux::daemon::lockfile;
use waymux::daemon::DaemonClient;
use waymux::error::Result;

mod cli;
mod commands;
mod ui;

use cli::{command_line, Cli, Command};

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// 클라이언트 명령용 연결 준비
///
/// 소켓을 직접 지정하지 않았다면 lock 파일로 데몬 실행 여부를 먼저 확인합니다.
fn connect(socket: Option<PathBuf>, config: &Config) -> Result<DaemonClient> {
    match socket {
        Some(socket) => Ok(DaemonClient::new(socket)),
        None => {
            lockfile::ensure_running(&config.lock_path)?;
            Ok(DaemonClient::from_config(config))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    let socket = cli.socket;

    match cli.command {
        Command::Daemon => {
            if let Some(socket) = socket {
                config.socket_path = socket;
            }
            commands::run_daemon(config).await
        }
        Command::RegisterHost {
            runtime_dir,
            display,
            pid,
        } => {
            let client = connect(socket, &config)?;
            commands::register_host(&client, runtime_dir, display, pid).await
        }
        Command::StopHost => commands::stop_host(&connect(socket, &config)?).await,
        Command::Start {
            user,
            password_stdin,
            command,
        } => {
            let client = connect(socket, &config)?;
            commands::start_session(&client, user, command_line(&command), password_stdin).await
        }
        Command::Stop { id } => commands::stop_session(&connect(socket, &config)?, id).await,
        Command::StopAll { yes } => {
            commands::stop_all_sessions(&connect(socket, &config)?, yes).await
        }
        Command::List { json } => commands::list_sessions(&connect(socket, &config)?, json).await,
        Command::Whoami { json } => commands::who_am_i(&connect(socket, &config)?, json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "[X]".red().bold(), e);
        std::process::exit(1);
    }
}
