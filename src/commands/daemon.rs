use std::sync::Arc;
use tracing::info;
use waymux::config::Config;
use waymux::daemon::server::shutdown_signal;
use waymux::daemon::{Collaborators, DaemonServer, Dispatcher, Handlers, Registry};
use waymux::error::Result;
use waymux::protocol::PROTOCOL_VERSION;

/// 데몬 서버 실행 (SIGINT/SIGTERM까지 blocking)
pub async fn run_daemon(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        protocol = PROTOCOL_VERSION,
        "starting waymux daemon"
    );

    let registry = Arc::new(Registry::new());
    let handlers = Handlers::new(registry, Collaborators::system(&config), &config);
    let dispatcher = Dispatcher::new(handlers, &config);

    let server = DaemonServer::bind(&config, dispatcher).await?;
    server.serve(shutdown_signal()).await?;

    info!("waymux daemon stopped");
    Ok(())
}
