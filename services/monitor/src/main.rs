use anyhow::Result;
use market_monitor::config::MonitorConfig;
use market_monitor::monitor::MarketMonitor;
use market_monitor::server::{self, AppState};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MonitorConfig::from_env()?;
    info!(
        endpoint = %config.endpoint,
        symbols = config.symbols.len(),
        addr = %config.listen_addr,
        "Starting market monitor"
    );

    let listen_addr = config.listen_addr;
    let mut monitor = MarketMonitor::new(config);
    monitor.start();

    let state = AppState {
        hub: monitor.hub(),
        router: monitor.router(),
        tracker: monitor.tracker(),
    };
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(server::serve(listen_addr, state, stop_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = stop_tx.send(true);
    monitor.stop().await;
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Server exited with error"),
        Err(e) => error!(error = %e, "Server task ended abnormally"),
    }

    Ok(())
}
