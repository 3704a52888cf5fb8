use anyhow::Result;
use tracing::{info, warn};
use water_demand_forecaster::{api, config::Config, controller, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.logging);

    let app_state = controller::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state, &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0, service will be reachable from the network");
    }

    info!(%addr, prefix = api::API_PREFIX, "starting water demand forecaster");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
