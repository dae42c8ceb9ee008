use std::{future::IntoFuture, sync::Arc};

use anyhow::{Context, Result};
use bus_dispatch::api::{self, AppState};
use bus_dispatch::background_services::position_simulator::run_position_simulator;
use bus_dispatch::config::Config;
use bus_dispatch::fleet::Fleet;
use bus_dispatch::routing::{RouteProvider, osrm::OsrmRouteProvider};
use bus_dispatch::telemetry;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::{select, spawn};
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    _ = dotenv();
    let config = Config::parse();
    config.validate()?;

    let telemetry = telemetry::init(&config)?;
    info!("OSRM_ENDPOINT: {}", config.osrm_endpoint);

    let provider: Arc<dyn RouteProvider> = Arc::new(OsrmRouteProvider::new(
        &config.osrm_endpoint,
        config.routing_timeout(),
        config.retry_policy(),
    )?);

    let fleet = Arc::new(Fleet::seed(config.fleet()?, provider).await?);
    info!("{} buses in service", fleet.len());

    let (shutdown_sender, shutdown) = watch::channel(false);
    let mut simulator = spawn(run_position_simulator(
        fleet.clone(),
        config.tick_interval(),
        shutdown,
    ));

    let app = api::router(Arc::new(AppState { fleet }));
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("couldn't listen on {}", config.listen))?;
    info!("listening on {}", config.listen);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    let simulator_result = select! {
        res = server => {
            if let Err(e) = res {
                error!("http server failed: {e}");
            }
            None
        },
        res = &mut simulator => Some(res),
    };

    _ = shutdown_sender.send(true);

    match simulator_result {
        Some(res) => error!("position simulator stopped unexpectedly: {:?}", res),
        None => match simulator.await {
            Ok(ticks) => info!("simulated {ticks} ticks"),
            Err(err) => error!("{:?}", err),
        },
    }

    telemetry.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("couldn't listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }

    info!("shutting down");
}
