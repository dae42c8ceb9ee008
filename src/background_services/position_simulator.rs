//! Drives the buses along their routes
use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info};

use crate::fleet::Fleet;

/// Advances every bus in `fleet` once per `tick_interval` until `shutdown` flips to true
/// or its sender goes away. A tick that already started always finishes.
pub async fn run_position_simulator(
    fleet: Arc<Fleet>,
    tick_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "simulating {} buses every {:?}",
        fleet.len(),
        tick_interval
    );

    let mut ticks = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }

        select! {
            _ = ticker.tick() => {
                let report = fleet.tick().await;
                ticks += 1;
                debug!(tick = ticks, advanced = report.advanced, busy = report.busy);
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("position simulator stopped after {ticks} ticks");

    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fleet::BusDefinition,
        model::{coordinate::Coordinate, stop::Stop},
        routing::testing::StraightLineProvider,
    };

    async fn fleet() -> Result<Arc<Fleet>, anyhow::Error> {
        let fleet = Fleet::seed(
            vec![BusDefinition {
                name: "S1".to_string(),
                stops: vec![
                    Stop::new("home", Coordinate::new(0.0, 0.0)),
                    Stop::new("end", Coordinate::new(0.0, 10.0)),
                ],
            }],
            Arc::new(StraightLineProvider::new(101)),
        )
        .await?;

        Ok(Arc::new(fleet))
    }

    #[tokio::test(start_paused = true)]
    async fn moves_buses_every_tick_until_shutdown() -> Result<(), anyhow::Error> {
        let fleet = fleet().await?;
        let (shutdown_sender, shutdown) = watch::channel(false);

        let simulator = tokio::spawn(run_position_simulator(
            fleet.clone(),
            Duration::from_secs(2),
            shutdown,
        ));

        // first tick fires right away, then one every 2 seconds
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        shutdown_sender.send(true)?;
        let ticks = simulator.await?;

        assert_eq!(ticks, 4);
        assert_eq!(fleet.buses()[0].bus.lock().await.position_index(), 4);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_sender_is_dropped() -> Result<(), anyhow::Error> {
        let fleet = fleet().await?;
        let (shutdown_sender, shutdown) = watch::channel(false);

        let simulator = tokio::spawn(run_position_simulator(
            fleet,
            Duration::from_secs(1),
            shutdown,
        ));
        drop(shutdown_sender);

        simulator.await?;

        Ok(())
    }
}
