use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::Parser;

use crate::{
    fleet::{BusDefinition, default_fleet},
    routing::osrm::RetryPolicy,
};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Simulates a small bus fleet and dispatches ride requests to it")]
pub struct Config {
    /// Address the http api listens on
    #[arg(long, env = "BUS_DISPATCH_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Base url of the OSRM routing service
    #[arg(long, env = "OSRM_ENDPOINT", default_value = "http://router.project-osrm.org")]
    pub osrm_endpoint: String,

    /// How often every bus moves one route point
    #[arg(long, env = "TICK_INTERVAL_MS", default_value_t = 2000)]
    pub tick_interval_ms: u64,

    #[arg(long, env = "ROUTING_TIMEOUT_SECS", default_value_t = 10)]
    pub routing_timeout_secs: u64,

    /// Attempts per road leg before giving up
    #[arg(long, env = "ROUTING_ATTEMPTS", default_value_t = 3)]
    pub routing_attempts: u32,

    #[arg(long, env = "ROUTING_BACKOFF_MS", default_value_t = 500)]
    pub routing_backoff_ms: u64,

    /// JSON file with the buses to put in service instead of the built-in ones
    #[arg(long, env = "FLEET_FILE")]
    pub fleet_file: Option<PathBuf>,

    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Export spans over OTLP/gRPC to this endpoint
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick interval must be greater than 0");
        }
        if self.routing_attempts == 0 {
            bail!("routing needs at least 1 attempt");
        }
        if self.routing_timeout_secs == 0 {
            bail!("routing timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_secs(self.routing_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.routing_attempts,
            base_backoff: Duration::from_millis(self.routing_backoff_ms),
        }
    }

    pub fn fleet(&self) -> anyhow::Result<Vec<BusDefinition>> {
        let Some(path) = &self.fleet_file else {
            return Ok(default_fleet());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("couldn't read fleet file {}", path.display()))?;

        parse_fleet(&content).with_context(|| format!("invalid fleet file {}", path.display()))
    }
}

fn parse_fleet(content: &str) -> anyhow::Result<Vec<BusDefinition>> {
    let fleet: Vec<BusDefinition> = serde_json::from_str(content)?;

    if let Some(bus) = fleet.iter().find(|b| b.stops.len() < 2) {
        bail!("bus {} needs at least 2 stops", bus.name);
    }

    Ok(fleet)
}
