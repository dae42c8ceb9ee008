//! Route provider backed by an OSRM http endpoint
use std::time::Duration;

use futures::{FutureExt, future::BoxFuture};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{Instrument, info_span, warn};

use super::{RouteProvider, RoutingError};
use crate::model::coordinate::Coordinate;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per leg, including the first one
    pub attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone)]
pub struct OsrmRouteProvider {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl OsrmRouteProvider {
    pub fn new(endpoint: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn url(&self, a: Coordinate, b: Coordinate) -> String {
        // OSRM wants lon,lat
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.endpoint, a.lon, a.lat, b.lon, b.lat
        )
    }

    /// Only transient failures are retried. A definite answer from the router, like `NoRoute`,
    /// is returned straight away.
    #[tracing::instrument(skip_all, fields(a = %a, b = %b), err)]
    async fn path_with_retries(&self, a: Coordinate, b: Coordinate) -> Result<Vec<Coordinate>, RoutingError> {
        let mut attempt = 0;

        loop {
            match self.fetch_path(a, b).await {
                Ok(path) => return Ok(path),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt + 1 >= self.retry.attempts => {
                    return Err(RoutingError::Exhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let backoff = self.retry.backoff(attempt);
                    warn!("route request failed, retrying in {:?}: {e}", backoff);
                    sleep(backoff)
                        .instrument(info_span!("Waiting before retrying route"))
                        .await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_path(&self, a: Coordinate, b: Coordinate) -> Result<Vec<Coordinate>, RoutingError> {
        let response = self
            .client
            .get(self.url(a, b))
            .send()
            .instrument(info_span!("Fetching route"))
            .await?;

        // 4xx bodies still carry OSRM's own code, e.g. NoRoute or InvalidQuery
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            response.error_for_status_ref()?;
        }

        let body = response
            .text()
            .instrument(info_span!("Reading body of response"))
            .await?;

        parse_route_response(&body)
    }
}

impl RouteProvider for OsrmRouteProvider {
    fn path(&self, a: Coordinate, b: Coordinate) -> BoxFuture<'_, Result<Vec<Coordinate>, RoutingError>> {
        self.path_with_retries(a, b).boxed()
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// [lon, lat]
    coordinates: Vec<[f64; 2]>,
}

/// Takes the first route of an OSRM `route` response.
fn parse_route_response(body: &str) -> Result<Vec<Coordinate>, RoutingError> {
    let response: OsrmResponse = serde_json::from_str(body)?;

    if response.code != "Ok" {
        return Err(RoutingError::NoRoute(response.code));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| RoutingError::NoRoute("no routes".to_string()))?;

    let path: Vec<Coordinate> = route
        .geometry
        .coordinates
        .into_iter()
        .map(|[lon, lat]| Coordinate::new(lat, lon))
        .collect();

    if path.is_empty() {
        return Err(RoutingError::EmptyPath);
    }

    Ok(path)
}
