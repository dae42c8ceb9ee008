//! Road routing between coordinates
pub mod osrm;

use futures::future::BoxFuture;
use tracing::debug;

use crate::model::{coordinate::Coordinate, stop::Stop};

/// Something that can turn two coordinates into a driving path.
pub trait RouteProvider: Send + Sync {
    /// Returns the road path from `a` to `b`, never empty on success.
    fn path(&self, a: Coordinate, b: Coordinate) -> BoxFuture<'_, Result<Vec<Coordinate>, RoutingError>>;
}

#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    #[error("error requesting a route")]
    HttpRequestError(#[from] reqwest::Error),

    #[error("error parsing the route response")]
    ParsingError(#[from] serde_json::Error),

    #[error("router answered with code {0:?}")]
    NoRoute(String),

    #[error("router returned an empty geometry")]
    EmptyPath,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<RoutingError>,
    },
}

impl RoutingError {
    /// Whether sending the same request again could succeed: the router couldn't be reached,
    /// timed out, failed on its side or asked us to slow down.
    pub fn is_transient(&self) -> bool {
        match self {
            RoutingError::HttpRequestError(e) => e
                .status()
                .is_none_or(|s| s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS),
            _ => false,
        }
    }
}

/// Routes through `waypoints` in order, one provider call per leg.
///
/// When a leg starts exactly where the previous one ended the shared point is kept once.
pub async fn route_through(
    provider: &dyn RouteProvider,
    waypoints: &[Coordinate],
) -> Result<Vec<Coordinate>, RoutingError> {
    let mut route: Vec<Coordinate> = Vec::new();

    for (a, b) in waypoints.iter().zip(waypoints.iter().skip(1)) {
        let leg = provider.path(*a, *b).await?;
        if leg.is_empty() {
            return Err(RoutingError::EmptyPath);
        }

        let skip = match (route.last(), leg.first()) {
            (Some(last), Some(first)) if last == first => 1,
            _ => 0,
        };
        route.extend(leg.into_iter().skip(skip));
    }

    debug!("routed {} waypoints into {} points", waypoints.len(), route.len());

    Ok(route)
}

pub fn stop_coordinates(stops: &[Stop]) -> Vec<Coordinate> {
    stops.iter().map(Stop::coordinate).collect()
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;

    /// Straight line between the two points, both ends included.
    pub struct StraightLineProvider {
        pub points_per_leg: usize,
        pub calls: AtomicUsize,
    }

    impl StraightLineProvider {
        pub fn new(points_per_leg: usize) -> Self {
            Self {
                points_per_leg: points_per_leg.max(2),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RouteProvider for StraightLineProvider {
        fn path(&self, a: Coordinate, b: Coordinate) -> BoxFuture<'_, Result<Vec<Coordinate>, RoutingError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let steps = (self.points_per_leg - 1) as f64;
            let path: Vec<Coordinate> = (0..self.points_per_leg)
                .map(|i| {
                    let t = i as f64 / steps;
                    Coordinate::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t)
                })
                .collect();
            async move { Ok::<_, RoutingError>(path) }.boxed()
        }
    }

    pub struct FailingProvider;

    impl RouteProvider for FailingProvider {
        fn path(&self, _a: Coordinate, _b: Coordinate) -> BoxFuture<'_, Result<Vec<Coordinate>, RoutingError>> {
            async { Err::<Vec<Coordinate>, _>(RoutingError::NoRoute("NoRoute".to_string())) }.boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn concatenates_legs_without_repeating_boundaries() -> Result<(), anyhow::Error> {
        let provider = StraightLineProvider::new(3);
        let waypoints = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 2.0),
            Coordinate::new(2.0, 2.0),
        ];

        let route = route_through(&provider, &waypoints).await?;

        assert_eq!(provider.calls(), 2);
        assert_eq!(
            route,
            vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 1.0),
                Coordinate::new(0.0, 2.0),
                Coordinate::new(1.0, 2.0),
                Coordinate::new(2.0, 2.0),
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn failing_leg_fails_the_route() {
        let waypoints = [Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)];
        assert!(route_through(&FailingProvider, &waypoints).await.is_err());
    }
}
