use serde::Serialize;
use tracing::{debug, info};

use super::{coordinate::Coordinate, stop::Stop};
use crate::{
    error::DispatchError,
    routing::{RouteProvider, route_through, stop_coordinates},
};

/// How close (in degrees, roughly 10m) the bus has to get to a stop to count as arrived.
pub const ARRIVAL_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    name: String,
    stops: Vec<Stop>,
    route: Vec<Coordinate>,
    position_index: usize,
    /// The stop currently being approached
    next_stop_index: usize,
    current_position: Coordinate,
}

/// What a bus looks like from the outside.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusSnapshot {
    pub name: String,
    pub stops: Vec<Stop>,
    /// [lat, lon] pairs
    pub route: Vec<[f64; 2]>,
    pub pos: [f64; 2],
}

impl Bus {
    /// Builds a bus parked on its first stop with the full route through `stops`.
    #[tracing::instrument(skip(stops, provider), fields(n_stops = stops.len()), err)]
    pub async fn initialize(
        name: String,
        stops: Vec<Stop>,
        provider: &dyn RouteProvider,
    ) -> Result<Self, DispatchError> {
        if stops.len() < 2 {
            return Err(DispatchError::NotEnoughStops {
                bus: name,
                stops: stops.len(),
            });
        }

        let route = route_through(provider, &stop_coordinates(&stops)).await?;
        let current_position = *route.first().ok_or(crate::routing::RoutingError::EmptyPath)?;

        info!("bus {name} ready with {} route points", route.len());

        Ok(Bus {
            name,
            stops,
            route,
            position_index: 0,
            next_stop_index: 1,
            current_position,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn route(&self) -> &[Coordinate] {
        &self.route
    }

    pub fn position_index(&self) -> usize {
        self.position_index
    }

    pub fn next_stop_index(&self) -> usize {
        self.next_stop_index
    }

    pub fn current_position(&self) -> Coordinate {
        self.current_position
    }

    /// Squared distance from `origin` to the closest point of the route.
    pub fn closest_route_point(&self, origin: &Coordinate) -> Option<f64> {
        self.route
            .iter()
            .map(|p| origin.dist2(p))
            .fold(None, |best, d| match best {
                Some(b) if b <= d => Some(b),
                _ => Some(d),
            })
    }

    pub async fn insert_stop(
        &mut self,
        stop: Stop,
        provider: &dyn RouteProvider,
    ) -> Result<usize, DispatchError> {
        let positions = self.insert_stops(vec![stop], provider).await?;

        Ok(positions[0])
    }

    /// Splices `new_stops` into the part of the itinerary that's still ahead, keeping their
    /// relative order, then reroutes from where the bus is right now.
    ///
    /// Either every stop gets inserted and the route is rebuilt or the bus is left untouched.
    /// Returns the index each stop ended up at.
    #[tracing::instrument(skip_all, fields(bus = %self.name, count = new_stops.len()), err)]
    pub async fn insert_stops(
        &mut self,
        new_stops: Vec<Stop>,
        provider: &dyn RouteProvider,
    ) -> Result<Vec<usize>, DispatchError> {
        let insertion = self.plan_insertion(new_stops);
        let route = insertion.route(provider).await?;

        Ok(self.apply_insertion(insertion, route))
    }

    /// Works out where `new_stops` go without touching the bus.
    ///
    /// The result is only valid as long as the bus doesn't move or change its itinerary
    /// before [`Bus::apply_insertion`].
    pub fn plan_insertion(&self, new_stops: Vec<Stop>) -> Insertion {
        let mut stops = self.stops.clone();
        let mut positions: Vec<usize> = Vec::with_capacity(new_stops.len());
        let mut lower = self.next_stop_index - 1;

        for stop in new_stops {
            let position = cheapest_insertion(&stops, &stop.coordinate(), lower);
            stops.insert(position, stop);

            // later stops land after this one so its index stays valid
            positions.push(position);
            lower = position;
        }

        let mut waypoints = vec![self.current_position];
        waypoints.extend(stop_coordinates(&stops[self.next_stop_index..]));

        Insertion {
            stops,
            positions,
            start: self.current_position,
            waypoints,
        }
    }

    /// Commits a planned insertion together with the route computed for it.
    pub fn apply_insertion(&mut self, insertion: Insertion, route: Vec<Coordinate>) -> Vec<usize> {
        debug!(
            "new itinerary has {} stops and {} route points",
            insertion.stops.len(),
            route.len()
        );

        self.stops = insertion.stops;
        self.route = route;
        self.position_index = 0;
        self.current_position = insertion.start;

        insertion.positions
    }

    /// Moves the bus one route point forward, looping back to the start at the end.
    pub fn advance(&mut self) {
        if self.route.is_empty() {
            return;
        }

        self.position_index += 1;

        if self.position_index >= self.route.len() {
            self.position_index = 0;
            self.current_position = self.route[0];
            info!("bus {} reached the end of its route, starting over", self.name);
            return;
        }

        self.current_position = self.route[self.position_index];

        let is_last = self.next_stop_index + 1 >= self.stops.len();
        if !is_last
            && self.current_position.is_near(
                &self.stops[self.next_stop_index].coordinate(),
                ARRIVAL_TOLERANCE,
            )
        {
            debug!(
                "bus {} arrived at {}",
                self.name, self.stops[self.next_stop_index].name
            );
            self.next_stop_index += 1;
        }
    }

    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            name: self.name.clone(),
            stops: self.stops.clone(),
            route: self.route.iter().map(Coordinate::as_pair).collect(),
            pos: self.current_position.as_pair(),
        }
    }
}

/// A staged itinerary change, not yet routed.
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    stops: Vec<Stop>,
    positions: Vec<usize>,
    start: Coordinate,
    waypoints: Vec<Coordinate>,
}

impl Insertion {
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Route from the bus's position at planning time through every stop still ahead.
    /// Always starts on that position.
    pub async fn route(&self, provider: &dyn RouteProvider) -> Result<Vec<Coordinate>, DispatchError> {
        let mut route = route_through(provider, &self.waypoints).await?;
        if route.first() != Some(&self.start) {
            route.insert(0, self.start);
        }

        Ok(route)
    }
}

/// Index at which `new_stop` adds the least detour, looking only at the legs starting at
/// `from` or later. Ties go to the earliest leg.
pub fn cheapest_insertion(stops: &[Stop], new_stop: &Coordinate, from: usize) -> usize {
    let mut best: Option<(usize, f64)> = None;

    for i in from..stops.len().saturating_sub(1) {
        let a = stops[i].coordinate();
        let b = stops[i + 1].coordinate();
        let cost = a.dist2(new_stop) + new_stop.dist2(&b) - a.dist2(&b);

        if best.is_none_or(|(_, c)| cost < c) {
            best = Some((i, cost));
        }
    }

    match best {
        Some((i, _)) => i + 1,
        None => stops.len(),
    }
}
