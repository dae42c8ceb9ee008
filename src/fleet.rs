//! The set of buses in service and request matching
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use itertools::Itertools;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::DispatchError,
    model::{
        bus::{Bus, BusSnapshot},
        coordinate::Coordinate,
        stop::Stop,
    },
    routing::RouteProvider,
};

const ELEFTHERIA: Coordinate = Coordinate::new(35.17022784728593, 33.35889554051766);
const S1_END: Coordinate = Coordinate::new(35.13160429484031, 33.299296813161504);
const S2_END: Coordinate = Coordinate::new(35.11338633948102, 33.33255319068168);

/// How a bus starts its day: a name and its fixed stops.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusDefinition {
    pub name: String,
    pub stops: Vec<Stop>,
}

/// Both service areas start at Eleftheria square.
pub fn default_fleet() -> Vec<BusDefinition> {
    vec![
        BusDefinition {
            name: "S1".to_string(),
            stops: vec![
                Stop::new("S1-home", ELEFTHERIA),
                Stop::new("S1-end", S1_END),
            ],
        },
        BusDefinition {
            name: "S2".to_string(),
            stops: vec![
                Stop::new("S2-home", ELEFTHERIA),
                Stop::new("S2-end", S2_END),
            ],
        },
    ]
}

/// A bus together with the locks guarding it.
///
/// `bus` is only ever held for short, synchronous updates. Routing runs outside of it.
#[derive(Debug)]
pub struct FleetBus {
    pub name: String,
    pub bus: Mutex<Bus>,
    /// Held for a whole insertion so requests for the same bus queue up
    dispatch: Mutex<()>,
    /// Set while a new route is being computed. Set and checked with `bus` held.
    rerouting: AtomicBool,
}

impl FleetBus {
    fn new(bus: Bus) -> Self {
        FleetBus {
            name: bus.name().to_string(),
            bus: Mutex::new(bus),
            dispatch: Mutex::new(()),
            rerouting: AtomicBool::new(false),
        }
    }

    pub fn is_rerouting(&self) -> bool {
        self.rerouting.load(Ordering::Acquire)
    }
}

/// Clears the rerouting flag however the insertion ends, including when the caller goes away.
struct Rerouting<'a>(&'a AtomicBool);

impl<'a> Rerouting<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Rerouting(flag)
    }
}

impl Drop for Rerouting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A request placed on a bus, with the itinerary index of each of its stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub request_id: String,
    pub pickup: usize,
    pub dropoff: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub advanced: usize,
    /// Buses skipped because their itinerary was being rebuilt
    pub busy: usize,
}

pub struct Fleet {
    buses: Vec<Arc<FleetBus>>,
    provider: Arc<dyn RouteProvider>,
    request_counter: AtomicU64,
}

impl Fleet {
    pub fn new(buses: Vec<Bus>, provider: Arc<dyn RouteProvider>) -> Result<Self, DispatchError> {
        check_names(buses.iter().map(|b| b.name()))?;

        let buses = buses
            .into_iter()
            .map(|bus| Arc::new(FleetBus::new(bus)))
            .collect_vec();

        Ok(Fleet {
            buses,
            provider,
            request_counter: AtomicU64::new(0),
        })
    }

    /// Routes every defined bus. A bus whose route can't be computed is left out.
    #[tracing::instrument(skip_all, err)]
    pub async fn seed(
        definitions: Vec<BusDefinition>,
        provider: Arc<dyn RouteProvider>,
    ) -> Result<Self, DispatchError> {
        check_names(definitions.iter().map(|d| d.name.as_str()))?;

        let mut buses = Vec::with_capacity(definitions.len());
        for definition in definitions {
            match Bus::initialize(definition.name.clone(), definition.stops, provider.as_ref()).await {
                Ok(bus) => buses.push(bus),
                Err(e @ DispatchError::RoutingUnavailable(_)) => {
                    error!("leaving bus {} out of service: {:?}", definition.name, e);
                }
                Err(e) => return Err(e),
            }
        }

        if buses.is_empty() {
            warn!("no bus could be put in service");
        }

        Fleet::new(buses, provider)
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn buses(&self) -> &[Arc<FleetBus>] {
        &self.buses
    }

    /// Consistent copy of every bus, in fleet order.
    pub async fn snapshot(&self) -> Vec<BusSnapshot> {
        let mut snapshots = Vec::with_capacity(self.buses.len());
        for entry in &self.buses {
            snapshots.push(entry.bus.lock().await.snapshot());
        }

        snapshots
    }

    /// The bus whose route passes closest to `origin`. Ties go to the earlier bus.
    pub async fn nearest_bus(&self, origin: Coordinate) -> Result<Arc<FleetBus>, DispatchError> {
        let mut best: Option<(&Arc<FleetBus>, f64)> = None;

        for entry in &self.buses {
            let Some(d) = entry.bus.lock().await.closest_route_point(&origin) else {
                continue;
            };

            if best.is_none_or(|(_, b)| d < b) {
                best = Some((entry, d));
            }
        }

        best.map(|(entry, _)| entry.clone())
            .ok_or(DispatchError::NoBusesAvailable)
    }

    /// Sends the nearest bus to pick someone up at `origin` and drop them off at `destination`.
    ///
    /// The request id is `<bus-name>-<token>`. Both stops are added or neither is.
    #[tracing::instrument(skip(self), err)]
    pub async fn assign_request(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Assignment, DispatchError> {
        let entry = self.nearest_bus(origin).await?;

        let token = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = format!("{}-{}", entry.name, token);

        let pickup = Stop::new(format!("{request_id}-pickup"), origin);
        let dropoff = Stop::new(format!("{request_id}-dropoff"), destination);

        let _queued = entry.dispatch.lock().await;

        // The bus stays put from planning until the new route is in, so the plan can't go stale.
        let (insertion, rerouting) = {
            let bus = entry.bus.lock().await;
            let rerouting = Rerouting::start(&entry.rerouting);
            (bus.plan_insertion(vec![pickup, dropoff]), rerouting)
        };

        let route = insertion.route(self.provider.as_ref()).await?;

        let positions = {
            let mut bus = entry.bus.lock().await;
            let positions = bus.apply_insertion(insertion, route);
            drop(rerouting);
            positions
        };

        let assignment = Assignment {
            request_id,
            pickup: positions[0],
            dropoff: positions[1],
        };

        info!(
            "request {} assigned, pickup at stop {} and drop-off at stop {}",
            assignment.request_id, assignment.pickup, assignment.dropoff
        );

        Ok(assignment)
    }

    /// Moves every bus one step. A bus waiting on a new route holds its position.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for entry in &self.buses {
            let mut bus = entry.bus.lock().await;
            if entry.is_rerouting() {
                report.busy += 1;
                continue;
            }

            bus.advance();
            report.advanced += 1;
        }

        report
    }
}

fn check_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), DispatchError> {
    let names = names.collect_vec();

    if let Some(name) = names.iter().find(|n| n.is_empty() || n.contains('-')) {
        return Err(DispatchError::InvalidBusName(name.to_string()));
    }

    if let Some(name) = names.iter().duplicates().next() {
        return Err(DispatchError::DuplicateBus(name.to_string()));
    }

    Ok(())
}
