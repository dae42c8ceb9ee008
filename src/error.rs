use crate::routing::RoutingError;

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("routing unavailable")]
    RoutingUnavailable(#[from] RoutingError),

    #[error("no buses available")]
    NoBusesAvailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bus {bus} needs at least 2 stops but got {stops}")]
    NotEnoughStops { bus: String, stops: usize },

    #[error("bus {0} is defined more than once")]
    DuplicateBus(String),

    #[error("bus name {0:?} can't be empty or contain '-'")]
    InvalidBusName(String),
}
