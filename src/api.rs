//! Http surface of the dispatcher
pub mod buses;
pub mod transfer;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{error, warn};

use crate::{error::DispatchError, fleet::Fleet};

pub struct AppState {
    pub fleet: Arc<Fleet>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get_buses", get(buses::get_buses))
        .route("/request_transfer", get(transfer::request_transfer))
        .with_state(state)
}

/// Turns dispatch failures into http responses, logging them once on the way out.
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        ApiError(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DispatchError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            DispatchError::NoBusesAvailable | DispatchError::RoutingUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_client_error() {
            warn!("rejected request: {}", self.0);
        } else {
            error!("{:?}", self.0);
        }

        (status, self.0.to_string()).into_response()
    }
}
