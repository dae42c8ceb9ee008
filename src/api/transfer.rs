use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::{error::DispatchError, model::coordinate::Coordinate};

#[derive(Debug, Deserialize)]
pub struct TransferParams {
    pub origin_str: String,
    pub dest_str: String,
}

/// Assigns a ride from `origin_str` to `dest_str`, both `lat,lon`, and answers with the
/// request id as a json string.
pub async fn request_transfer(
    Query(params): Query<TransferParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<String>, ApiError> {
    let origin = parse_coordinate("origin_str", &params.origin_str)?;
    let destination = parse_coordinate("dest_str", &params.dest_str)?;

    let assignment = state.fleet.assign_request(origin, destination).await?;

    Ok(Json(assignment.request_id))
}

fn parse_coordinate(field: &str, value: &str) -> Result<Coordinate, DispatchError> {
    value
        .parse()
        .map_err(|e| DispatchError::InvalidArgument(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::*;
    use crate::{
        api::buses::get_buses,
        fleet::{BusDefinition, Fleet},
        model::stop::Stop,
        routing::testing::{FailingProvider, StraightLineProvider},
    };

    async fn state() -> Result<Arc<AppState>, anyhow::Error> {
        let fleet = Fleet::seed(
            vec![BusDefinition {
                name: "S1".to_string(),
                stops: vec![
                    Stop::new("S1-home", Coordinate::new(35.17, 33.35)),
                    Stop::new("S1-end", Coordinate::new(35.13, 33.29)),
                ],
            }],
            Arc::new(StraightLineProvider::new(5)),
        )
        .await?;

        Ok(Arc::new(AppState {
            fleet: Arc::new(fleet),
        }))
    }

    fn params(origin: &str, dest: &str) -> Query<TransferParams> {
        Query(TransferParams {
            origin_str: origin.to_string(),
            dest_str: dest.to_string(),
        })
    }

    #[tokio::test]
    async fn transfer_returns_request_id() -> Result<(), anyhow::Error> {
        let state = state().await?;

        let Json(id) = request_transfer(
            params("35.16,33.34", "35.14, 33.30"),
            State(state.clone()),
        )
        .await
        .map_err(|e| e.0)?;

        assert_eq!(id, "S1-1");
        assert_eq!(id.split('-').next(), Some("S1"));

        let Json(buses) = get_buses(State(state)).await;
        assert_eq!(buses[0].stops.len(), 4);
        assert_eq!(buses[0].stops[1].name, "S1-1-pickup");

        Ok(())
    }

    #[tokio::test]
    async fn malformed_coordinates_are_a_client_error() -> Result<(), anyhow::Error> {
        let state = state().await?;

        let err = request_transfer(params("35.16;33.34", "35.14,33.30"), State(state.clone()))
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
        assert!(matches!(err.0, DispatchError::InvalidArgument(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let Json(buses) = get_buses(State(state)).await;
        assert_eq!(buses[0].stops.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn empty_fleet() -> Result<(), anyhow::Error> {
        let state = Arc::new(AppState {
            fleet: Arc::new(Fleet::new(vec![], Arc::new(FailingProvider))?),
        });

        let Json(buses) = get_buses(State(state.clone())).await;
        assert!(buses.is_empty());

        let err = request_transfer(params("1,1", "2,2"), State(state))
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        Ok(())
    }
}
