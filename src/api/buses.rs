use std::sync::Arc;

use axum::{Json, extract::State};

use super::AppState;
use crate::model::bus::BusSnapshot;

pub async fn get_buses(State(state): State<Arc<AppState>>) -> Json<Vec<BusSnapshot>> {
    Json(state.fleet.snapshot().await)
}
