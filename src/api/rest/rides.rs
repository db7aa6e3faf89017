use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::rest::{RegionQuery, lifecycle_result};
use crate::engine::candidates::RankedRequest;
use crate::engine::lifecycle::pick_up;
use crate::engine::matching::dispatch;
use crate::engine::snapshot::LifecycleView;
use crate::error::AppError;
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::dispatch::{Dispatch, DispatchBatch};
use crate::models::{ClientId, DriverId};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pickups", post(record_pickup))
        .route("/dispatch", post(run_dispatch))
        .route("/dispatches", get(list_dispatches))
        .route("/requests/open", get(list_open_requests))
}

#[derive(Deserialize)]
pub struct PickupRequest {
    pub driver_id: DriverId,
    pub client_id: ClientId,
    pub when: NaiveDateTime,
}

#[derive(Serialize)]
pub struct PickupResponse {
    pub driver_id: DriverId,
    pub client_id: ClientId,
    pub picked_up: bool,
}

#[derive(Deserialize)]
pub struct DispatchRequest {
    pub nw: GeoPoint,
    pub se: GeoPoint,
    pub when: NaiveDateTime,
}

async fn record_pickup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PickupRequest>,
) -> Result<(StatusCode, Json<PickupResponse>), AppError> {
    let ok = pick_up(
        state.store.as_ref(),
        payload.driver_id,
        payload.client_id,
        payload.when,
    );
    lifecycle_result(&state, "pick_up", ok, || {
        format!(
            "driver {} has no open dispatch to client {}",
            payload.driver_id, payload.client_id
        )
    })?;

    Ok((
        StatusCode::CREATED,
        Json(PickupResponse {
            driver_id: payload.driver_id,
            client_id: payload.client_id,
            picked_up: true,
        }),
    ))
}

async fn run_dispatch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchRequest>,
) -> Result<Json<DispatchBatch>, AppError> {
    let bounds = BoundingBox::new(payload.nw, payload.se);

    let start = Instant::now();
    let result = dispatch(state.store.as_ref(), bounds, payload.when);
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(batch) => {
            state
                .metrics
                .dispatch_batch_latency_seconds
                .with_label_values(&["success"])
                .observe(elapsed);
            state
                .metrics
                .dispatch_batches_total
                .with_label_values(&["success"])
                .inc();
            state
                .metrics
                .dispatches_created_total
                .inc_by(batch.dispatches.len() as u64);

            for row in &batch.dispatches {
                let _ = state.dispatch_events_tx.send(row.clone());
            }

            Ok(Json(batch))
        }
        Err(err) => {
            state
                .metrics
                .dispatch_batch_latency_seconds
                .with_label_values(&["error"])
                .observe(elapsed);
            state
                .metrics
                .dispatch_batches_total
                .with_label_values(&["error"])
                .inc();
            Err(err.into())
        }
    }
}

async fn list_dispatches(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Dispatch>>, AppError> {
    let tables = state.store.snapshot()?;
    Ok(Json(tables.dispatches))
}

/// Highest priority first.
async fn list_open_requests(
    State(state): State<Arc<AppState>>,
    Query(region): Query<RegionQuery>,
) -> Result<Json<Vec<RankedRequest>>, AppError> {
    let bounds = region.bounds()?;
    let view = LifecycleView::capture(state.store.as_ref())?;

    let mut ranked = view.open_requests_in(&bounds);
    ranked.reverse();
    Ok(Json(ranked))
}
