use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::rest::{RegionQuery, lifecycle_result};
use crate::engine::candidates::EligibleDriver;
use crate::engine::lifecycle::{clock_in, clock_out, record_location};
use crate::engine::snapshot::LifecycleView;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::DriverId;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shifts", post(start_shift))
        .route("/shifts/clock-out", post(end_shift))
        .route("/locations", post(report_location))
        .route("/drivers/eligible", get(list_eligible_drivers))
}

#[derive(Deserialize)]
pub struct ClockInRequest {
    pub driver_id: DriverId,
    pub when: NaiveDateTime,
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct ClockOutRequest {
    pub driver_id: DriverId,
    pub when: NaiveDateTime,
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub driver_id: DriverId,
    pub when: NaiveDateTime,
    pub location: GeoPoint,
}

#[derive(Serialize)]
pub struct ShiftResponse {
    pub driver_id: DriverId,
    pub on_shift: bool,
}

async fn start_shift(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ClockInRequest>,
) -> Result<(StatusCode, Json<ShiftResponse>), AppError> {
    let ok = clock_in(
        state.store.as_ref(),
        payload.driver_id,
        payload.when,
        payload.location,
    );
    lifecycle_result(&state, "clock_in", ok, || {
        format!("driver {} cannot clock in", payload.driver_id)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(ShiftResponse {
            driver_id: payload.driver_id,
            on_shift: true,
        }),
    ))
}

async fn end_shift(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ClockOutRequest>,
) -> Result<Json<ShiftResponse>, AppError> {
    let ok = clock_out(state.store.as_ref(), payload.driver_id, payload.when);
    lifecycle_result(&state, "clock_out", ok, || {
        format!("driver {} has no ongoing shift", payload.driver_id)
    })?;

    Ok(Json(ShiftResponse {
        driver_id: payload.driver_id,
        on_shift: false,
    }))
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LocationRequest>,
) -> Result<StatusCode, AppError> {
    let ok = record_location(
        state.store.as_ref(),
        payload.driver_id,
        payload.when,
        payload.location,
    );
    lifecycle_result(&state, "record_location", ok, || {
        format!("driver {} has no ongoing shift", payload.driver_id)
    })?;

    Ok(StatusCode::CREATED)
}

async fn list_eligible_drivers(
    State(state): State<Arc<AppState>>,
    Query(region): Query<RegionQuery>,
) -> Result<Json<Vec<EligibleDriver>>, AppError> {
    let bounds = region.bounds()?;
    let view = LifecycleView::capture(state.store.as_ref())?;

    Ok(Json(view.eligible_drivers_in(&bounds)))
}
