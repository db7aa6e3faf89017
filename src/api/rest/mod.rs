pub mod rides;
pub mod shifts;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::snapshot::LifecycleView;
use crate::error::AppError;
use crate::geo::{BoundingBox, GeoError, GeoPoint};
use crate::observability::metrics::LifecycleOutcome;
use crate::state::AppState;
use crate::store::StoreError;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(shifts::router())
        .merge(rides::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Region given as four query parameters, e.g.
/// `?nw_lon=-5&nw_lat=60&se_lon=10&se_lat=20`.
#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    pub nw_lon: f64,
    pub nw_lat: f64,
    pub se_lon: f64,
    pub se_lat: f64,
}

impl RegionQuery {
    pub fn bounds(&self) -> Result<BoundingBox, GeoError> {
        Ok(BoundingBox::new(
            GeoPoint::new(self.nw_lon, self.nw_lat)?,
            GeoPoint::new(self.se_lon, self.se_lat)?,
        ))
    }
}

/// Records a lifecycle operation's outcome and turns a refusal into the
/// matching error: 503 when the store has been released, 409 otherwise.
pub(crate) fn lifecycle_result(
    state: &AppState,
    operation: &'static str,
    ok: bool,
    conflict: impl FnOnce() -> String,
) -> Result<(), AppError> {
    let outcome = if ok {
        LifecycleOutcome::Success
    } else if !state.store.is_connected() {
        LifecycleOutcome::Error
    } else {
        LifecycleOutcome::Rejected
    };
    state.metrics.record_lifecycle(operation, outcome);

    match outcome {
        LifecycleOutcome::Success => Ok(()),
        LifecycleOutcome::Error => Err(AppError::Store(StoreError::Closed)),
        LifecycleOutcome::Rejected => Err(AppError::Conflict(conflict())),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ongoing_shifts: usize,
    open_requests: usize,
    dispatches: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let view = LifecycleView::capture(state.store.as_ref())?;

    Ok(Json(HealthResponse {
        status: "ok",
        ongoing_shifts: view.ongoing_shift_count(),
        open_requests: view.open_request_count(),
        dispatches: view.dispatch_count(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
