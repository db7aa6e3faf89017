use chrono::NaiveDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::candidates::{EligibleDriver, RankedRequest};
use crate::engine::snapshot::LifecycleView;
use crate::engine::truncate_to_minute;
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::dispatch::{Dispatch, DispatchBatch};
use crate::models::{DriverId, RequestId, ShiftId};
use crate::store::{Store, StoreError, Transaction};

/// One request paired with the driver chosen for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub request_id: RequestId,
    pub driver_id: DriverId,
    pub shift_id: ShiftId,
    pub car_location: GeoPoint,
    pub distance: f64,
    pub billing_total: f64,
}

/// Index and distance of the driver closest to `source`. Exact ties go to the
/// lowest shift id.
pub fn nearest_driver(source: &GeoPoint, drivers: &[EligibleDriver]) -> Option<(usize, f64)> {
    drivers
        .iter()
        .enumerate()
        .map(|(idx, driver)| (idx, driver.shift_id, source.planar_distance(&driver.location)))
        .min_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.1.cmp(&b.1)))
        .map(|(idx, _, distance)| (idx, distance))
}

/// Greedy assignment: serve requests from the tail of `requests` (highest
/// billing first), each to the nearest remaining driver, until either side
/// runs out. A driver is used at most once.
pub fn plan_matches(mut requests: Vec<RankedRequest>, mut drivers: Vec<EligibleDriver>) -> Vec<Match> {
    let mut matches = Vec::with_capacity(requests.len().min(drivers.len()));

    while !drivers.is_empty() {
        let Some(next) = requests.pop() else {
            break;
        };
        let Some((idx, distance)) = nearest_driver(&next.request.source, &drivers) else {
            break;
        };
        let driver = drivers.remove(idx);

        matches.push(Match {
            request_id: next.request.request_id,
            driver_id: driver.driver_id,
            shift_id: driver.shift_id,
            car_location: driver.location,
            distance,
            billing_total: next.billing_total,
        });
    }

    matches
}

/// Runs one dispatch batch over `bounds`.
///
/// All dispatch rows are written in a single transaction. If any insert or the
/// commit fails, nothing from this batch is kept and the error is returned.
pub fn dispatch<S: Store>(
    store: &S,
    bounds: BoundingBox,
    when: NaiveDateTime,
) -> Result<DispatchBatch, StoreError> {
    let batch_id = Uuid::new_v4();
    let dispatched_at = truncate_to_minute(when);
    let mut tx = store.begin()?;

    match write_batch(&mut tx, &bounds, dispatched_at) {
        Ok(dispatches) => {
            if let Err(err) = tx.commit() {
                error!(%batch_id, error = %err, "dispatch batch commit failed");
                return Err(err);
            }

            info!(
                %batch_id,
                dispatched = dispatches.len(),
                "dispatch batch committed"
            );
            Ok(DispatchBatch {
                batch_id,
                dispatches,
            })
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                error!(%batch_id, error = %rollback_err, "dispatch batch rollback failed");
            }
            warn!(%batch_id, error = %err, "dispatch batch rolled back");
            Err(err)
        }
    }
}

fn write_batch<T: Transaction>(
    tx: &mut T,
    bounds: &BoundingBox,
    dispatched_at: NaiveDateTime,
) -> Result<Vec<Dispatch>, StoreError> {
    let view = LifecycleView::load(&*tx)?;
    let requests = view.open_requests_in(bounds);
    let drivers = view.eligible_drivers_in(bounds);

    if requests.is_empty() || drivers.is_empty() {
        info!(
            open_requests = requests.len(),
            eligible_drivers = drivers.len(),
            "nothing to dispatch"
        );
    }

    let mut dispatches = Vec::new();
    for matched in plan_matches(requests, drivers) {
        let row = Dispatch {
            request_id: matched.request_id,
            shift_id: matched.shift_id,
            car_location: matched.car_location,
            dispatched_at,
        };
        tx.insert_dispatch(row.clone())?;

        info!(
            request_id = matched.request_id,
            driver_id = matched.driver_id,
            shift_id = matched.shift_id,
            distance = matched.distance,
            billing_total = matched.billing_total,
            "ride dispatched"
        );
        dispatches.push(row);
    }

    Ok(dispatches)
}
