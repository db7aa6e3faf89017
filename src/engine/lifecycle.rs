use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::engine::snapshot::LifecycleView;
use crate::engine::truncate_to_minute;
use crate::geo::GeoPoint;
use crate::models::dispatch::Pickup;
use crate::models::shift::{ClockOut, LocationReport, Shift};
use crate::models::{ClientId, DriverId};
use crate::store::{Store, StoreError, Transaction};

/// Starts a new shift for `driver_id` at `location`.
///
/// Returns `false` without writing anything when the driver is unknown, is
/// already on a shift, or the store fails.
pub fn clock_in<S: Store>(
    store: &S,
    driver_id: DriverId,
    when: NaiveDateTime,
    location: GeoPoint,
) -> bool {
    swallow("clock_in", driver_id, try_clock_in(store, driver_id, when, location))
}

fn try_clock_in<S: Store>(
    store: &S,
    driver_id: DriverId,
    when: NaiveDateTime,
    location: GeoPoint,
) -> Result<bool, StoreError> {
    let mut tx = store.begin()?;
    let view = LifecycleView::load(&tx)?;

    if !view.driver_exists(driver_id) {
        info!(driver_id, "clock-in rejected: unknown driver");
        tx.rollback()?;
        return Ok(false);
    }
    if view.is_on_ongoing_shift(driver_id) {
        info!(driver_id, "clock-in rejected: shift already ongoing");
        tx.rollback()?;
        return Ok(false);
    }

    let shift_id = tx.max_shift_id()?.unwrap_or(0) + 1;
    let clocked_in_at = truncate_to_minute(when);

    tx.insert_shift(Shift {
        shift_id,
        driver_id,
        clocked_in_at,
    })?;
    tx.insert_location(LocationReport {
        shift_id,
        reported_at: clocked_in_at,
        location,
    })?;
    tx.commit()?;

    info!(driver_id, shift_id, %location, "driver clocked in");
    Ok(true)
}

/// Ends the driver's ongoing shift.
pub fn clock_out<S: Store>(store: &S, driver_id: DriverId, when: NaiveDateTime) -> bool {
    swallow("clock_out", driver_id, try_clock_out(store, driver_id, when))
}

fn try_clock_out<S: Store>(
    store: &S,
    driver_id: DriverId,
    when: NaiveDateTime,
) -> Result<bool, StoreError> {
    let mut tx = store.begin()?;
    let view = LifecycleView::load(&tx)?;

    let Some(shift) = view.ongoing_shift(driver_id) else {
        info!(driver_id, "clock-out rejected: no ongoing shift");
        tx.rollback()?;
        return Ok(false);
    };
    let shift_id = shift.shift_id;

    tx.insert_clock_out(ClockOut {
        shift_id,
        clocked_out_at: truncate_to_minute(when),
    })?;
    tx.commit()?;

    info!(driver_id, shift_id, "driver clocked out");
    Ok(true)
}

/// Appends a position report to the driver's ongoing shift.
pub fn record_location<S: Store>(
    store: &S,
    driver_id: DriverId,
    when: NaiveDateTime,
    location: GeoPoint,
) -> bool {
    swallow(
        "record_location",
        driver_id,
        try_record_location(store, driver_id, when, location),
    )
}

fn try_record_location<S: Store>(
    store: &S,
    driver_id: DriverId,
    when: NaiveDateTime,
    location: GeoPoint,
) -> Result<bool, StoreError> {
    let mut tx = store.begin()?;
    let view = LifecycleView::load(&tx)?;

    let Some(shift) = view.ongoing_shift(driver_id) else {
        info!(driver_id, "location rejected: no ongoing shift");
        tx.rollback()?;
        return Ok(false);
    };

    tx.insert_location(LocationReport {
        shift_id: shift.shift_id,
        reported_at: truncate_to_minute(when),
        location,
    })?;
    tx.commit()?;
    Ok(true)
}

/// Records that `driver_id` picked up `client_id`.
///
/// The dispatch pairing them is looked up, not assumed: without an open
/// dispatch the pick-up is refused.
pub fn pick_up<S: Store>(
    store: &S,
    driver_id: DriverId,
    client_id: ClientId,
    when: NaiveDateTime,
) -> bool {
    swallow(
        "pick_up",
        driver_id,
        try_pick_up(store, driver_id, client_id, when),
    )
}

fn try_pick_up<S: Store>(
    store: &S,
    driver_id: DriverId,
    client_id: ClientId,
    when: NaiveDateTime,
) -> Result<bool, StoreError> {
    let mut tx = store.begin()?;
    let view = LifecycleView::load(&tx)?;

    let rejection = if !view.driver_exists(driver_id) {
        Some("unknown driver")
    } else if !view.client_exists(client_id) {
        Some("unknown client")
    } else if !view.is_on_ongoing_shift(driver_id) {
        Some("no ongoing shift")
    } else {
        None
    };
    if let Some(reason) = rejection {
        info!(driver_id, client_id, reason, "pick-up rejected");
        tx.rollback()?;
        return Ok(false);
    }

    let Some(dispatch) = view.find_open_dispatch(driver_id, client_id) else {
        info!(driver_id, client_id, "pick-up rejected: no open dispatch");
        tx.rollback()?;
        return Ok(false);
    };
    let request_id = dispatch.request_id;

    tx.insert_pickup(Pickup {
        request_id,
        picked_up_at: truncate_to_minute(when),
    })?;
    tx.commit()?;

    info!(driver_id, client_id, request_id, "client picked up");
    Ok(true)
}

fn swallow(operation: &'static str, driver_id: DriverId, result: Result<bool, StoreError>) -> bool {
    match result {
        Ok(done) => done,
        Err(err) => {
            warn!(operation, driver_id, error = %err, "operation failed; nothing recorded");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::{clock_in, clock_out, pick_up, record_location};
    use crate::engine::snapshot::LifecycleView;
    use crate::geo::GeoPoint;
    use crate::models::dispatch::Dispatch;
    use crate::models::ride::{Client, RideRequest};
    use crate::models::shift::Driver;
    use crate::store::{MemoryStore, Store, Transaction};

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn point(longitude: f64, latitude: f64) -> GeoPoint {
        GeoPoint::new(longitude, latitude).unwrap()
    }

    fn roster() -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert_driver(Driver { driver_id: 22222 }).unwrap();
        tx.insert_driver(Driver { driver_id: 12345 }).unwrap();
        tx.insert_client(Client { client_id: 100 }).unwrap();
        tx.insert_client(Client { client_id: 99 }).unwrap();
        tx.insert_request(RideRequest {
            request_id: 1,
            client_id: 100,
            requested_at: at(7, 0, 0),
            source: point(-79.233, 43.712),
            destination: point(-79.4, 43.65),
        })
        .unwrap();
        tx.commit().unwrap();
        store
    }

    fn dispatch_to(store: &MemoryStore, request_id: i64, shift_id: i64) {
        let mut tx = store.begin().unwrap();
        tx.insert_dispatch(Dispatch {
            request_id,
            shift_id,
            car_location: point(-79.233, 43.712),
            dispatched_at: at(8, 5, 0),
        })
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn clock_in_creates_shift_and_location_at_minute_resolution() {
        let store = roster();

        assert!(clock_in(&store, 22222, at(8, 0, 42), point(-79.233, 43.712)));

        let tables = store.snapshot().unwrap();
        assert_eq!(tables.shifts.len(), 1);
        assert_eq!(tables.shifts[0].shift_id, 1);
        assert_eq!(tables.shifts[0].clocked_in_at, at(8, 0, 0));
        assert_eq!(tables.locations.len(), 1);
        assert_eq!(tables.locations[0].reported_at, at(8, 0, 0));
        assert_eq!(tables.locations[0].location, point(-79.233, 43.712));
    }

    #[test]
    fn shift_ids_continue_from_the_maximum() {
        let store = roster();

        assert!(clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));
        assert!(clock_in(&store, 12345, at(8, 1, 0), point(0.0, 0.0)));

        let ids: Vec<i64> = store.snapshot().unwrap().shifts.iter().map(|s| s.shift_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn unknown_driver_cannot_clock_in() {
        let store = roster();

        assert!(!clock_in(&store, 989898, at(8, 0, 0), point(0.0, 0.0)));
        assert!(store.snapshot().unwrap().shifts.is_empty());
    }

    #[test]
    fn second_clock_in_while_ongoing_is_refused() {
        let store = roster();

        assert!(clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));
        assert!(!clock_in(&store, 22222, at(8, 30, 0), point(0.0, 0.0)));
        assert_eq!(store.snapshot().unwrap().shifts.len(), 1);

        assert!(clock_out(&store, 22222, at(9, 0, 0)));
        assert!(clock_in(&store, 22222, at(9, 30, 0), point(0.0, 0.0)));
        assert_eq!(store.snapshot().unwrap().shifts.len(), 2);
    }

    #[test]
    fn clock_out_without_shift_is_refused() {
        let store = roster();
        assert!(!clock_out(&store, 22222, at(9, 0, 0)));
    }

    #[test]
    fn location_reports_need_an_ongoing_shift() {
        let store = roster();

        assert!(!record_location(&store, 22222, at(8, 0, 0), point(1.0, 1.0)));
        assert!(clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));
        assert!(record_location(&store, 22222, at(8, 10, 30), point(1.0, 1.0)));

        let view = LifecycleView::capture(&store).unwrap();
        assert_eq!(view.latest_location(1).unwrap().location, point(1.0, 1.0));
        assert_eq!(view.latest_location(1).unwrap().reported_at, at(8, 10, 0));
    }

    #[test]
    fn store_failure_during_clock_in_reports_false_and_writes_nothing() {
        let store = roster();
        store.fail_inserts_after(1);

        assert!(!clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));

        store.clear_faults();
        let tables = store.snapshot().unwrap();
        assert!(tables.shifts.is_empty());
        assert!(tables.locations.is_empty());
    }

    #[test]
    fn closed_store_reports_false() {
        let store = roster();
        store.disconnect();

        assert!(!clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));
        assert!(!pick_up(&store, 22222, 100, at(8, 0, 0)));
    }

    #[test]
    fn pick_up_records_the_open_dispatch() {
        let store = roster();
        assert!(clock_in(&store, 22222, at(8, 0, 0), point(-79.233, 43.712)));
        dispatch_to(&store, 1, 1);

        assert!(pick_up(&store, 22222, 100, at(8, 15, 20)));

        let tables = store.snapshot().unwrap();
        assert_eq!(tables.pickups.len(), 1);
        assert_eq!(tables.pickups[0].request_id, 1);
        assert_eq!(tables.pickups[0].picked_up_at, at(8, 15, 0));

        // already picked up
        assert!(!pick_up(&store, 22222, 100, at(8, 20, 0)));
    }

    #[test]
    fn pick_up_requires_a_dispatch_for_the_pair() {
        let store = roster();
        assert!(clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));
        assert!(clock_in(&store, 12345, at(8, 0, 0), point(0.0, 0.0)));
        dispatch_to(&store, 1, 1);

        assert!(!pick_up(&store, 12345, 100, at(8, 15, 0)));
        assert!(!pick_up(&store, 22222, 99, at(8, 15, 0)));
        assert!(store.snapshot().unwrap().pickups.is_empty());
    }

    #[test]
    fn pick_up_rejects_unknown_parties_and_off_shift_drivers() {
        let store = roster();
        assert!(clock_in(&store, 22222, at(8, 0, 0), point(0.0, 0.0)));
        dispatch_to(&store, 1, 1);

        assert!(!pick_up(&store, 989898, 100, at(8, 15, 0)));
        assert!(!pick_up(&store, 22222, 33, at(8, 15, 0)));

        assert!(clock_out(&store, 22222, at(8, 20, 0)));
        assert!(!pick_up(&store, 22222, 100, at(8, 25, 0)));
        assert!(store.snapshot().unwrap().pickups.is_empty());
    }
}
