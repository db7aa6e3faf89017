use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::ShiftId;
use crate::models::dispatch::{Dispatch, Dropoff, Pickup};
use crate::models::ride::{Billing, Client, RideRequest};
use crate::models::shift::{ClockOut, Driver, LocationReport, Shift};
use crate::store::{Store, StoreError, Transaction};

/// Every table of the dispatch schema. Rows are only ever appended.
///
/// This is also the store file format; tables missing from a file load empty.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub drivers: Vec<Driver>,
    pub clients: Vec<Client>,
    pub shifts: Vec<Shift>,
    pub clock_outs: Vec<ClockOut>,
    pub locations: Vec<LocationReport>,
    pub requests: Vec<RideRequest>,
    pub dispatches: Vec<Dispatch>,
    pub pickups: Vec<Pickup>,
    pub dropoffs: Vec<Dropoff>,
    pub billings: Vec<Billing>,
}

impl Tables {
    fn append(&mut self, mut other: Tables) {
        self.drivers.append(&mut other.drivers);
        self.clients.append(&mut other.clients);
        self.shifts.append(&mut other.shifts);
        self.clock_outs.append(&mut other.clock_outs);
        self.locations.append(&mut other.locations);
        self.requests.append(&mut other.requests);
        self.dispatches.append(&mut other.dispatches);
        self.pickups.append(&mut other.pickups);
        self.dropoffs.append(&mut other.dropoffs);
        self.billings.append(&mut other.billings);
    }

    fn row_count(&self) -> usize {
        self.drivers.len()
            + self.clients.len()
            + self.shifts.len()
            + self.clock_outs.len()
            + self.locations.len()
            + self.requests.len()
            + self.dispatches.len()
            + self.pickups.len()
            + self.dropoffs.len()
            + self.billings.len()
    }
}

/// In-process store. A transaction holds the table lock until it finishes,
/// so transactions are serialized and never observe each other's staged rows.
///
/// When connected with a path, the full table set is rewritten to that JSON
/// file on every commit.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    path: Option<PathBuf>,
    connected: AtomicBool,
    #[cfg(any(test, feature = "fault-injection"))]
    insert_budget: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_tables(Tables::default(), None)
    }

    /// Opens the store, loading `path` if it exists.
    pub fn connect(path: Option<&Path>) -> Result<Self, StoreError> {
        let tables = match path {
            Some(path) if path.exists() => {
                let raw = fs::read(path)?;
                let tables: Tables = serde_json::from_slice(&raw)?;
                info!(path = %path.display(), rows = tables.row_count(), "store loaded");
                tables
            }
            _ => Tables::default(),
        };

        Ok(Self::with_tables(tables, path.map(Path::to_path_buf)))
    }

    fn with_tables(tables: Tables, path: Option<PathBuf>) -> Self {
        Self {
            tables: Mutex::new(tables),
            path,
            connected: AtomicBool::new(true),
            #[cfg(any(test, feature = "fault-injection"))]
            insert_budget: Mutex::new(None),
        }
    }

    /// Lets the next `n` inserts through and fails every one after that,
    /// until [`MemoryStore::clear_faults`] is called.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn fail_inserts_after(&self, n: usize) {
        if let Ok(mut budget) = self.insert_budget.lock() {
            *budget = Some(n);
        }
    }

    #[cfg(any(test, feature = "fault-injection"))]
    pub fn clear_faults(&self) {
        if let Ok(mut budget) = self.insert_budget.lock() {
            *budget = None;
        }
    }

    /// Copy of the committed tables.
    pub fn snapshot(&self) -> Result<Tables, StoreError> {
        self.ensure_connected()?;
        let tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.clone())
    }

    /// False once [`Store::disconnect`] has been called.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    #[cfg(any(test, feature = "fault-injection"))]
    fn charge_insert(&self, table: &'static str) -> Result<(), StoreError> {
        let mut budget = self.insert_budget.lock().map_err(|_| StoreError::Poisoned)?;
        match budget.as_mut() {
            Some(0) => Err(StoreError::Injected(table)),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    #[cfg(not(any(test, feature = "fault-injection")))]
    fn charge_insert(&self, _table: &'static str) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>, StoreError> {
        self.ensure_connected()?;
        let committed = self.tables.lock().map_err(|_| StoreError::Poisoned)?;

        Ok(MemoryTransaction {
            store: self,
            committed,
            staged: Tables::default(),
            finished: false,
        })
    }

    fn disconnect(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            info!("store disconnected");
        } else {
            warn!("store already disconnected");
        }
        was_connected
    }
}

pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    committed: MutexGuard<'a, Tables>,
    staged: Tables,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn scan<T: Clone>(&self, table: fn(&Tables) -> &Vec<T>) -> Vec<T> {
        table(&self.committed)
            .iter()
            .chain(table(&self.staged).iter())
            .cloned()
            .collect()
    }

    fn exists<T>(&self, table: fn(&Tables) -> &Vec<T>, pred: impl Fn(&T) -> bool) -> bool {
        table(&self.committed).iter().any(&pred) || table(&self.staged).iter().any(&pred)
    }

    fn unique<T>(
        &self,
        name: &'static str,
        table: fn(&Tables) -> &Vec<T>,
        key: impl std::fmt::Display,
        pred: impl Fn(&T) -> bool,
    ) -> Result<(), StoreError> {
        if self.exists(table, pred) {
            return Err(StoreError::UniqueViolation {
                table: name,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn references<T>(
        &self,
        name: &'static str,
        table: fn(&Tables) -> &Vec<T>,
        detail: impl FnOnce() -> String,
        pred: impl Fn(&T) -> bool,
    ) -> Result<(), StoreError> {
        if !self.exists(table, pred) {
            return Err(StoreError::ForeignKeyViolation {
                table: name,
                detail: detail(),
            });
        }
        Ok(())
    }

    fn begin_insert(&self, table: &'static str) -> Result<(), StoreError> {
        self.store.ensure_connected()?;
        self.store.charge_insert(table)
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn drivers(&self) -> Result<Vec<Driver>, StoreError> {
        Ok(self.scan(|t| &t.drivers))
    }

    fn clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(self.scan(|t| &t.clients))
    }

    fn shifts(&self) -> Result<Vec<Shift>, StoreError> {
        Ok(self.scan(|t| &t.shifts))
    }

    fn clock_outs(&self) -> Result<Vec<ClockOut>, StoreError> {
        Ok(self.scan(|t| &t.clock_outs))
    }

    fn locations(&self) -> Result<Vec<LocationReport>, StoreError> {
        Ok(self.scan(|t| &t.locations))
    }

    fn requests(&self) -> Result<Vec<RideRequest>, StoreError> {
        Ok(self.scan(|t| &t.requests))
    }

    fn dispatches(&self) -> Result<Vec<Dispatch>, StoreError> {
        Ok(self.scan(|t| &t.dispatches))
    }

    fn pickups(&self) -> Result<Vec<Pickup>, StoreError> {
        Ok(self.scan(|t| &t.pickups))
    }

    fn dropoffs(&self) -> Result<Vec<Dropoff>, StoreError> {
        Ok(self.scan(|t| &t.dropoffs))
    }

    fn billings(&self) -> Result<Vec<Billing>, StoreError> {
        Ok(self.scan(|t| &t.billings))
    }

    fn max_shift_id(&self) -> Result<Option<ShiftId>, StoreError> {
        Ok(self
            .committed
            .shifts
            .iter()
            .chain(self.staged.shifts.iter())
            .map(|shift| shift.shift_id)
            .max())
    }

    fn insert_driver(&mut self, row: Driver) -> Result<(), StoreError> {
        self.begin_insert("driver")?;
        self.unique("driver", |t| &t.drivers, row.driver_id, |d| {
            d.driver_id == row.driver_id
        })?;
        self.staged.drivers.push(row);
        Ok(())
    }

    fn insert_client(&mut self, row: Client) -> Result<(), StoreError> {
        self.begin_insert("client")?;
        self.unique("client", |t| &t.clients, row.client_id, |c| {
            c.client_id == row.client_id
        })?;
        self.staged.clients.push(row);
        Ok(())
    }

    fn insert_shift(&mut self, row: Shift) -> Result<(), StoreError> {
        self.begin_insert("shift")?;
        self.unique("shift", |t| &t.shifts, row.shift_id, |s| {
            s.shift_id == row.shift_id
        })?;
        self.references(
            "shift",
            |t| &t.drivers,
            || format!("driver {}", row.driver_id),
            |d| d.driver_id == row.driver_id,
        )?;
        self.staged.shifts.push(row);
        Ok(())
    }

    fn insert_clock_out(&mut self, row: ClockOut) -> Result<(), StoreError> {
        self.begin_insert("clock_out")?;
        self.unique("clock_out", |t| &t.clock_outs, row.shift_id, |c| {
            c.shift_id == row.shift_id
        })?;
        self.references(
            "clock_out",
            |t| &t.shifts,
            || format!("shift {}", row.shift_id),
            |s| s.shift_id == row.shift_id,
        )?;
        self.staged.clock_outs.push(row);
        Ok(())
    }

    fn insert_location(&mut self, row: LocationReport) -> Result<(), StoreError> {
        self.begin_insert("location")?;
        self.references(
            "location",
            |t| &t.shifts,
            || format!("shift {}", row.shift_id),
            |s| s.shift_id == row.shift_id,
        )?;
        self.staged.locations.push(row);
        Ok(())
    }

    fn insert_request(&mut self, row: RideRequest) -> Result<(), StoreError> {
        self.begin_insert("request")?;
        self.unique("request", |t| &t.requests, row.request_id, |r| {
            r.request_id == row.request_id
        })?;
        self.references(
            "request",
            |t| &t.clients,
            || format!("client {}", row.client_id),
            |c| c.client_id == row.client_id,
        )?;
        self.staged.requests.push(row);
        Ok(())
    }

    fn insert_dispatch(&mut self, row: Dispatch) -> Result<(), StoreError> {
        self.begin_insert("dispatch")?;
        self.unique("dispatch", |t| &t.dispatches, row.request_id, |d| {
            d.request_id == row.request_id
        })?;
        self.references(
            "dispatch",
            |t| &t.requests,
            || format!("request {}", row.request_id),
            |r| r.request_id == row.request_id,
        )?;
        self.references(
            "dispatch",
            |t| &t.shifts,
            || format!("shift {}", row.shift_id),
            |s| s.shift_id == row.shift_id,
        )?;
        self.staged.dispatches.push(row);
        Ok(())
    }

    fn insert_pickup(&mut self, row: Pickup) -> Result<(), StoreError> {
        self.begin_insert("pickup")?;
        self.unique("pickup", |t| &t.pickups, row.request_id, |p| {
            p.request_id == row.request_id
        })?;
        self.references(
            "pickup",
            |t| &t.dispatches,
            || format!("dispatch for request {}", row.request_id),
            |d| d.request_id == row.request_id,
        )?;
        self.staged.pickups.push(row);
        Ok(())
    }

    fn insert_dropoff(&mut self, row: Dropoff) -> Result<(), StoreError> {
        self.begin_insert("dropoff")?;
        self.unique("dropoff", |t| &t.dropoffs, row.request_id, |d| {
            d.request_id == row.request_id
        })?;
        self.references(
            "dropoff",
            |t| &t.pickups,
            || format!("pickup for request {}", row.request_id),
            |p| p.request_id == row.request_id,
        )?;
        self.staged.dropoffs.push(row);
        Ok(())
    }

    fn insert_billing(&mut self, row: Billing) -> Result<(), StoreError> {
        self.begin_insert("billing")?;
        self.unique("billing", |t| &t.billings, row.request_id, |b| {
            b.request_id == row.request_id
        })?;
        self.references(
            "billing",
            |t| &t.requests,
            || format!("request {}", row.request_id),
            |r| r.request_id == row.request_id,
        )?;
        self.staged.billings.push(row);
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.store.ensure_connected()?;
        let staged = std::mem::take(&mut self.staged);
        let rows = staged.row_count();

        match &self.store.path {
            Some(path) => {
                let mut next = self.committed.clone();
                next.append(staged);
                write_tables(path, &next)?;
                *self.committed = next;
            }
            None => self.committed.append(staged),
        }

        self.finished = true;
        debug!(rows, "transaction committed");
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        let discarded = std::mem::take(&mut self.staged).row_count();
        self.finished = true;
        debug!(discarded, "transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished && self.staged.row_count() > 0 {
            debug!(
                discarded = self.staged.row_count(),
                "transaction dropped without commit"
            );
        }
    }
}

fn write_tables(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(tables)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::MemoryStore;
    use crate::geo::GeoPoint;
    use crate::models::dispatch::{Dispatch, Pickup};
    use crate::models::ride::{Client, RideRequest};
    use crate::models::shift::{Driver, Shift};
    use crate::store::{Store, StoreError, Transaction};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn point(longitude: f64, latitude: f64) -> GeoPoint {
        GeoPoint::new(longitude, latitude).unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert_driver(Driver { driver_id: 1 }).unwrap();
        tx.insert_client(Client { client_id: 10 }).unwrap();
        tx.insert_shift(Shift {
            shift_id: 1,
            driver_id: 1,
            clocked_in_at: at(8, 0),
        })
        .unwrap();
        tx.insert_request(RideRequest {
            request_id: 100,
            client_id: 10,
            requested_at: at(8, 5),
            source: point(4.0, 50.0),
            destination: point(5.0, 51.0),
        })
        .unwrap();
        tx.commit().unwrap();
        store
    }

    fn dispatch_row(request_id: i64) -> Dispatch {
        Dispatch {
            request_id,
            shift_id: 1,
            car_location: point(4.0, 49.0),
            dispatched_at: at(8, 10),
        }
    }

    #[test]
    fn uncommitted_rows_are_visible_only_inside_the_transaction() {
        let store = seeded();

        let mut tx = store.begin().unwrap();
        tx.insert_dispatch(dispatch_row(100)).unwrap();
        assert_eq!(tx.dispatches().unwrap().len(), 1);
        drop(tx);

        assert!(store.snapshot().unwrap().dispatches.is_empty());
    }

    #[test]
    fn rollback_discards_staged_rows() {
        let store = seeded();

        let mut tx = store.begin().unwrap();
        tx.insert_dispatch(dispatch_row(100)).unwrap();
        tx.rollback().unwrap();

        assert!(store.snapshot().unwrap().dispatches.is_empty());
    }

    #[test]
    fn dispatch_is_unique_per_request() {
        let store = seeded();

        let mut tx = store.begin().unwrap();
        tx.insert_dispatch(dispatch_row(100)).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let err = tx.insert_dispatch(dispatch_row(100)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UniqueViolation {
                table: "dispatch",
                ..
            }
        ));
    }

    #[test]
    fn pickup_must_reference_a_dispatch() {
        let store = seeded();

        let mut tx = store.begin().unwrap();
        let err = tx
            .insert_pickup(Pickup {
                request_id: 100,
                picked_up_at: at(8, 20),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }

    #[test]
    fn shift_requires_known_driver() {
        let store = seeded();

        let mut tx = store.begin().unwrap();
        let err = tx
            .insert_shift(Shift {
                shift_id: 2,
                driver_id: 99,
                clocked_in_at: at(9, 0),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }

    #[test]
    fn injected_fault_fails_after_budget_is_spent() {
        let store = seeded();
        store.fail_inserts_after(1);

        let mut tx = store.begin().unwrap();
        tx.insert_driver(Driver { driver_id: 2 }).unwrap();
        let err = tx.insert_driver(Driver { driver_id: 3 }).unwrap_err();
        assert!(matches!(err, StoreError::Injected("driver")));
        drop(tx);

        store.clear_faults();
        let mut tx = store.begin().unwrap();
        tx.insert_driver(Driver { driver_id: 3 }).unwrap();
    }

    #[test]
    fn max_shift_id_includes_staged_rows() {
        let store = seeded();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.max_shift_id().unwrap(), Some(1));
        tx.insert_shift(Shift {
            shift_id: 7,
            driver_id: 1,
            clocked_in_at: at(9, 0),
        })
        .unwrap();
        assert_eq!(tx.max_shift_id().unwrap(), Some(7));

        assert_eq!(MemoryStore::new().begin().unwrap().max_shift_id().unwrap(), None);
    }

    #[test]
    fn disconnect_releases_once() {
        let store = seeded();
        assert!(store.is_connected());

        assert!(store.disconnect());
        assert!(!store.is_connected());
        assert!(!store.disconnect());
        assert!(matches!(store.begin(), Err(StoreError::Closed)));
    }

    #[test]
    fn commits_persist_to_file_and_reload() {
        let path = std::env::temp_dir().join(format!("ride-dispatch-{}.json", uuid::Uuid::new_v4()));

        {
            let store = MemoryStore::connect(Some(&path)).unwrap();
            let mut tx = store.begin().unwrap();
            tx.insert_driver(Driver { driver_id: 5 }).unwrap();
            tx.insert_client(Client { client_id: 6 }).unwrap();
            tx.insert_request(RideRequest {
                request_id: 1,
                client_id: 6,
                requested_at: at(7, 0),
                source: point(-79.233, 43.712),
                destination: point(-79.4, 43.65),
            })
            .unwrap();
            tx.commit().unwrap();
            assert!(store.disconnect());
        }

        let reopened = MemoryStore::connect(Some(&path)).unwrap();
        let tables = reopened.snapshot().unwrap();
        assert_eq!(tables.drivers, vec![Driver { driver_id: 5 }]);
        assert_eq!(tables.requests[0].source, point(-79.233, 43.712));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn malformed_point_in_file_is_a_codec_error() {
        let path = std::env::temp_dir().join(format!("ride-dispatch-{}.json", uuid::Uuid::new_v4()));
        let body = serde_json::json!({
            "drivers": [], "clients": [{ "client_id": 1 }], "shifts": [], "clock_outs": [],
            "locations": [], "dispatches": [], "pickups": [], "dropoffs": [], "billings": [],
            "requests": [{
                "request_id": 1, "client_id": 1, "requested_at": "2026-10-16T07:00:00",
                "source": "4.0;50.0", "destination": "(4,50)"
            }]
        });
        std::fs::write(&path, body.to_string()).unwrap();

        let result = MemoryStore::connect(Some(&path));
        assert!(matches!(result, Err(StoreError::Codec(_))));

        std::fs::remove_file(&path).unwrap();
    }
}
