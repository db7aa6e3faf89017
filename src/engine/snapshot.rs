use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::dispatch::Dispatch;
use crate::models::ride::{RequestStatus, RideRequest};
use crate::models::shift::{LocationReport, Shift};
use crate::models::{ClientId, DriverId, RequestId, ShiftId};
use crate::store::{Store, StoreError, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftStatus {
    Ongoing,
    Ended,
}

/// Lifecycle state of every driver, shift and request, derived once from the
/// rows visible to a transaction.
///
/// Operations build one view right after `begin` and answer every eligibility
/// question from it, so a decision never mixes state from two points in time.
#[derive(Debug, Clone, Default)]
pub struct LifecycleView {
    pub(crate) drivers: HashSet<DriverId>,
    pub(crate) clients: HashSet<ClientId>,
    pub(crate) shifts: BTreeMap<ShiftId, (Shift, ShiftStatus)>,
    pub(crate) requests: BTreeMap<RequestId, RideRequest>,
    pub(crate) request_status: HashMap<RequestId, RequestStatus>,
    pub(crate) dispatches: BTreeMap<RequestId, Dispatch>,
    pub(crate) driving_shifts: HashSet<ShiftId>,
    pub(crate) latest_locations: HashMap<ShiftId, LocationReport>,
    pub(crate) billing_totals: HashMap<ClientId, f64>,
}

impl LifecycleView {
    pub fn load<T: Transaction>(tx: &T) -> Result<Self, StoreError> {
        let clock_outs: HashSet<ShiftId> = tx
            .clock_outs()?
            .into_iter()
            .map(|row| row.shift_id)
            .collect();
        let picked_up: HashSet<RequestId> =
            tx.pickups()?.into_iter().map(|row| row.request_id).collect();
        let dropped_off: HashSet<RequestId> =
            tx.dropoffs()?.into_iter().map(|row| row.request_id).collect();

        let mut view = LifecycleView {
            drivers: tx.drivers()?.into_iter().map(|d| d.driver_id).collect(),
            clients: tx.clients()?.into_iter().map(|c| c.client_id).collect(),
            ..Default::default()
        };

        for shift in tx.shifts()? {
            let status = if clock_outs.contains(&shift.shift_id) {
                ShiftStatus::Ended
            } else {
                ShiftStatus::Ongoing
            };
            view.shifts.insert(shift.shift_id, (shift, status));
        }

        for dispatch in tx.dispatches()? {
            view.dispatches.insert(dispatch.request_id, dispatch);
        }

        for request in tx.requests()? {
            let id = request.request_id;
            let status = match (
                view.dispatches.contains_key(&id),
                picked_up.contains(&id),
                dropped_off.contains(&id),
            ) {
                (false, _, _) => RequestStatus::Requested,
                (true, false, _) => RequestStatus::Dispatched,
                (true, true, false) => RequestStatus::PickedUp,
                (true, true, true) => RequestStatus::DroppedOff,
            };
            view.request_status.insert(id, status);
            view.requests.insert(id, request);
        }

        for dispatch in view.dispatches.values() {
            let in_progress = view
                .request_status
                .get(&dispatch.request_id)
                .is_some_and(RequestStatus::is_in_progress);
            if in_progress {
                view.driving_shifts.insert(dispatch.shift_id);
            }
        }

        // Later rows win ties so a repeated report at the same minute replaces the earlier one.
        for report in tx.locations()? {
            let newer = view
                .latest_locations
                .get(&report.shift_id)
                .is_none_or(|current| report.reported_at >= current.reported_at);
            if newer {
                view.latest_locations.insert(report.shift_id, report);
            }
        }

        for billing in tx.billings()? {
            if let Some(request) = view.requests.get(&billing.request_id) {
                *view.billing_totals.entry(request.client_id).or_insert(0.0) += billing.amount;
            }
        }

        Ok(view)
    }

    /// Builds a view in a throwaway transaction.
    pub fn capture<S: Store>(store: &S) -> Result<Self, StoreError> {
        let tx = store.begin()?;
        let view = Self::load(&tx)?;
        tx.rollback()?;
        Ok(view)
    }

    pub fn request_status(&self, request_id: RequestId) -> Option<RequestStatus> {
        self.request_status.get(&request_id).copied()
    }

    pub fn shift_status(&self, shift_id: ShiftId) -> Option<ShiftStatus> {
        self.shifts.get(&shift_id).map(|(_, status)| *status)
    }

    pub fn ongoing_shift(&self, driver_id: DriverId) -> Option<&Shift> {
        self.shifts
            .values()
            .filter(|(shift, status)| shift.driver_id == driver_id && *status == ShiftStatus::Ongoing)
            .map(|(shift, _)| shift)
            .next_back()
    }

    pub fn is_driving(&self, shift_id: ShiftId) -> bool {
        self.driving_shifts.contains(&shift_id)
    }

    pub fn latest_location(&self, shift_id: ShiftId) -> Option<&LocationReport> {
        self.latest_locations.get(&shift_id)
    }

    pub fn ongoing_shift_count(&self) -> usize {
        self.shifts
            .values()
            .filter(|(_, status)| *status == ShiftStatus::Ongoing)
            .count()
    }

    pub fn open_request_count(&self) -> usize {
        self.request_status
            .values()
            .filter(|status| **status == RequestStatus::Requested)
            .count()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.len()
    }

    /// Sum of every charge on the client's requests; zero without history.
    pub fn billing_total(&self, client_id: ClientId) -> f64 {
        self.billing_totals.get(&client_id).copied().unwrap_or(0.0)
    }
}
