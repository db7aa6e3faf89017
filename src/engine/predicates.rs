use crate::engine::snapshot::LifecycleView;
use crate::models::dispatch::Dispatch;
use crate::models::ride::RequestStatus;
use crate::models::{ClientId, DriverId};

impl LifecycleView {
    pub fn is_on_ongoing_shift(&self, driver_id: DriverId) -> bool {
        self.ongoing_shift(driver_id).is_some()
    }

    /// Known from the roster or from any shift the driver ever started.
    pub fn driver_exists(&self, driver_id: DriverId) -> bool {
        self.drivers.contains(&driver_id)
            || self
                .shifts
                .values()
                .any(|(shift, _)| shift.driver_id == driver_id)
    }

    /// Known from the roster or from any request the client ever made.
    pub fn client_exists(&self, client_id: ClientId) -> bool {
        self.clients.contains(&client_id)
            || self
                .requests
                .values()
                .any(|request| request.client_id == client_id)
    }

    /// The dispatch sending this driver to this client that has not been
    /// picked up yet. At most one is expected; the lowest request id wins otherwise.
    pub fn find_open_dispatch(&self, driver_id: DriverId, client_id: ClientId) -> Option<&Dispatch> {
        self.dispatches_between(driver_id, client_id)
            .find(|dispatch| self.request_status(dispatch.request_id) == Some(RequestStatus::Dispatched))
    }

    pub fn is_picked_up(&self, driver_id: DriverId, client_id: ClientId) -> bool {
        self.dispatches_between(driver_id, client_id).any(|dispatch| {
            matches!(
                self.request_status(dispatch.request_id),
                Some(RequestStatus::PickedUp | RequestStatus::DroppedOff)
            )
        })
    }

    fn dispatches_between(
        &self,
        driver_id: DriverId,
        client_id: ClientId,
    ) -> impl Iterator<Item = &Dispatch> + '_ {
        self.dispatches.values().filter(move |dispatch| {
            let driver_matches = self
                .shifts
                .get(&dispatch.shift_id)
                .is_some_and(|(shift, _)| shift.driver_id == driver_id);
            let client_matches = self
                .requests
                .get(&dispatch.request_id)
                .is_some_and(|request| request.client_id == client_id);
            driver_matches && client_matches
        })
    }
}
