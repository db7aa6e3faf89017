use serde::Serialize;

use crate::engine::snapshot::{LifecycleView, ShiftStatus};
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::ride::{RequestStatus, RideRequest};
use crate::models::{DriverId, ShiftId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRequest {
    pub request: RideRequest,
    pub billing_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibleDriver {
    pub driver_id: DriverId,
    pub shift_id: ShiftId,
    pub location: GeoPoint,
}

impl LifecycleView {
    /// Undispatched requests whose source lies in `bounds`, ascending by the
    /// client's billing total. The last element is the next one to serve;
    /// among equal totals the lowest request id sits last.
    pub fn open_requests_in(&self, bounds: &BoundingBox) -> Vec<RankedRequest> {
        let mut ranked: Vec<RankedRequest> = self
            .requests
            .values()
            .filter(|request| {
                self.request_status(request.request_id) == Some(RequestStatus::Requested)
            })
            .filter(|request| bounds.contains(&request.source))
            .map(|request| RankedRequest {
                billing_total: self.billing_total(request.client_id),
                request: request.clone(),
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.billing_total
                .total_cmp(&b.billing_total)
                .then_with(|| b.request.request_id.cmp(&a.request.request_id))
        });

        ranked
    }

    /// Drivers on an ongoing shift with no unfinished ride whose most recent
    /// location lies in `bounds`, ordered by shift id.
    pub fn eligible_drivers_in(&self, bounds: &BoundingBox) -> Vec<EligibleDriver> {
        self.shifts
            .values()
            .filter(|(_, status)| *status == ShiftStatus::Ongoing)
            .filter(|(shift, _)| !self.is_driving(shift.shift_id))
            .filter_map(|(shift, _)| {
                let report = self.latest_location(shift.shift_id)?;
                bounds.contains(&report.location).then(|| EligibleDriver {
                    driver_id: shift.driver_id,
                    shift_id: shift.shift_id,
                    location: report.location,
                })
            })
            .collect()
    }
}
