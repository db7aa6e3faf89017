use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::{ClientId, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Client {
    pub client_id: ClientId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub request_id: RequestId,
    pub client_id: ClientId,
    pub requested_at: NaiveDateTime,
    pub source: GeoPoint,
    pub destination: GeoPoint,
}

/// A charge against a past request; summed per client to rank new requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    pub request_id: RequestId,
    pub amount: f64,
}

/// Where a request sits in its lifecycle, derived from which rows exist for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Requested,
    Dispatched,
    PickedUp,
    DroppedOff,
}

impl RequestStatus {
    /// True while a driver is committed to the ride.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RequestStatus::Dispatched | RequestStatus::PickedUp)
    }
}
