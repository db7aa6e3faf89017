use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::{RequestId, ShiftId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub request_id: RequestId,
    pub shift_id: ShiftId,
    pub car_location: GeoPoint,
    pub dispatched_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub request_id: RequestId,
    pub picked_up_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dropoff {
    pub request_id: RequestId,
    pub dropped_off_at: NaiveDateTime,
}

/// Dispatches committed together by one matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchBatch {
    pub batch_id: Uuid,
    pub dispatches: Vec<Dispatch>,
}
