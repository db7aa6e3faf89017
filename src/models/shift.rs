use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::{DriverId, ShiftId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Driver {
    pub driver_id: DriverId,
}

/// Clock-in row. A shift is ongoing until a [`ClockOut`] with its id exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub clocked_in_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockOut {
    pub shift_id: ShiftId,
    pub clocked_out_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub shift_id: ShiftId,
    pub reported_at: NaiveDateTime,
    pub location: GeoPoint,
}
