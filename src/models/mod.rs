pub mod dispatch;
pub mod ride;
pub mod shift;

pub type DriverId = i64;
pub type ClientId = i64;
pub type ShiftId = i64;
pub type RequestId = i64;
