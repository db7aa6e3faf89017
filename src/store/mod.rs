pub mod memory;

use thiserror::Error;

use crate::models::ShiftId;
use crate::models::dispatch::{Dispatch, Dropoff, Pickup};
use crate::models::ride::{Billing, Client, RideRequest};
use crate::models::shift::{ClockOut, Driver, LocationReport, Shift};

pub use memory::{MemoryStore, MemoryTransaction, Tables};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection is closed")]
    Closed,

    #[error("store lock poisoned")]
    Poisoned,

    #[error("duplicate key in {table}: {key}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("missing reference from {table}: {detail}")]
    ForeignKeyViolation { table: &'static str, detail: String },

    #[error("injected failure inserting into {0}")]
    Injected(&'static str),

    #[error("store file io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A source of transactions over the dispatch tables.
///
/// The handle is created once and passed to every operation explicitly.
pub trait Store: Send + Sync {
    type Tx<'a>: Transaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;

    /// Releases the handle. Returns `false` if it was already released.
    fn disconnect(&self) -> bool;
}

/// One all-or-nothing unit of work.
///
/// Reads see committed rows plus this transaction's own inserts. Dropping a
/// transaction without calling [`Transaction::commit`] discards its inserts.
pub trait Transaction {
    fn drivers(&self) -> Result<Vec<Driver>, StoreError>;
    fn clients(&self) -> Result<Vec<Client>, StoreError>;
    fn shifts(&self) -> Result<Vec<Shift>, StoreError>;
    fn clock_outs(&self) -> Result<Vec<ClockOut>, StoreError>;
    fn locations(&self) -> Result<Vec<LocationReport>, StoreError>;
    fn requests(&self) -> Result<Vec<RideRequest>, StoreError>;
    fn dispatches(&self) -> Result<Vec<Dispatch>, StoreError>;
    fn pickups(&self) -> Result<Vec<Pickup>, StoreError>;
    fn dropoffs(&self) -> Result<Vec<Dropoff>, StoreError>;
    fn billings(&self) -> Result<Vec<Billing>, StoreError>;

    fn max_shift_id(&self) -> Result<Option<ShiftId>, StoreError>;

    fn insert_driver(&mut self, row: Driver) -> Result<(), StoreError>;
    fn insert_client(&mut self, row: Client) -> Result<(), StoreError>;
    fn insert_shift(&mut self, row: Shift) -> Result<(), StoreError>;
    fn insert_clock_out(&mut self, row: ClockOut) -> Result<(), StoreError>;
    fn insert_location(&mut self, row: LocationReport) -> Result<(), StoreError>;
    fn insert_request(&mut self, row: RideRequest) -> Result<(), StoreError>;
    fn insert_dispatch(&mut self, row: Dispatch) -> Result<(), StoreError>;
    fn insert_pickup(&mut self, row: Pickup) -> Result<(), StoreError>;
    fn insert_dropoff(&mut self, row: Dropoff) -> Result<(), StoreError>;
    fn insert_billing(&mut self, row: Billing) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;
    fn rollback(self) -> Result<(), StoreError>;
}
