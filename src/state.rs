use std::sync::Arc;

use tokio::sync::broadcast;

use crate::models::dispatch::Dispatch;
use crate::observability::metrics::Metrics;
use crate::store::MemoryStore;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub dispatch_events_tx: broadcast::Sender<Dispatch>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, event_buffer_size: usize) -> Self {
        let (dispatch_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store,
            dispatch_events_tx,
            metrics: Metrics::new(),
        }
    }
}
