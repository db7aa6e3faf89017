use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// How a lifecycle operation ended, as seen by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Success,
    /// A precondition did not hold.
    Rejected,
    /// The store was unavailable.
    Error,
}

impl LifecycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleOutcome::Success => "success",
            LifecycleOutcome::Rejected => "rejected",
            LifecycleOutcome::Error => "error",
        }
    }
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_batches_total: IntCounterVec,
    pub dispatches_created_total: IntCounter,
    pub dispatch_batch_latency_seconds: HistogramVec,
    pub lifecycle_operations_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_batches_total = IntCounterVec::new(
            Opts::new("dispatch_batches_total", "Dispatch batches by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_batches_total metric");

        let dispatches_created_total =
            IntCounter::new("dispatches_created_total", "Dispatch rows committed")
                .expect("valid dispatches_created_total metric");

        let dispatch_batch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_batch_latency_seconds",
                "Latency of a dispatch batch in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_batch_latency_seconds metric");

        let lifecycle_operations_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_operations_total",
                "Shift and ride lifecycle operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid lifecycle_operations_total metric");

        registry
            .register(Box::new(dispatch_batches_total.clone()))
            .expect("register dispatch_batches_total");
        registry
            .register(Box::new(dispatches_created_total.clone()))
            .expect("register dispatches_created_total");
        registry
            .register(Box::new(dispatch_batch_latency_seconds.clone()))
            .expect("register dispatch_batch_latency_seconds");
        registry
            .register(Box::new(lifecycle_operations_total.clone()))
            .expect("register lifecycle_operations_total");

        Self {
            registry,
            dispatch_batches_total,
            dispatches_created_total,
            dispatch_batch_latency_seconds,
            lifecycle_operations_total,
        }
    }

    pub fn record_lifecycle(&self, operation: &str, outcome: LifecycleOutcome) {
        self.lifecycle_operations_total
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
