use crate::storage::StoreHealth;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("huddle-server");
        Self {
            status: meter
                .i64_gauge("huddle_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    store: Arc<dyn StoreHealth>,
    timeout: Duration,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(store: Arc<dyn StoreHealth>, timeout_ms: u64) -> Self {
        Self { store, timeout: Duration::from_millis(timeout_ms), metrics: Metrics::new() }
    }

    /// Checks store connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_storage(&self) -> Result<(), String> {
        let result = match timeout(self.timeout, self.store.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Storage check failed: {e}")),
            Err(_) => Err("Storage check timed out".to_string()),
        };

        let value = i64::from(result.is_ok());
        self.metrics.status.record(value, &[KeyValue::new("component", "storage")]);
        result
    }
}
