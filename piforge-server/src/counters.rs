use std::sync::atomic::{AtomicU64, Ordering};

use piforge_proto::msg::EndpointCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ApiStatus,
    Healthz,
    ApiMetrics,
    Dashboard,
}

/// Process-lifetime request counters. Start at zero, never persisted.
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    api_status: AtomicU64,
    healthz: AtomicU64,
    api_metrics: AtomicU64,
    dashboard: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one HTTP request, returning the new total.
    pub fn record_request(&self) -> u64 {
        self.total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn hit(&self, endpoint: Endpoint) {
        let counter = match endpoint {
            Endpoint::ApiStatus => &self.api_status,
            Endpoint::Healthz => &self.healthz,
            Endpoint::ApiMetrics => &self.api_metrics,
            Endpoint::Dashboard => &self.dashboard,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn endpoints(&self) -> EndpointCounts {
        EndpointCounts {
            api_status: self.api_status.load(Ordering::Relaxed),
            healthz: self.healthz.load(Ordering::Relaxed),
            api_metrics: self.api_metrics.load(Ordering::Relaxed),
            dashboard: self.dashboard.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let counters = RequestCounters::new();
        assert_eq!(counters.total(), 0);
        assert_eq!(counters.endpoints(), EndpointCounts::default());
    }

    #[test]
    fn record_request_returns_running_total() {
        let counters = RequestCounters::new();
        assert_eq!(counters.record_request(), 1);
        assert_eq!(counters.record_request(), 2);
        assert_eq!(counters.total(), 2);
    }

    #[test]
    fn hits_are_tracked_per_endpoint() {
        let counters = RequestCounters::new();
        counters.hit(Endpoint::Healthz);
        counters.hit(Endpoint::Healthz);
        counters.hit(Endpoint::Dashboard);

        let endpoints = counters.endpoints();
        assert_eq!(endpoints.healthz, 2);
        assert_eq!(endpoints.dashboard, 1);
        assert_eq!(endpoints.api_status, 0);
        assert_eq!(endpoints.api_metrics, 0);
        // endpoint hits do not touch the request total
        assert_eq!(counters.total(), 0);
    }
}
