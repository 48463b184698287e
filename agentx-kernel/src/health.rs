use crate::registry::ConnectionRegistry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub memory_usage_mb: f32,
    pub vehicles_connected: usize,
    pub dashboards_connected: usize,
    pub frames_received: u64,
    pub frames_skipped: u64,
    pub alerts_processed: u64,
    pub alert_failures: u64,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_skipped: AtomicU64,
    alerts_processed: AtomicU64,
    alert_failures: AtomicU64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn frame_received(&self) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_skipped(&self) {
        self.counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_processed(&self) {
        self.counters.alerts_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_failed(&self) {
        self.counters.alert_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, registry: &ConnectionRegistry) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            memory_usage_mb: get_memory_usage_mb(),
            vehicles_connected: registry.vehicle_count(),
            dashboards_connected: registry.dashboard_count(),
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_skipped: self.counters.frames_skipped.load(Ordering::Relaxed),
            alerts_processed: self.counters.alerts_processed.load(Ordering::Relaxed),
            alert_failures: self.counters.alert_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return (kb as f32) / 1024.0;
            }
        }
    }

    // pas de /proc : valeur inconnue
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Session;
    use tokio::sync::mpsc;

    #[test]
    fn test_counters_and_live_sessions() {
        let tracker = HealthTracker::new();
        let registry = ConnectionRegistry::new();
        registry.add(Session::dashboard(mpsc::channel(1).0));

        tracker.frame_received();
        tracker.frame_received();
        tracker.frame_skipped();
        tracker.alert_processed();
        tracker.alert_failed();

        let health = tracker.get_health(&registry);
        assert_eq!(health.frames_received, 2);
        assert_eq!(health.frames_skipped, 1);
        assert_eq!(health.alerts_processed, 1);
        assert_eq!(health.alert_failures, 1);
        assert_eq!(health.dashboards_connected, 1);
        assert_eq!(health.vehicles_connected, 0);
    }
}
