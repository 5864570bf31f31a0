//! Host reachability tracking.
//!
//! One process-wide `HealthState`, written by the periodic probe and by
//! fetch outcomes, read by the coordinator to short-circuit fetches when
//! the host is known-unreachable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::Transport;

#[derive(Debug, Clone)]
pub struct HealthState {
    pub is_reachable: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for HealthState {
    fn default() -> Self {
        // Optimistic until the first probe; blocking every fetch on an
        // initial probe would add a round trip to cold start.
        Self {
            is_reachable: true,
            last_checked_at: None,
        }
    }
}

#[derive(Default)]
pub struct HealthMonitor {
    state: RwLock<HealthState>,
    /// At most one probe in flight, ever.
    probing: AtomicBool,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reachable(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_reachable
    }

    pub fn snapshot(&self) -> HealthState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Any successful round trip is positive reachability evidence.
    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.is_reachable {
            info!("Host reachable again");
        }
        state.is_reachable = true;
        state.last_checked_at = Some(Utc::now());
    }

    pub fn record_failure(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.is_reachable {
            warn!("Host unreachable, fetches will serve cache until the next successful probe");
        }
        state.is_reachable = false;
        state.last_checked_at = Some(Utc::now());
    }

    /// Run one reachability probe. If another probe is already in flight
    /// the call is a no-op returning the current state.
    pub async fn probe<T: Transport>(&self, transport: &T) -> bool {
        if self
            .probing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Probe already in flight, skipping");
            return self.is_reachable();
        }

        let result = transport.probe().await;
        match &result {
            Ok(()) => self.record_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                self.record_failure();
            }
        }
        self.probing.store(false, Ordering::Release);
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchOutcome, FetchRequest, TransportError};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Probe counter with a configurable delay and outcome.
    struct ProbeTransport {
        calls: AtomicUsize,
        delay_ms: u64,
        healthy: bool,
    }

    impl Transport for ProbeTransport {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutcome, TransportError> {
            unreachable!("health tests never fetch")
        }

        async fn probe(&self) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            if self.healthy {
                Ok(())
            } else {
                Err(TransportError::Network("probe down".into()))
            }
        }
    }

    #[tokio::test]
    async fn test_probe_updates_state() {
        let monitor = HealthMonitor::new();
        let down = ProbeTransport {
            calls: AtomicUsize::new(0),
            delay_ms: 0,
            healthy: false,
        };
        assert!(!monitor.probe(&down).await);
        assert!(!monitor.is_reachable());
        assert!(monitor.snapshot().last_checked_at.is_some());

        let up = ProbeTransport {
            calls: AtomicUsize::new(0),
            delay_ms: 0,
            healthy: true,
        };
        assert!(monitor.probe(&up).await);
        assert!(monitor.is_reachable());
    }

    #[tokio::test]
    async fn test_at_most_one_probe_in_flight() {
        let monitor = Arc::new(HealthMonitor::new());
        let transport = Arc::new(ProbeTransport {
            calls: AtomicUsize::new(0),
            delay_ms: 50,
            healthy: true,
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let monitor = Arc::clone(&monitor);
            let transport = Arc::clone(&transport);
            handles.push(tokio::spawn(async move {
                monitor.probe(&*transport).await;
            }));
        }
        for handle in handles {
            handle.await.expect("probe task");
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
