//! Regional endpoint registry
//!
//! Tracks the configured endpoints, their health, and picks the best one for
//! new work. Each endpoint's record is an immutable snapshot behind an
//! `ArcSwap`; updates swap in a modified copy so readers never block.

use std::collections::HashMap;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::endpoint::address::EndpointAddress;
use crate::error::{BwsError, sanitize_message};
use crate::health::HealthState;

/// Default consecutive failures before an endpoint is marked unhealthy.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Successful calls slower than this mark the endpoint degraded.
pub const DEGRADED_LATENCY: Duration = Duration::from_millis(2000);

/// An endpoint and its region tag, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Parsed address
    pub address: EndpointAddress,
    /// Region tag
    pub region: String,
}

impl EndpointSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new(address: EndpointAddress, region: impl Into<String>) -> Self {
        Self {
            address,
            region: region.into(),
        }
    }
}

/// Health record of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointHealth {
    /// Normalized address
    pub address: String,
    /// Region tag
    pub region: String,
    /// Current verdict
    pub state: HealthState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Latest observed latency; `None` until the first success
    pub latency_ms: Option<u64>,
    /// Time of the last success
    pub last_success: Option<DateTime<Utc>>,
    /// Time of the last failure
    pub last_failure: Option<DateTime<Utc>>,
    /// Last failure message (sanitized)
    pub last_error: Option<String>,
}

impl EndpointHealth {
    fn new(spec: &EndpointSpec) -> Self {
        Self {
            address: spec.address.as_str().to_string(),
            region: spec.region.clone(),
            state: HealthState::Unknown,
            consecutive_failures: 0,
            latency_ms: None,
            last_success: None,
            last_failure: None,
            last_error: None,
        }
    }

    fn selection_key(&self, index: usize) -> (u8, u64, usize) {
        (
            self.state.rank(),
            self.latency_ms.unwrap_or(u64::MAX),
            index,
        )
    }
}

struct Entry {
    address: EndpointAddress,
    health: ArcSwap<EndpointHealth>,
}

/// Registry of regional endpoints. The first entry is the preferred region.
pub struct EndpointRegistry {
    entries: Vec<Entry>,
    failure_threshold: u32,
}

impl EndpointRegistry {
    /// Builds the registry from the preferred endpoint and ordered fallbacks.
    ///
    /// Duplicate addresses are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `failure_threshold` is zero.
    pub fn new(
        preferred: EndpointSpec,
        fallbacks: Vec<EndpointSpec>,
        failure_threshold: u32,
    ) -> Result<Self, BwsError> {
        if failure_threshold == 0 {
            return Err(BwsError::invalid_config(
                "endpoint failure threshold must be greater than 0",
            ));
        }

        let mut entries: Vec<Entry> = Vec::with_capacity(fallbacks.len() + 1);
        for spec in std::iter::once(preferred).chain(fallbacks) {
            if entries.iter().any(|e| e.address == spec.address) {
                warn!(endpoint = %spec.address, "Ignoring duplicate endpoint");
                continue;
            }
            entries.push(Entry {
                health: ArcSwap::from_pointee(EndpointHealth::new(&spec)),
                address: spec.address,
            });
        }

        Ok(Self {
            entries,
            failure_threshold,
        })
    }

    /// Picks the endpoint for new work.
    ///
    /// The preferred region wins unless it is unhealthy; otherwise the best
    /// healthy or degraded fallback; if everything is unhealthy, the endpoint
    /// whose last failure is oldest.
    #[must_use]
    pub fn select_endpoint(&self) -> EndpointAddress {
        let snapshots = self.snapshots();

        if snapshots[0].state != HealthState::Unhealthy {
            return self.entries[0].address.clone();
        }

        if let Some(index) = best_candidate(&snapshots, None) {
            return self.entries[index].address.clone();
        }

        let index = snapshots
            .iter()
            .enumerate()
            .min_by_key(|(i, h)| (h.last_failure, *i))
            .map_or(0, |(i, _)| i);
        debug!(
            endpoint = %self.entries[index].address,
            "All endpoints unhealthy, using least recently failed"
        );
        self.entries[index].address.clone()
    }

    /// Best endpoint other than `exclude` that is not unhealthy.
    #[must_use]
    pub fn select_alternate(&self, exclude: &str) -> Option<EndpointAddress> {
        let snapshots = self.snapshots();
        let excluded = self.index_of(exclude);
        best_candidate(&snapshots, excluded).map(|i| self.entries[i].address.clone())
    }

    /// Records a successful call.
    pub fn report_success(&self, address: &str, latency: Duration) {
        let Some(entry) = self.entry(address) else {
            debug!(endpoint = %address, "Success reported for unregistered endpoint");
            return;
        };

        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let state = if latency > DEGRADED_LATENCY {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        let now = Utc::now();

        let previous = entry.health.rcu(|current| {
            let mut next = EndpointHealth::clone(current);
            next.consecutive_failures = 0;
            next.latency_ms = Some(latency_ms);
            next.last_success = Some(now);
            next.state = state;
            next
        });

        if previous.state == HealthState::Unhealthy {
            info!(endpoint = %address, region = %previous.region, "Endpoint recovered");
        }
    }

    /// Records a failed call; past the threshold the endpoint turns unhealthy.
    pub fn report_failure(&self, address: &str, message: &str) {
        let Some(entry) = self.entry(address) else {
            debug!(endpoint = %address, "Failure reported for unregistered endpoint");
            return;
        };

        let threshold = self.failure_threshold;
        let now = Utc::now();
        let message = sanitize_message(message);

        let previous = entry.health.rcu(|current| {
            let mut next = EndpointHealth::clone(current);
            next.consecutive_failures = next.consecutive_failures.saturating_add(1);
            next.last_failure = Some(now);
            next.last_error = Some(message.clone());
            if next.consecutive_failures >= threshold {
                next.state = HealthState::Unhealthy;
            }
            next
        });

        if previous.state != HealthState::Unhealthy
            && previous.consecutive_failures.saturating_add(1) >= threshold
        {
            warn!(
                endpoint = %address,
                region = %previous.region,
                failures = previous.consecutive_failures.saturating_add(1),
                "Endpoint marked unhealthy"
            );
        }
    }

    /// Overrides the verdict of one endpoint (used by the health monitor).
    pub fn mark(&self, address: &str, state: HealthState) {
        if let Some(entry) = self.entry(address) {
            entry.health.rcu(|current| {
                let mut next = EndpointHealth::clone(current);
                next.state = state;
                next
            });
        }
    }

    /// Current health of every endpoint, keyed by address.
    #[must_use]
    pub fn health_snapshot(&self) -> HashMap<String, EndpointHealth> {
        self.entries
            .iter()
            .map(|e| (e.address.as_str().to_string(), EndpointHealth::clone(&e.health.load())))
            .collect()
    }

    /// Health of one endpoint.
    #[must_use]
    pub fn health_of(&self, address: &str) -> Option<EndpointHealth> {
        self.entry(address)
            .map(|e| EndpointHealth::clone(&e.health.load()))
    }

    /// Region tag of a registered endpoint.
    #[must_use]
    pub fn region_of(&self, address: &str) -> Option<String> {
        self.entry(address).map(|e| e.health.load().region.clone())
    }

    /// All registered endpoints, preferred first.
    #[must_use]
    pub fn endpoints(&self) -> Vec<EndpointAddress> {
        self.entries.iter().map(|e| e.address.clone()).collect()
    }

    /// The preferred endpoint.
    #[must_use]
    pub fn preferred(&self) -> &EndpointAddress {
        &self.entries[0].address
    }

    fn snapshots(&self) -> Vec<std::sync::Arc<EndpointHealth>> {
        self.entries.iter().map(|e| e.health.load_full()).collect()
    }

    fn index_of(&self, address: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.address.as_str() == address)
    }

    fn entry(&self, address: &str) -> Option<&Entry> {
        self.index_of(address).map(|i| &self.entries[i])
    }
}

fn best_candidate(
    snapshots: &[std::sync::Arc<EndpointHealth>],
    exclude: Option<usize>,
) -> Option<usize> {
    snapshots
        .iter()
        .enumerate()
        .filter(|(i, h)| Some(*i) != exclude && h.state != HealthState::Unhealthy)
        .min_by_key(|(i, h)| h.selection_key(*i))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(addr: &str, region: &str) -> EndpointSpec {
        EndpointSpec::new(EndpointAddress::parse(addr, true).unwrap(), region)
    }

    fn registry() -> EndpointRegistry {
        EndpointRegistry::new(
            spec("grpcs://eu.bws.test", "eu"),
            vec![spec("grpcs://us.bws.test", "us"), spec("grpcs://ap.bws.test", "ap")],
            3,
        )
        .unwrap()
    }

    const EU: &str = "grpcs://eu.bws.test:443";
    const US: &str = "grpcs://us.bws.test:443";
    const AP: &str = "grpcs://ap.bws.test:443";

    #[test]
    fn test_prefers_healthy_preferred_region() {
        let registry = registry();
        registry.report_success(EU, Duration::from_millis(300));
        registry.report_success(US, Duration::from_millis(20));
        assert_eq!(registry.select_endpoint().as_str(), EU);
    }

    #[test]
    fn test_fails_over_after_threshold() {
        let registry = registry();
        registry.report_success(US, Duration::from_millis(80));
        registry.report_success(AP, Duration::from_millis(40));

        registry.report_failure(EU, "unavailable");
        registry.report_failure(EU, "unavailable");
        assert_eq!(registry.select_endpoint().as_str(), EU);

        registry.report_failure(EU, "unavailable");
        assert_eq!(registry.health_of(EU).unwrap().state, HealthState::Unhealthy);
        assert_eq!(registry.select_endpoint().as_str(), AP);
    }

    #[test]
    fn test_success_resets_and_recovers() {
        let registry = registry();
        for _ in 0..3 {
            registry.report_failure(EU, "down");
        }
        registry.report_success(EU, Duration::from_millis(50));

        let health = registry.health_of(EU).unwrap();
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.state, HealthState::Healthy);
        assert_eq!(registry.select_endpoint().as_str(), EU);
    }

    #[test]
    fn test_slow_success_is_degraded() {
        let registry = registry();
        registry.report_success(US, Duration::from_millis(2500));
        assert_eq!(registry.health_of(US).unwrap().state, HealthState::Degraded);
    }

    #[test]
    fn test_all_unhealthy_returns_least_recently_failed() {
        let registry = registry();
        for addr in [US, EU, AP] {
            for _ in 0..3 {
                registry.report_failure(addr, "down");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(registry.select_endpoint().as_str(), US);
    }

    #[test]
    fn test_select_alternate_excludes_current() {
        let registry = registry();
        registry.report_success(EU, Duration::from_millis(10));
        registry.report_success(US, Duration::from_millis(90));
        registry.report_success(AP, Duration::from_millis(30));

        assert_eq!(registry.select_alternate(EU).unwrap().as_str(), AP);
        registry.mark(AP, HealthState::Unhealthy);
        assert_eq!(registry.select_alternate(EU).unwrap().as_str(), US);
    }

    #[test]
    fn test_duplicates_ignored_and_zero_threshold_rejected() {
        let registry = EndpointRegistry::new(
            spec("grpcs://eu.bws.test", "eu"),
            vec![spec("eu.bws.test:443", "dup")],
            3,
        )
        .unwrap();
        assert_eq!(registry.endpoints().len(), 1);

        assert!(EndpointRegistry::new(spec("grpcs://eu.bws.test", "eu"), vec![], 0).is_err());
    }

    #[test]
    fn test_failure_message_sanitized() {
        let registry = registry();
        registry.report_failure(EU, "Bearer eyJhbGciOi.leaked");
        assert_eq!(
            registry.health_of(EU).unwrap().last_error.as_deref(),
            Some("Details redacted")
        );
    }
}
