// src/llm/circuit_breaker.rs
// Skips a primary provider that keeps failing, so turns go straight to the
// fallback for a cooldown period.

use crate::llm::provider::Provider;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Trip thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Failures inside `window` that open the circuit
    pub threshold: usize,
    pub window: Duration,
    /// Time an open circuit waits before letting one probe through
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::from_secs(5 * 60),
            cooldown: Duration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct Health {
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// Start of the in-flight probe. A probe whose caller went away without
    /// reporting frees its slot after one cooldown.
    probe_started: Option<Instant>,
}

/// Per-provider failure tracking, shared by clones
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    health: Arc<Mutex<HashMap<Provider, Health>>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: BreakerSettings) -> Self {
        Self {
            settings,
            health: Arc::default(),
        }
    }

    /// Whether the provider should be called now. An expired open circuit
    /// admits exactly one probe; later callers wait for its result, or for the
    /// probe slot to expire.
    pub fn is_available(&self, provider: Provider) -> bool {
        self.is_available_at(provider, Instant::now())
    }

    fn is_available_at(&self, provider: Provider, now: Instant) -> bool {
        // A poisoned lock never blocks calls
        let Ok(mut health) = self.health.lock() else {
            return true;
        };
        let h = health.entry(provider).or_default();

        let cooldown = self.settings.cooldown;
        let Some(opened) = h.opened_at else {
            return true;
        };

        let ready = match h.probe_started {
            Some(started) if now.duration_since(started) < cooldown => false,
            Some(_) => {
                warn!(provider = %provider, "Half-open call never reported back, allowing another");
                true
            }
            None => now.duration_since(opened) >= cooldown,
        };
        if ready {
            info!(provider = %provider, "Cooldown over, sending a probe");
            h.probe_started = Some(now);
        }
        ready
    }

    pub fn record_success(&self, provider: Provider) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        let h = health.entry(provider).or_default();
        if h.opened_at.is_some() {
            info!(provider = %provider, "Provider recovered, circuit closed");
        }
        *h = Health::default();
    }

    /// Count one failed call (after its retries)
    pub fn record_failure(&self, provider: Provider) {
        self.record_failure_at(provider, Instant::now());
    }

    fn record_failure_at(&self, provider: Provider, now: Instant) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        let h = health.entry(provider).or_default();

        if h.probe_started.take().is_some() {
            warn!(provider = %provider, "Probe failed, circuit stays open");
            h.opened_at = Some(now);
            return;
        }
        if h.opened_at.is_some() {
            return;
        }

        h.failures.push_back(now);
        while h
            .failures
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.settings.window)
        {
            h.failures.pop_front();
        }

        if h.failures.len() >= self.settings.threshold {
            warn!(
                provider = %provider,
                failures = h.failures.len(),
                cooldown_secs = self.settings.cooldown.as_secs(),
                "Circuit opened"
            );
            h.failures.clear();
            h.opened_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tripped(cb: &CircuitBreaker, at: Instant) {
        for _ in 0..cb.settings.threshold {
            cb.record_failure_at(Provider::Gemini, at);
        }
    }

    #[test]
    fn test_fresh_provider_is_available() {
        assert!(CircuitBreaker::new().is_available(Provider::Gemini));
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = CircuitBreaker::new();
        cb.record_failure(Provider::Gemini);
        cb.record_failure(Provider::Gemini);
        assert!(cb.is_available(Provider::Gemini));
        cb.record_failure(Provider::Gemini);
        assert!(!cb.is_available(Provider::Gemini));
        assert!(cb.is_available(Provider::DeepSeek));
    }

    #[test]
    fn test_old_failures_fall_out_of_window() {
        let cb = CircuitBreaker::new();
        let start = Instant::now();
        cb.record_failure_at(Provider::Gemini, start);
        cb.record_failure_at(Provider::Gemini, start);
        cb.record_failure_at(Provider::Gemini, start + Duration::from_secs(6 * 60));
        assert!(cb.is_available_at(Provider::Gemini, start + Duration::from_secs(6 * 60)));
    }

    #[test]
    fn test_success_clears_failures() {
        let cb = CircuitBreaker::new();
        cb.record_failure(Provider::Gemini);
        cb.record_failure(Provider::Gemini);
        cb.record_success(Provider::Gemini);
        cb.record_failure(Provider::Gemini);
        assert!(cb.is_available(Provider::Gemini));
    }

    #[test]
    fn test_single_probe_after_cooldown() {
        let cb = CircuitBreaker::new();
        let start = Instant::now();
        tripped(&cb, start);

        let later = start + Duration::from_secs(121);
        assert!(cb.is_available_at(Provider::Gemini, later));
        assert!(!cb.is_available_at(Provider::Gemini, later));
    }

    #[test]
    fn test_probe_outcome() {
        let cb = CircuitBreaker::with_settings(BreakerSettings {
            threshold: 1,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(10),
        });
        let start = Instant::now();
        tripped(&cb, start);

        // Failed probe reopens from the probe time
        let probe = start + Duration::from_secs(11);
        assert!(cb.is_available_at(Provider::Gemini, probe));
        cb.record_failure_at(Provider::Gemini, probe);
        assert!(!cb.is_available_at(Provider::Gemini, probe + Duration::from_secs(5)));

        // Successful probe closes it
        let next = probe + Duration::from_secs(11);
        assert!(cb.is_available_at(Provider::Gemini, next));
        cb.record_success(Provider::Gemini);
        assert!(cb.is_available_at(Provider::Gemini, next));
        assert!(cb.is_available_at(Provider::Gemini, next));
    }

    #[test]
    fn test_abandoned_half_open_slot_expires() {
        let cb = CircuitBreaker::new();
        let start = Instant::now();
        tripped(&cb, start);

        // Half-open call admitted, then its caller is dropped without recording anything
        let probe = start + Duration::from_secs(121);
        assert!(cb.is_available_at(Provider::Gemini, probe));
        assert!(!cb.is_available_at(Provider::Gemini, probe + Duration::from_secs(60)));

        let retry = probe + Duration::from_secs(121);
        assert!(cb.is_available_at(Provider::Gemini, retry));
        assert!(!cb.is_available_at(Provider::Gemini, retry));

        cb.record_success(Provider::Gemini);
        assert!(cb.is_available_at(Provider::Gemini, retry));
    }
}
