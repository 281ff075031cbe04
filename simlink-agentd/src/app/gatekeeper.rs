use crate::config::SecurityConfig;
use crate::error::{CoreError, CoreResult};
use crate::telemetry::BridgeMetrics;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

#[derive(Clone, Debug)]
pub struct AdmissionPolicy {
    pub enable_rate_limiting: bool,
    pub requests_per_minute: u32,
    pub max_request_size: usize,
}

impl From<&SecurityConfig> for AdmissionPolicy {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            enable_rate_limiting: config.enable_rate_limiting,
            requests_per_minute: config.requests_per_minute,
            max_request_size: config.max_request_size_bytes,
        }
    }
}

/// Per-caller admission control, consulted before any session lookup or
/// dispatch.
pub struct Gatekeeper {
    limiter: Option<KeyedLimiter>,
    max_request_size: usize,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl Gatekeeper {
    pub fn new(policy: &AdmissionPolicy, metrics: Option<Arc<BridgeMetrics>>) -> Self {
        let limiter = if policy.enable_rate_limiting {
            NonZeroU32::new(policy.requests_per_minute)
                .map(|rpm| RateLimiter::keyed(Quota::per_minute(rpm)))
        } else {
            None
        };
        Self {
            limiter,
            max_request_size: policy.max_request_size,
            metrics,
        }
    }

    pub fn admit(&self, caller: &str, payload_len: usize) -> CoreResult<()> {
        if payload_len > self.max_request_size {
            return Err(CoreError::invalid(format!(
                "request of {payload_len} bytes exceeds limit of {} bytes",
                self.max_request_size
            )));
        }
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        if limiter.check_key(&caller.to_string()).is_err() {
            debug!(caller, "rate limit exceeded");
            if let Some(metrics) = &self.metrics {
                metrics.record_rate_limited();
            }
            return Err(CoreError::RateLimitExceeded(format!(
                "too many requests from {caller}"
            )));
        }
        Ok(())
    }

    /// Forgets callers whose buckets have fully refilled.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
        }
    }

    pub fn tracked_callers(&self) -> usize {
        self.limiter.as_ref().map(|limiter| limiter.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(rpm: u32) -> AdmissionPolicy {
        AdmissionPolicy {
            enable_rate_limiting: true,
            requests_per_minute: rpm,
            max_request_size: 1024,
        }
    }

    #[test]
    fn limits_each_caller_independently() {
        let gate = Gatekeeper::new(&policy(3), None);
        for _ in 0..3 {
            gate.admit("bot1", 10).unwrap();
        }
        assert!(matches!(
            gate.admit("bot1", 10),
            Err(CoreError::RateLimitExceeded(_))
        ));
        gate.admit("bot2", 10).unwrap();
        assert_eq!(gate.tracked_callers(), 2);
    }

    #[test]
    fn oversized_payload_rejected_before_counting() {
        let gate = Gatekeeper::new(&policy(1), None);
        assert!(matches!(
            gate.admit("bot1", 4096),
            Err(CoreError::InvalidArgument(_))
        ));
        gate.admit("bot1", 1024).unwrap();
    }

    #[test]
    fn disabled_limiting_still_checks_size() {
        let gate = Gatekeeper::new(
            &AdmissionPolicy {
                enable_rate_limiting: false,
                ..policy(1)
            },
            None,
        );
        for _ in 0..100 {
            gate.admit("bot1", 1).unwrap();
        }
        assert!(gate.admit("bot1", 2048).is_err());
        assert_eq!(gate.tracked_callers(), 0);
        gate.prune();
    }
}
