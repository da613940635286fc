//! Rate limiting primitives for auth flows.
//!
//! Two independent fixed-window policies guard the credential endpoints:
//! one keyed by client address (3 attempts / 10 minutes, CAPTCHA-bypassable),
//! one keyed by address + case-folded username (5 attempts / 10 minutes).
//! Windows live in process memory; they damp abuse per instance and carry no
//! correctness-bearing state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(10 * 60);
const IP_ATTEMPT_LIMIT: u32 = 3;
const LOGIN_ATTEMPT_LIMIT: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// Register and check an attempt for a client address.
    fn check_ip(&self, ip: Option<&str>) -> RateLimitDecision;
    /// Register and check a login attempt for an address + username pair.
    fn check_credentials(&self, ip: Option<&str>, username: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_credentials(&self, _ip: Option<&str>, _username: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

#[derive(Debug)]
struct FixedWindowPolicy {
    window: Duration,
    limit: u32,
    hits: Mutex<HashMap<String, Window>>,
}

impl FixedWindowPolicy {
    fn new(window: Duration, limit: u32) -> Self {
        Self {
            window,
            limit,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Count this attempt against `key` and decide.
    fn check(&self, key: &str) -> RateLimitDecision {
        let Ok(mut hits) = self.hits.lock() else {
            // A poisoned lock means a panic elsewhere; fail open for liveness.
            return RateLimitDecision::Allowed;
        };
        hits.retain(|_, window| window.started_at.elapsed() < self.window);

        let window = hits.entry(key.to_string()).or_insert(Window {
            started_at: Instant::now(),
            count: 0,
        });
        if window.count >= self.limit {
            return RateLimitDecision::Limited;
        }
        window.count += 1;
        RateLimitDecision::Allowed
    }
}

/// In-memory fixed-window limiter with the production ceilings.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    ip_policy: FixedWindowPolicy,
    login_policy: FixedWindowPolicy,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(WINDOW, IP_ATTEMPT_LIMIT, LOGIN_ATTEMPT_LIMIT)
    }

    #[must_use]
    pub fn with_limits(window: Duration, ip_limit: u32, login_limit: u32) -> Self {
        Self {
            ip_policy: FixedWindowPolicy::new(window, ip_limit),
            login_policy: FixedWindowPolicy::new(window, login_limit),
        }
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_ip(&self, ip: Option<&str>) -> RateLimitDecision {
        // Requests without a resolvable address share one bucket.
        self.ip_policy.check(ip.unwrap_or("unknown"))
    }

    fn check_credentials(&self, ip: Option<&str>, username: &str) -> RateLimitDecision {
        let key = format!("{}|{}", ip.unwrap_or("unknown"), username.to_lowercase());
        self.login_policy.check(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(limiter.check_ip(None), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.check_credentials(None, "alice"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn ip_policy_limits_after_ceiling() {
        let limiter = FixedWindowLimiter::with_limits(Duration::from_secs(600), 3, 5);
        for _ in 0..3 {
            assert_eq!(
                limiter.check_ip(Some("1.2.3.4")),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4")),
            RateLimitDecision::Limited
        );
        // A different address is unaffected.
        assert_eq!(
            limiter.check_ip(Some("5.6.7.8")),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn login_policy_is_keyed_by_ip_and_username() {
        let limiter = FixedWindowLimiter::with_limits(Duration::from_secs(600), 100, 5);
        for _ in 0..5 {
            assert_eq!(
                limiter.check_credentials(Some("1.2.3.4"), "alice"),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_credentials(Some("1.2.3.4"), "alice"),
            RateLimitDecision::Limited
        );
        // Same address, different username: separate bucket.
        assert_eq!(
            limiter.check_credentials(Some("1.2.3.4"), "bob"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn login_policy_case_folds_username() {
        let limiter = FixedWindowLimiter::with_limits(Duration::from_secs(600), 100, 2);
        assert_eq!(
            limiter.check_credentials(Some("1.2.3.4"), "Alice"),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_credentials(Some("1.2.3.4"), "ALICE"),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_credentials(Some("1.2.3.4"), "alice"),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::with_limits(Duration::from_millis(20), 1, 1);
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4")),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4")),
            RateLimitDecision::Limited
        );
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4")),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn missing_address_shares_one_bucket() {
        let limiter = FixedWindowLimiter::with_limits(Duration::from_secs(600), 2, 5);
        assert_eq!(limiter.check_ip(None), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip(None), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip(None), RateLimitDecision::Limited);
    }
}
