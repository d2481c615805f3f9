//! Sliding-window rate limiting for admission steps.
//!
//! Three independent categories, each with its own window length and attempt
//! budget. Windows are per-principal timestamp lists, pruned on every access,
//! in-memory only: a restart clears all limits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::PrincipalId;
use crate::clock::Clock;

/// Rate categories with independent windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateCategory {
    GateSecret,
    SecondFactor,
    GeneralRequest,
}

impl RateCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GateSecret => "gate-secret",
            Self::SecondFactor => "second-factor",
            Self::GeneralRequest => "general-request",
        }
    }
}

/// Window length (seconds) and attempt budget per category.
#[derive(Clone, Copy, Debug)]
pub struct RateLimits {
    gate_secret_window: i64,
    gate_secret_max: usize,
    second_factor_window: i64,
    second_factor_max: usize,
    general_window: i64,
    general_max: usize,
}

impl RateLimits {
    /// Defaults: gate-secret 5 per 300s, second-factor 3 per 180s,
    /// general requests 10 per 60s.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            gate_secret_window: 300,
            gate_secret_max: 5,
            second_factor_window: 180,
            second_factor_max: 3,
            general_window: 60,
            general_max: 10,
        }
    }

    #[must_use]
    pub const fn with_gate_secret(mut self, window_seconds: i64, max_attempts: usize) -> Self {
        self.gate_secret_window = window_seconds;
        self.gate_secret_max = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_second_factor(mut self, window_seconds: i64, max_attempts: usize) -> Self {
        self.second_factor_window = window_seconds;
        self.second_factor_max = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_general(mut self, window_seconds: i64, max_requests: usize) -> Self {
        self.general_window = window_seconds;
        self.general_max = max_requests;
        self
    }

    const fn for_category(&self, category: RateCategory) -> (i64, usize) {
        match category {
            RateCategory::GateSecret => (self.gate_secret_window, self.gate_secret_max),
            RateCategory::SecondFactor => (self.second_factor_window, self.second_factor_max),
            RateCategory::GeneralRequest => (self.general_window, self.general_max),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a rate check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// The attempt was recorded; `remaining` is the quota left in the window.
    Allowed { remaining: usize },
    /// Denied; the window frees up after `retry_after_seconds`.
    Limited { retry_after_seconds: i64 },
}

/// Per-principal, per-category sliding-window attempt counters.
pub struct RateLimiter {
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<(PrincipalId, RateCategory), Vec<i64>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Prune the window, then either record the attempt or deny it.
    pub fn check(&self, principal: PrincipalId, category: RateCategory) -> RateDecision {
        let (window, max) = self.limits.for_category(category);
        let now = self.clock.now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let attempts = windows.entry((principal, category)).or_default();
        attempts.retain(|&at| now - at < window);

        if attempts.len() >= max {
            let oldest = attempts.iter().copied().min().unwrap_or(now);
            let retry_after_seconds = (window - (now - oldest)).max(0);
            warn!(
                principal,
                category = category.as_str(),
                retry_after_seconds,
                "rate limit exceeded"
            );
            return RateDecision::Limited {
                retry_after_seconds,
            };
        }

        attempts.push(now);
        RateDecision::Allowed {
            remaining: max - attempts.len(),
        }
    }

    /// Forget all recorded attempts for one principal and category.
    ///
    /// Used after a successful gate-secret match so earlier failures stop
    /// penalizing a user who got it right.
    pub fn reset(&self, principal: PrincipalId, category: RateCategory) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        windows.remove(&(principal, category));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(RateLimits::new(), clock)
    }

    #[test]
    fn denies_after_budget_within_window() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = limiter(clock.clone());

        for expected_remaining in (0..5).rev() {
            assert_eq!(
                limiter.check(1, RateCategory::GateSecret),
                RateDecision::Allowed {
                    remaining: expected_remaining
                }
            );
        }
        assert!(matches!(
            limiter.check(1, RateCategory::GateSecret),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn window_elapse_frees_quota() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = limiter(clock.clone());

        for _ in 0..5 {
            limiter.check(1, RateCategory::GateSecret);
        }
        assert!(matches!(
            limiter.check(1, RateCategory::GateSecret),
            RateDecision::Limited { .. }
        ));

        clock.advance(300);
        assert!(matches!(
            limiter.check(1, RateCategory::GateSecret),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn retry_after_counts_down_from_oldest_attempt() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = limiter(clock.clone());

        for _ in 0..5 {
            limiter.check(1, RateCategory::GateSecret);
        }
        clock.advance(100);
        assert_eq!(
            limiter.check(1, RateCategory::GateSecret),
            RateDecision::Limited {
                retry_after_seconds: 200
            }
        );
    }

    #[test]
    fn categories_and_principals_are_independent() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = limiter(clock);

        for _ in 0..3 {
            limiter.check(1, RateCategory::SecondFactor);
        }
        assert!(matches!(
            limiter.check(1, RateCategory::SecondFactor),
            RateDecision::Limited { .. }
        ));
        // Same principal, other category still has quota.
        assert!(matches!(
            limiter.check(1, RateCategory::GateSecret),
            RateDecision::Allowed { .. }
        ));
        // Other principal, same category still has quota.
        assert!(matches!(
            limiter.check(2, RateCategory::SecondFactor),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn reset_clears_one_category_only() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = limiter(clock);

        for _ in 0..5 {
            limiter.check(1, RateCategory::GateSecret);
        }
        for _ in 0..10 {
            limiter.check(1, RateCategory::GeneralRequest);
        }
        limiter.reset(1, RateCategory::GateSecret);

        assert!(matches!(
            limiter.check(1, RateCategory::GateSecret),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check(1, RateCategory::GeneralRequest),
            RateDecision::Limited { .. }
        ));
    }
}
