// SPDX-License-Identifier: MIT

//! Circuit breaker state: per-target failure accumulator that short-circuits
//! further calls after repeated failures.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

crate::simple_display! {
    BreakerStatus {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half_open",
    }
}

/// Configuration for a breaker instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub open_after: u32,
    pub reset_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { open_after: 5, reset_ms: 30_000 }
    }
}

/// Per-logical-target (tool name or plugin id) breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub status: BreakerStatus,
    pub consecutive_failures: u32,
    pub last_failure_at_ms: Option<u64>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self { status: BreakerStatus::Closed, consecutive_failures: 0, last_failure_at_ms: None }
    }
}

impl CircuitBreakerState {
    /// Whether a call should be admitted right now. Transitions `Open` to
    /// `HalfOpen` once the cooldown has elapsed, admitting exactly the next
    /// call, without mutating `status` until that call resolves.
    pub fn should_admit(&self, config: &BreakerConfig, now_ms: u64) -> bool {
        match self.status {
            BreakerStatus::Closed | BreakerStatus::HalfOpen => true,
            BreakerStatus::Open => match self.last_failure_at_ms {
                Some(last) => now_ms.saturating_sub(last) >= config.reset_ms,
                None => true,
            },
        }
    }

    /// The state the breaker should be considered in for `should_admit`
    /// purposes, materializing the `Open -> HalfOpen` cooldown transition.
    pub fn effective_status(&self, config: &BreakerConfig, now_ms: u64) -> BreakerStatus {
        if self.status == BreakerStatus::Open && self.should_admit(config, now_ms) {
            BreakerStatus::HalfOpen
        } else {
            self.status
        }
    }

    pub fn record_success(&mut self) {
        self.status = BreakerStatus::Closed;
        self.consecutive_failures = 0;
        self.last_failure_at_ms = None;
    }

    pub fn record_failure(&mut self, config: &BreakerConfig, now_ms: u64) {
        self.consecutive_failures += 1;
        self.last_failure_at_ms = Some(now_ms);
        if self.consecutive_failures >= config.open_after {
            self.status = BreakerStatus::Open;
        }
    }
}
