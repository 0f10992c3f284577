//! Request pacing utilities.
//!
//! [`RateLimiter`] serialises every outbound request of a client behind a
//! minimum interval, and [`BackoffPolicy`] computes the wait between
//! transport-level retries.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Enforces a minimum interval between consecutive grants.
///
/// The clock lives behind a fair mutex, so waiters are granted one at a time
/// in arrival order. A waiter that is cancelled while sleeping never records a
/// grant.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Build from a seconds value; negative or non-finite values disable throttling.
    pub fn from_secs_f64(seconds: f64) -> Self {
        let interval = if seconds.is_finite() && seconds > 0.0 {
            Duration::from_secs_f64(seconds)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspend until `interval` has elapsed since the previous grant.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut last = self.last_grant.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Wait schedule between transport retries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same wait before every retry.
    Fixed { delay_secs: f64 },
    /// `step * retry`, so 2s, 4s, 6s… for a 2s step.
    Linear { step_secs: f64 },
    /// `base * 2^(retry-1)`, capped at `max_secs`.
    Exponential {
        base_secs: f64,
        max_secs: f64,
        #[serde(default)]
        jitter: bool,
    },
}

impl BackoffPolicy {
    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let secs = match self {
            BackoffPolicy::Fixed { delay_secs } => *delay_secs,
            BackoffPolicy::Linear { step_secs } => step_secs * retry as f64,
            BackoffPolicy::Exponential {
                base_secs,
                max_secs,
                jitter,
            } => {
                let exp = retry.saturating_sub(1).min(30) as i32;
                let mut delay = (base_secs * 2f64.powi(exp)).min(*max_secs);
                if *jitter {
                    let spread = delay * 0.25;
                    delay += rand::random::<f64>() * spread - spread / 2.0;
                }
                delay
            }
        };

        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Linear { step_secs: 2.0 }
    }
}
