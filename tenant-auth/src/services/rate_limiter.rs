//! Sliding-window rate limiting keyed by caller identity (IP, email).

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `key` if it fits in the current window.
    fn allow(&self, key: &str) -> bool;

    fn reset(&self, key: &str);

    fn remaining(&self, key: &str) -> u32;

    /// When the oldest attempt leaves the window. `None` if the key has no attempts.
    fn reset_time(&self, key: &str) -> Option<Instant>;

    /// Whole seconds until another attempt may succeed, never below one.
    fn retry_after_secs(&self, key: &str) -> u64 {
        let wait = self
            .reset_time(key)
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        wait.as_secs_f64().ceil().max(1.0) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// 5 attempts per minute per IP.
    pub fn login() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// 1 request per 5 minutes per email.
    pub fn password_reset() -> Self {
        Self::new(1, Duration::from_secs(300))
    }
}

type Windows = DashMap<String, VecDeque<Instant>>;

/// In-process sliding-window limiter.
///
/// Each key's timestamps live behind its own map entry, so checks on
/// unrelated keys only meet on a shard lock for the duration of a prune. A
/// background task sweeps keys whose window has fully expired every `window`.
pub struct SlidingWindowLimiter {
    policy: RateLimitPolicy,
    windows: Arc<Windows>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SlidingWindowLimiter {
    /// Must be called inside a tokio runtime for the sweep to run.
    pub fn new(policy: RateLimitPolicy) -> Self {
        let windows: Arc<Windows> = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        let sweeper = match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(sweep_loop(
                windows.clone(),
                policy.window,
                cancel.clone(),
            ))),
            Err(_) => {
                tracing::warn!("Rate limiter created outside a tokio runtime; stale keys will not be swept");
                None
            }
        };

        Self {
            policy,
            windows,
            cancel,
            sweeper: Mutex::new(sweeper),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Rate limiter sweep task ended abnormally");
            }
        }
    }

    fn prune(window: &mut VecDeque<Instant>, cutoff: Option<Instant>) {
        let Some(cutoff) = cutoff else {
            return;
        };
        while window.front().is_some_and(|t| *t <= cutoff) {
            window.pop_front();
        }
    }

    fn cutoff(&self, now: Instant) -> Option<Instant> {
        now.checked_sub(self.policy.window)
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut window = self.windows.entry(key.to_string()).or_default();
        Self::prune(&mut window, self.cutoff(now));

        if window.len() < self.policy.max_requests as usize {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    fn remaining(&self, key: &str) -> u32 {
        let cutoff = self.cutoff(Instant::now());
        let used = self.windows.get_mut(key).map_or(0, |mut window| {
            Self::prune(&mut window, cutoff);
            window.len()
        });
        self.policy.max_requests.saturating_sub(used as u32)
    }

    fn reset_time(&self, key: &str) -> Option<Instant> {
        let cutoff = self.cutoff(Instant::now());
        let mut window = self.windows.get_mut(key)?;
        Self::prune(&mut window, cutoff);
        window.front().map(|oldest| *oldest + self.policy.window)
    }
}

impl Drop for SlidingWindowLimiter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sweep_loop(windows: Arc<Windows>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let before = windows.len();
                sweep(&windows, period);
                let evicted = before.saturating_sub(windows.len());
                if evicted > 0 {
                    tracing::debug!(evicted, "Swept expired rate limit keys");
                }
            }
        }
    }
}

fn sweep(windows: &Windows, period: Duration) {
    let cutoff = Instant::now().checked_sub(period);
    windows.retain(|_, window| {
        SlidingWindowLimiter::prune(window, cutoff);
        !window.is_empty()
    });
}
