use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            enabled,
        }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action budgets derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub message_limit: usize,
    pub message_window: Duration,
    pub notice_limit: usize,
    pub notice_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn dur_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default),
            )
        }
        Self {
            message_limit: usize_env("RL_MESSAGE_LIMIT", 30),
            message_window: dur_env("RL_MESSAGE_WINDOW", 60),
            notice_limit: usize_env("RL_NOTICE_LIMIT", 5),
            notice_window: dur_env("RL_NOTICE_WINDOW", 3600),
        }
    }
}

/// High level guard used by handlers; keys are sender ids.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }
    pub fn allow_message(&self, sender: &str) -> bool {
        self.limiter.check(
            &format!("message:{sender}"),
            self.cfg.message_limit,
            self.cfg.message_window,
        )
    }
    pub fn allow_notice(&self, sender: &str) -> bool {
        self.limiter.check(
            &format!("notice:{sender}"),
            self.cfg.notice_limit,
            self.cfg.notice_window,
        )
    }
}
