use crate::config::RateLimitConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Limited { retry_after_secs: u64 },
}

#[derive(Debug)]
struct Window {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

/// Rolling-window limiter on OTP issuance, keyed by identifier (email or phone).
///
/// Each identifier keeps the instants of its recent issuances. A check drops
/// instants older than the window, denies when `max_requests` remain, and
/// otherwise records the new issuance. Check and record happen under one lock so
/// concurrent requests for the same identifier cannot both take the last slot.
/// The table holds at most `capacity` identifiers; when full, the identifier
/// seen least recently is evicted.
#[derive(Debug)]
pub struct OtpRateLimiter {
    max_requests: usize,
    window: Duration,
    capacity: usize,
    cleanup_interval: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl OtpRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests as usize,
            window: Duration::from_secs(config.window_minutes.max(1) * 60),
            capacity: config.capacity.max(1),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds.max(1)),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let cleanup_interval = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                let removed = self.purge_expired(Instant::now()).await;
                if removed > 0 {
                    debug!(removed, "purged idle rate limit windows");
                }
            }
        });
    }

    pub async fn check_and_record(&self, identifier: &str) -> RateLimitDecision {
        self.check_and_record_at(identifier, Instant::now()).await
    }

    pub async fn check_and_record_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().await;

        if !windows.contains_key(identifier) && windows.len() >= self.capacity {
            evict_least_recent(&mut windows);
        }

        let window = windows.entry(identifier.to_string()).or_insert_with(|| Window {
            hits: VecDeque::new(),
            last_seen: now,
        });
        window.last_seen = now;

        while let Some(oldest) = window.hits.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                window.hits.pop_front();
            } else {
                break;
            }
        }

        if window.hits.len() >= self.max_requests {
            let retry_after = window
                .hits
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            let retry_after_secs = ceil_secs(retry_after).max(1);
            warn!(identifier = %identifier, retry_after_secs, "OTP rate limit exceeded");
            return RateLimitDecision::Limited { retry_after_secs };
        }

        window.hits.push_back(now);
        RateLimitDecision::Allow
    }

    async fn purge_expired(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        let ttl = self.window;
        windows.retain(|_, window| now.saturating_duration_since(window.last_seen) < ttl);
        before - windows.len()
    }
}

fn evict_least_recent(windows: &mut HashMap<String, Window>) {
    let oldest = windows.iter().min_by_key(|(_, window)| window.last_seen).map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        windows.remove(&key);
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}
