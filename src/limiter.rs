//! Sliding-window request throttle keyed by (route class, caller address).

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{self, Duration, Instant};

/// A named budget shared by every endpoint of the same operation class.
#[derive(Debug, Clone, Copy)]
pub struct RouteClass {
    pub name: &'static str,
    pub max: usize,
    pub window: Duration,
}

/// Join attempts are the most abusable surface.
pub const JOIN: RouteClass = RouteClass { name: "join", max: 10, window: Duration::from_secs(60) };
/// Passive reads: status polling and the waiting list.
pub const STATUS: RouteClass = RouteClass { name: "status", max: 60, window: Duration::from_secs(60) };
/// Host actions: admit, reject, promote, remove, room-ended.
pub const ADMIN: RouteClass = RouteClass { name: "admin", max: 30, window: Duration::from_secs(60) };

/// All classes share a 60s window; entries older than this are dead for
/// every class, which is what the sweep prunes against.
const SWEEP_HORIZON: Duration = Duration::from_secs(60);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Default)]
pub struct RateLimiter {
    hits: Arc<Mutex<HashMap<(&'static str, IpAddr), VecDeque<Instant>>>>,
}

impl RateLimiter {
    /// Admit or throttle one request. `Err` carries the suggested retry
    /// delay. A throttled request records nothing.
    pub async fn check(&self, class: RouteClass, addr: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let q = hits.entry((class.name, addr)).or_default();
        while q.front().is_some_and(|t| now.duration_since(*t) >= class.window) {
            q.pop_front();
        }
        if q.len() >= class.max {
            let retry = q
                .front()
                .map(|t| class.window.saturating_sub(now.duration_since(*t)))
                .unwrap_or(class.window);
            return Err(retry);
        }
        q.push_back(now);
        Ok(())
    }

    /// Drop keys whose windows have fully drained, bounding table growth
    /// from one-off callers.
    pub async fn sweep_once(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        hits.retain(|_, q| {
            while q.front().is_some_and(|t| now.duration_since(*t) >= SWEEP_HORIZON) {
                q.pop_front();
            }
            !q.is_empty()
        });
    }

    #[cfg(test)]
    async fn key_count(&self) -> usize {
        self.hits.lock().await.len()
    }
}

/* ---------------- background sweeper ---------------- */
pub async fn sweep(limiter: RateLimiter) {
    let mut tick = time::interval(SWEEP_INTERVAL);
    loop {
        tick.tick().await;
        limiter.sweep_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> IpAddr {
        "10.0.0.1".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn eleventh_join_in_window_is_throttled() {
        let limiter = RateLimiter::default();
        for _ in 0..JOIN.max {
            assert!(limiter.check(JOIN, caller()).await.is_ok());
        }
        let retry = limiter.check(JOIN, caller()).await.unwrap_err();
        assert!(retry <= JOIN.window);
    }

    #[tokio::test(start_paused = true)]
    async fn window_elapsing_restores_budget() {
        let limiter = RateLimiter::default();
        for _ in 0..JOIN.max {
            limiter.check(JOIN, caller()).await.ok();
        }
        assert!(limiter.check(JOIN, caller()).await.is_err());

        time::advance(JOIN.window + Duration::from_secs(1)).await;
        assert!(limiter.check(JOIN, caller()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn classes_and_callers_are_independent() {
        let limiter = RateLimiter::default();
        for _ in 0..JOIN.max {
            limiter.check(JOIN, caller()).await.ok();
        }
        assert!(limiter.check(JOIN, caller()).await.is_err());
        // same caller, different class
        assert!(limiter.check(STATUS, caller()).await.is_ok());
        // same class, different caller
        assert!(limiter.check(JOIN, "10.0.0.2".parse().unwrap()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_request_records_nothing() {
        let limiter = RateLimiter::default();
        for _ in 0..JOIN.max {
            limiter.check(JOIN, caller()).await.ok();
        }
        for _ in 0..5 {
            assert!(limiter.check(JOIN, caller()).await.is_err());
        }
        // throttled calls left no timestamps, so one window is enough
        time::advance(JOIN.window + Duration::from_secs(1)).await;
        assert!(limiter.check(JOIN, caller()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_drained_keys() {
        let limiter = RateLimiter::default();
        limiter.check(JOIN, caller()).await.ok();
        assert_eq!(limiter.key_count().await, 1);

        limiter.sweep_once().await;
        assert_eq!(limiter.key_count().await, 1);

        time::advance(SWEEP_HORIZON + Duration::from_secs(1)).await;
        limiter.sweep_once().await;
        assert_eq!(limiter.key_count().await, 0);
    }
}
