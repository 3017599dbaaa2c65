use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Key shared by every request that arrives without a client IP header.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: Instant,
}

/// Fixed-window counter per client, reset lazily on the first request after
/// the window ends.
///
/// Denied requests still increment the counter, so a client that keeps
/// hammering the endpoint gets nothing back until `reset_at` passes.
pub struct RateLimiter {
    window: Duration,
    max_count: u32,
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(max_count: u32, window: Duration) -> Self {
        Self {
            window,
            max_count,
            entries: DashMap::new(),
        }
    }

    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    /// Records a request from `client` at `now` and returns whether it is allowed.
    ///
    /// The shard guard is held for the whole read-modify-write, so two
    /// concurrent requests from one client cannot both see a stale count.
    pub fn check_at(&self, client: &str, now: Instant) -> bool {
        let fresh = RateLimitEntry {
            count: 1,
            reset_at: now + self.window,
        };

        match self.entries.entry(client.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.reset_at <= now {
                    *entry = fresh;
                    return true;
                }
                entry.count = entry.count.saturating_add(1);
                entry.count <= self.max_count
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, client: &str) -> Option<RateLimitEntry> {
        self.entries.get(client).map(|e| *e)
    }

    /// Drops entries whose window has ended. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new(10, WINDOW);
        let start = Instant::now();

        for i in 0..10 {
            let now = start + Duration::from_secs(i * 5);
            assert!(limiter.check_at("1.2.3.4", now), "request {} denied", i + 1);
        }
        assert_eq!(limiter.get("1.2.3.4").unwrap().count, 10);
    }

    #[test]
    fn test_denies_eleventh_and_keeps_counting() {
        let limiter = RateLimiter::new(10, WINDOW);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_at("1.2.3.4", start));
        }
        assert!(!limiter.check_at("1.2.3.4", start + Duration::from_secs(1)));
        assert!(!limiter.check_at("1.2.3.4", start + Duration::from_secs(30)));
        assert!(!limiter.check_at("1.2.3.4", start + Duration::from_millis(59_999)));

        let entry = limiter.get("1.2.3.4").unwrap();
        assert_eq!(entry.count, 13);
        assert_eq!(entry.reset_at, start + WINDOW);
    }

    #[test]
    fn test_window_reset_starts_fresh() {
        let limiter = RateLimiter::new(10, WINDOW);
        let start = Instant::now();

        for _ in 0..15 {
            limiter.check_at("1.2.3.4", start);
        }

        let later = start + WINDOW;
        assert!(limiter.check_at("1.2.3.4", later));

        let entry = limiter.get("1.2.3.4").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_at, later + WINDOW);
    }

    #[test]
    fn test_first_request_creates_entry() {
        let limiter = RateLimiter::new(10, WINDOW);
        let now = Instant::now();

        assert!(limiter.get("5.6.7.8").is_none());
        assert!(limiter.check_at("5.6.7.8", now));

        let entry = limiter.get("5.6.7.8").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_at, now + WINDOW);
    }

    #[test]
    fn test_second_request_at_same_instant_counts() {
        let limiter = RateLimiter::new(1, WINDOW);
        let now = Instant::now();

        assert!(limiter.check_at("a", now));
        assert!(!limiter.check_at("a", now));
        assert_eq!(limiter.get("a").unwrap().count, 2);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(10, WINDOW);
        let now = Instant::now();

        for _ in 0..12 {
            limiter.check_at("1.1.1.1", now);
        }
        assert!(!limiter.check_at("1.1.1.1", now));
        assert!(limiter.check_at("2.2.2.2", now));
        assert!(limiter.check_at(UNKNOWN_CLIENT, now));
        assert_eq!(limiter.get("2.2.2.2").unwrap().count, 1);
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn test_sweep_drops_only_expired() {
        let limiter = RateLimiter::new(10, WINDOW);
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("new", start + Duration::from_secs(30));

        assert_eq!(limiter.sweep(start + Duration::from_secs(59)), 0);
        assert_eq!(limiter.sweep(start + WINDOW), 1);
        assert!(limiter.get("old").is_none());
        assert!(limiter.get("new").is_some());
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        use std::sync::Arc;
        use std::thread;

        let limiter = Arc::new(RateLimiter::new(10, WINDOW));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || (0..25).filter(|_| limiter.check_at("shared", now)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
        assert_eq!(limiter.get("shared").unwrap().count, 200);
    }
}
