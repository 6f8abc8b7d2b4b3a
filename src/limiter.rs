use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Fixed-window rate limiter for password-reset requests, keyed by email.
///
/// State is in-memory and process-local: restarting the server resets
/// the windows.
pub struct RateLimiter {
    window: Duration,
    hits: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `key`. Returns false if a previous attempt is
    /// still inside the window.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Utc::now())
    }

    fn check_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut hits = self.hits.lock().unwrap();
        // Drop elapsed windows so the map stays small.
        hits.retain(|_, at| now - *at < self.window);
        if hits.contains_key(key) {
            return false;
        }
        hits.insert(key.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_allowed() {
        let limiter = RateLimiter::new(Duration::minutes(10));
        assert!(limiter.check("someone@example.com"));
    }

    #[test]
    fn second_attempt_inside_the_window_is_denied() {
        let limiter = RateLimiter::new(Duration::minutes(10));
        let now = Utc::now();
        assert!(limiter.check_at("someone@example.com", now));
        assert!(!limiter.check_at("someone@example.com", now + Duration::minutes(9)));
    }

    #[test]
    fn different_keys_do_not_interfere() {
        let limiter = RateLimiter::new(Duration::minutes(10));
        assert!(limiter.check("someone@example.com"));
        assert!(limiter.check("someone.else@example.com"));
    }

    #[test]
    fn attempts_after_the_window_are_allowed_again() {
        let limiter = RateLimiter::new(Duration::minutes(10));
        let now = Utc::now();
        assert!(limiter.check_at("someone@example.com", now));
        assert!(limiter.check_at("someone@example.com", now + Duration::minutes(11)));
    }
}
