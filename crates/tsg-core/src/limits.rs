//! Per-user limit on wizard starts.
//!
//! The remote service flood-limits code requests aggressively, so the bot
//! caps how often one user may open a wizard. A fixed window is enough at
//! "a few starts per hour" granularity.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::domain::UserId;

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct StartLimiter {
    max_per_window: u32,
    window: Duration,
    windows: HashMap<UserId, Window>,
}

impl StartLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            windows: HashMap::new(),
        }
    }

    /// `None` if allowed (and counted); otherwise the time until the
    /// window resets.
    pub fn check(&mut self, user: UserId) -> Option<Duration> {
        self.check_at(user, Instant::now())
    }

    fn check_at(&mut self, user: UserId, now: Instant) -> Option<Duration> {
        let w = self.windows.entry(user).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(w.started_at) >= self.window {
            w.started_at = now;
            w.count = 0;
        }

        if w.count < self.max_per_window {
            w.count += 1;
            return None;
        }
        Some(self.window - now.duration_since(w.started_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_cap_then_blocks() {
        let mut lim = StartLimiter::new(2, Duration::from_secs(3600));
        let now = Instant::now();
        let user = UserId(1);

        assert!(lim.check_at(user, now).is_none());
        assert!(lim.check_at(user, now).is_none());
        let wait = lim.check_at(user, now).expect("third start should block");
        assert!(wait <= Duration::from_secs(3600));
    }

    #[test]
    fn window_reset_allows_again() {
        let mut lim = StartLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        let user = UserId(1);

        assert!(lim.check_at(user, start).is_none());
        assert!(lim.check_at(user, start).is_some());
        assert!(lim
            .check_at(user, start + Duration::from_secs(61))
            .is_none());
    }

    #[test]
    fn users_are_counted_independently() {
        let mut lim = StartLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(lim.check_at(UserId(1), now).is_none());
        assert!(lim.check_at(UserId(2), now).is_none());
        assert!(lim.check_at(UserId(1), now).is_some());
    }
}
