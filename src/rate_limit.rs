//! Per-session command flood limiting.
//!
//! A sliding window applied by the reader task before a line enters the
//! engine channel. Violations drop the line; enough of them in a row and
//! the reader closes the connection.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How many commands fit in one window.
const MAX_COMMANDS_PER_WINDOW: usize = 20;
const WINDOW: Duration = Duration::from_secs(5);

/// Consecutive rejected lines before the session is cut off.
const VIOLATIONS_BEFORE_DISCONNECT: u32 = 30;

pub enum FloodVerdict {
    Allow,
    Drop,
    Disconnect,
}

/// Sliding-window limiter for one session.
pub struct FloodLimiter {
    recent: VecDeque<Instant>,
    consecutive_violations: u32,
}

impl FloodLimiter {
    pub fn new() -> Self {
        Self {
            recent: VecDeque::with_capacity(MAX_COMMANDS_PER_WINDOW),
            consecutive_violations: 0,
        }
    }

    pub fn check(&mut self, now: Instant) -> FloodVerdict {
        while let Some(front) = self.recent.front() {
            if now.duration_since(*front) > WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        if self.recent.len() < MAX_COMMANDS_PER_WINDOW {
            self.recent.push_back(now);
            self.consecutive_violations = 0;
            return FloodVerdict::Allow;
        }

        self.consecutive_violations += 1;
        if self.consecutive_violations >= VIOLATIONS_BEFORE_DISCONNECT {
            FloodVerdict::Disconnect
        } else {
            FloodVerdict::Drop
        }
    }
}

impl Default for FloodLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_normal_pace() {
        let mut limiter = FloodLimiter::new();
        let start = Instant::now();
        for i in 0..MAX_COMMANDS_PER_WINDOW {
            let at = start + Duration::from_millis(200 * i as u64);
            assert!(matches!(limiter.check(at), FloodVerdict::Allow));
        }
    }

    #[test]
    fn drops_a_burst_then_recovers() {
        let mut limiter = FloodLimiter::new();
        let start = Instant::now();
        for _ in 0..MAX_COMMANDS_PER_WINDOW {
            limiter.check(start);
        }
        assert!(matches!(limiter.check(start), FloodVerdict::Drop));

        // A window later the limiter forgets the burst.
        let later = start + WINDOW + Duration::from_millis(1);
        assert!(matches!(limiter.check(later), FloodVerdict::Allow));
    }

    #[test]
    fn sustained_flood_disconnects() {
        let mut limiter = FloodLimiter::new();
        let start = Instant::now();
        for _ in 0..MAX_COMMANDS_PER_WINDOW {
            limiter.check(start);
        }
        let mut verdicts = Vec::new();
        for _ in 0..VIOLATIONS_BEFORE_DISCONNECT {
            verdicts.push(limiter.check(start));
        }
        assert!(matches!(verdicts.last(), Some(FloodVerdict::Disconnect)));
    }
}
