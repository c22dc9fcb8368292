//! Pre-unlock access policy gate.
//!
//! `AccessGuard` is consulted immediately before a vault is opened.  It
//! enforces two advisory policies: an allowed time-of-day window and a
//! cap on unlock attempts within a rolling interval.  Advisory means
//! exactly that — the encryption stays secure even if this gate is
//! bypassed; it only slows an attacker down on the happy path.
//!
//! The guard keeps a small rolling counter of check timestamps and
//! nothing else.  The counter resets on a successful unlock.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Duration, Timelike, Utc};

/// Why an unlock attempt was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The attempt falls outside the configured time-of-day window.
    OutsideWindow,
    /// Too many attempts within the rolling interval.
    TooManyAttempts,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideWindow => write!(f, "outside the allowed access window"),
            Self::TooManyAttempts => write!(f, "too many unlock attempts"),
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Access policy configuration.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    /// Allowed time window as `(start_hour, end_hour)` in UTC, start
    /// inclusive, end exclusive.  A window that wraps past midnight
    /// (start > end) is supported; equal bounds mean no restriction.
    /// `None` disables the window check entirely.
    pub allowed_hours: Option<(u32, u32)>,
    /// Maximum number of unlock attempts within `attempt_window`.
    pub max_attempts: u32,
    /// Length of the rolling attempt-counting interval, in seconds.
    pub attempt_window_secs: i64,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            allowed_hours: None,
            max_attempts: 5,
            attempt_window_secs: 300,
        }
    }
}

/// Rolling-counter policy gate consulted before `VaultStore::open`.
pub struct AccessGuard {
    policy: AccessPolicy,
    attempts: VecDeque<DateTime<Utc>>,
}

impl AccessGuard {
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            policy,
            attempts: VecDeque::new(),
        }
    }

    /// Check whether an unlock attempt is allowed right now.
    ///
    /// Every call counts as an attempt, allowed or not.
    pub fn check(&mut self) -> Decision {
        self.check_at(Utc::now())
    }

    /// Check an unlock attempt at an explicit instant.
    ///
    /// Separated from `check` so policy behavior is testable without
    /// wall-clock dependence.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> Decision {
        // Record this attempt, then drop everything that has rolled out
        // of the counting interval.
        self.attempts.push_back(now);
        let cutoff = now - Duration::seconds(self.policy.attempt_window_secs);
        while let Some(front) = self.attempts.front() {
            if *front < cutoff {
                self.attempts.pop_front();
            } else {
                break;
            }
        }

        if let Some((start, end)) = self.policy.allowed_hours {
            if !hour_in_window(now.hour(), start, end) {
                return Decision::Deny(DenyReason::OutsideWindow);
            }
        }

        if self.attempts.len() as u32 > self.policy.max_attempts {
            return Decision::Deny(DenyReason::TooManyAttempts);
        }

        Decision::Allow
    }

    /// Clear the rolling counter.  Called after a successful unlock.
    pub fn reset(&mut self) {
        self.attempts.clear();
    }

    /// Number of attempts currently inside the rolling interval.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

fn hour_in_window(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        // Degenerate window: no restriction.
        true
    } else if start < end {
        (start..end).contains(&hour)
    } else {
        // Wraps past midnight, e.g. (22, 6) allows 22..24 and 0..6.
        hour >= start || hour < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, hour, 30, 0).unwrap()
    }

    #[test]
    fn allows_inside_window() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: Some((9, 17)),
            ..AccessPolicy::default()
        });
        assert_eq!(guard.check_at(at_hour(12)), Decision::Allow);
    }

    #[test]
    fn denies_outside_window() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: Some((9, 17)),
            ..AccessPolicy::default()
        });
        assert_eq!(
            guard.check_at(at_hour(3)),
            Decision::Deny(DenyReason::OutsideWindow)
        );
    }

    #[test]
    fn window_end_is_exclusive() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: Some((9, 17)),
            ..AccessPolicy::default()
        });
        assert_eq!(
            guard.check_at(at_hour(17)),
            Decision::Deny(DenyReason::OutsideWindow)
        );
    }

    #[test]
    fn wrapping_window_allows_overnight_hours() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: Some((22, 6)),
            ..AccessPolicy::default()
        });
        assert_eq!(guard.check_at(at_hour(23)), Decision::Allow);
        assert_eq!(guard.check_at(at_hour(2)), Decision::Allow);
        assert_eq!(
            guard.check_at(at_hour(12)),
            Decision::Deny(DenyReason::OutsideWindow)
        );
    }

    #[test]
    fn rate_limits_after_max_attempts() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: None,
            max_attempts: 3,
            attempt_window_secs: 300,
        });

        let now = at_hour(12);
        for _ in 0..3 {
            assert_eq!(guard.check_at(now), Decision::Allow);
        }
        assert_eq!(
            guard.check_at(now),
            Decision::Deny(DenyReason::TooManyAttempts)
        );
    }

    #[test]
    fn old_attempts_roll_out_of_the_window() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: None,
            max_attempts: 2,
            attempt_window_secs: 60,
        });

        let start = at_hour(12);
        assert_eq!(guard.check_at(start), Decision::Allow);
        assert_eq!(guard.check_at(start), Decision::Allow);

        // Two minutes later the earlier attempts no longer count.
        let later = start + Duration::seconds(120);
        assert_eq!(guard.check_at(later), Decision::Allow);
    }

    #[test]
    fn reset_clears_the_counter() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: None,
            max_attempts: 1,
            attempt_window_secs: 300,
        });

        let now = at_hour(12);
        assert_eq!(guard.check_at(now), Decision::Allow);
        assert_eq!(
            guard.check_at(now),
            Decision::Deny(DenyReason::TooManyAttempts)
        );

        guard.reset();
        assert_eq!(guard.attempt_count(), 0);
        assert_eq!(guard.check_at(now), Decision::Allow);
    }

    #[test]
    fn every_check_counts_as_an_attempt() {
        let mut guard = AccessGuard::new(AccessPolicy {
            allowed_hours: Some((9, 17)),
            max_attempts: 10,
            attempt_window_secs: 300,
        });

        guard.check_at(at_hour(3));
        guard.check_at(at_hour(12));
        assert_eq!(guard.attempt_count(), 2);
    }
}
