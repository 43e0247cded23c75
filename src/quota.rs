//! # Quota Manager
//!
//! Advisory admission control for the shared external API budget. Two
//! independent counters (daily and per-minute) refuse new reservations that
//! would exceed their limit, but never retroactively shrink an amount already
//! reserved: actual usage may exceed an estimate (pagination, for instance)
//! and that is accepted as-is. Both windows reset silently at boundary
//! crossings as a side effect of any check-or-reserve call; unused budget is
//! never banked across periods.

use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// Daily and per-minute budget limits.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub daily_limit: u64,
    pub minute_limit: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 10_000,
            minute_limit: 100,
        }
    }
}

/// Read-only usage snapshot for operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub daily_used: u64,
    pub daily_limit: u64,
    pub minute_used: u64,
    pub minute_limit: u64,
    /// Share of the daily budget consumed, 0.0–100.0.
    pub percent_used: f64,
}

#[derive(Debug)]
struct QuotaState {
    daily_used: u64,
    daily_reset_date: NaiveDate,
    minute_used: u64,
    minute_window_start: i64,
}

fn minute_bucket(now: &NaiveDateTime) -> i64 {
    now.and_utc().timestamp() / 60
}

/// Process-wide consumption tracker for the external resource budget.
#[derive(Debug)]
pub struct QuotaManager {
    config: QuotaConfig,
    state: Mutex<QuotaState>,
}

impl QuotaManager {
    pub fn new(config: QuotaConfig) -> Self {
        let now = Local::now().naive_local();
        Self {
            config,
            state: Mutex::new(QuotaState {
                daily_used: 0,
                daily_reset_date: now.date(),
                minute_used: 0,
                minute_window_start: minute_bucket(&now),
            }),
        }
    }

    /// Would reserving `estimated_units` stay within both windows? Performs
    /// boundary resets first; pure check otherwise.
    pub fn check_available(&self, estimated_units: u64) -> bool {
        self.check_available_at(estimated_units, Local::now().naive_local())
    }

    /// Unconditionally consume `units` from both windows. The caller is
    /// expected to have already performed an estimate-based check.
    pub fn reserve(&self, units: u64) {
        self.reserve_at(units, Local::now().naive_local());
    }

    /// Usage snapshot after rolling any elapsed windows.
    pub fn status(&self) -> QuotaStatus {
        self.status_at(Local::now().naive_local())
    }

    fn check_available_at(&self, estimated_units: u64, now: NaiveDateTime) -> bool {
        let mut state = self.state.lock();
        self.roll_windows(&mut state, &now);

        let daily_ok = state.daily_used + estimated_units <= self.config.daily_limit;
        let minute_ok = state.minute_used + estimated_units <= self.config.minute_limit;
        if !daily_ok || !minute_ok {
            info!(
                estimated_units,
                daily_used = state.daily_used,
                daily_limit = self.config.daily_limit,
                minute_used = state.minute_used,
                minute_limit = self.config.minute_limit,
                "Quota admission denied"
            );
        }
        daily_ok && minute_ok
    }

    fn reserve_at(&self, units: u64, now: NaiveDateTime) {
        let mut state = self.state.lock();
        self.roll_windows(&mut state, &now);
        state.daily_used += units;
        state.minute_used += units;
        debug!(
            units,
            daily_used = state.daily_used,
            minute_used = state.minute_used,
            "Quota reserved"
        );
    }

    fn status_at(&self, now: NaiveDateTime) -> QuotaStatus {
        let mut state = self.state.lock();
        self.roll_windows(&mut state, &now);
        let percent_used = if self.config.daily_limit == 0 {
            100.0
        } else {
            state.daily_used as f64 / self.config.daily_limit as f64 * 100.0
        };
        QuotaStatus {
            daily_used: state.daily_used,
            daily_limit: self.config.daily_limit,
            minute_used: state.minute_used,
            minute_limit: self.config.minute_limit,
            percent_used,
        }
    }

    fn roll_windows(&self, state: &mut QuotaState, now: &NaiveDateTime) {
        if now.date() != state.daily_reset_date {
            state.daily_used = 0;
            state.daily_reset_date = now.date();
        }
        let bucket = minute_bucket(now);
        if bucket != state.minute_window_start {
            state.minute_used = 0;
            state.minute_window_start = bucket;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn manager(daily: u64, minute: u64) -> QuotaManager {
        QuotaManager::new(QuotaConfig {
            daily_limit: daily,
            minute_limit: minute,
        })
    }

    #[test]
    fn refuses_exactly_when_estimate_would_exceed() {
        let quota = manager(100, 100);
        let now = at(2025, 6, 1, 9, 0, 0);

        quota.reserve_at(90, now);
        assert!(quota.check_available_at(10, now));
        assert!(!quota.check_available_at(11, now));
    }

    #[test]
    fn minute_limit_checked_independently() {
        let quota = manager(10_000, 10);
        let now = at(2025, 6, 1, 9, 0, 0);

        quota.reserve_at(10, now);
        assert!(!quota.check_available_at(1, now));

        // Next minute: per-minute window resets, daily usage stays.
        let later = at(2025, 6, 1, 9, 1, 5);
        assert!(quota.check_available_at(1, later));
        assert_eq!(quota.status_at(later).daily_used, 10);
        assert_eq!(quota.status_at(later).minute_used, 0);
    }

    #[test]
    fn daily_window_resets_at_date_rollover() {
        let quota = manager(100, 100);
        quota.reserve_at(100, at(2025, 6, 1, 23, 59, 0));
        assert!(!quota.check_available_at(1, at(2025, 6, 1, 23, 59, 30)));

        let next_day = at(2025, 6, 2, 0, 0, 10);
        assert!(quota.check_available_at(1, next_day));
        assert_eq!(quota.status_at(next_day).daily_used, 0);
    }

    #[test]
    fn reserve_is_advisory_and_may_exceed() {
        let quota = manager(50, 50);
        let now = at(2025, 6, 1, 9, 0, 0);

        // Actual usage exceeded the estimate; reserved as-is.
        quota.reserve_at(80, now);
        let status = quota.status_at(now);
        assert_eq!(status.daily_used, 80);
        assert!(status.percent_used > 100.0);
        assert!(!quota.check_available_at(1, now));
    }

    #[test]
    fn reserve_then_status_reflects_increment() {
        let quota = manager(1000, 100);
        let now = at(2025, 6, 1, 9, 0, 0);

        quota.reserve_at(30, now);
        let status = quota.status_at(now);
        assert_eq!(status.daily_used, 30);
        assert_eq!(status.minute_used, 30);
        assert!((status.percent_used - 3.0).abs() < f64::EPSILON);
    }
}
