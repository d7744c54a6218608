//! Time-triggered jobs (§4.10): daily standup, daily summary, backup, state
//! push, periodic health checks, and the per-tick cost alert.
//!
//! Each daily job fires once inside a 10-minute window around its configured
//! time and is guarded against re-entry for the same calendar day, the way
//! `at-daemon`'s `TaskScheduler` guards bead assignment against double
//! dispatch — here the guard key is the job name + local date instead of a
//! bead id.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// A job whose window has opened and that has not yet run today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DailyJob {
    Standup,
    Summary,
    Backup,
    StatePush,
}

const STATE_PUSH_TIME: &str = "04:00";
const WINDOW_MINUTES: i64 = 5;

pub struct Scheduler {
    timezone: Tz,
    last_run: Mutex<HashMap<DailyJob, NaiveDate>>,
    last_health_check: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            last_run: Mutex::new(HashMap::new()),
            last_health_check: Mutex::new(None),
        }
    }

    /// Returns the daily jobs whose window is open right now and that have
    /// not already run today, then marks them run. Call once per tick.
    pub fn due_daily_jobs(&self, cfg: &cadre_core::config::SchedulerConfig, now: DateTime<Utc>) -> Vec<DailyJob> {
        let local = now.with_timezone(&self.timezone);
        let today = local.date_naive();
        let candidates = [
            (DailyJob::Standup, cfg.standup_time.as_str()),
            (DailyJob::Summary, cfg.summary_time.as_str()),
            (DailyJob::Backup, cfg.backup_time.as_str()),
            (DailyJob::StatePush, STATE_PUSH_TIME),
        ];

        let mut due = Vec::new();
        let mut last_run = self.last_run.lock().unwrap();
        for (job, hhmm) in candidates {
            let Some((hour, minute)) = parse_hhmm(hhmm) else { continue };
            if last_run.get(&job) == Some(&today) {
                continue;
            }
            let Some(target) = local.date_naive().and_hms_opt(hour, minute, 0) else { continue };
            let target = match self.timezone.from_local_datetime(&target).single() {
                Some(t) => t,
                None => continue,
            };
            let delta_minutes = (local - target).num_minutes().abs();
            if delta_minutes <= WINDOW_MINUTES {
                last_run.insert(job, today);
                due.push(job);
            }
        }
        due
    }

    /// True at most once per `interval`, independent of calendar day —
    /// used for the §4.10 health-check job.
    pub fn health_check_due(&self, interval: std::time::Duration, now: DateTime<Utc>) -> bool {
        let mut last = self.last_health_check.lock().unwrap();
        let due = match *last {
            Some(prev) => (now - prev).to_std().unwrap_or_default() >= interval,
            None => true,
        };
        if due {
            *last = Some(now);
        }
        due
    }
}

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::config::SchedulerConfig;

    fn cfg() -> SchedulerConfig {
        SchedulerConfig {
            standup_time: "09:00".into(),
            summary_time: "18:00".into(),
            backup_time: "02:00".into(),
            health_check_interval_secs: 600,
        }
    }

    #[test]
    fn fires_standup_inside_window_and_not_again_same_day() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        let now = chrono_tz::UTC
            .with_ymd_and_hms(2026, 7, 28, 9, 2, 0)
            .unwrap()
            .with_timezone(&Utc);
        let due = scheduler.due_daily_jobs(&cfg(), now);
        assert!(due.contains(&DailyJob::Standup));

        let due_again = scheduler.due_daily_jobs(&cfg(), now);
        assert!(!due_again.contains(&DailyJob::Standup));
    }

    #[test]
    fn outside_window_never_fires() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        let now = chrono_tz::UTC
            .with_ymd_and_hms(2026, 7, 28, 9, 30, 0)
            .unwrap()
            .with_timezone(&Utc);
        let due = scheduler.due_daily_jobs(&cfg(), now);
        assert!(!due.contains(&DailyJob::Standup));
    }

    #[test]
    fn health_check_due_respects_interval() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        let t0 = Utc::now();
        assert!(scheduler.health_check_due(std::time::Duration::from_secs(600), t0));
        assert!(!scheduler.health_check_due(std::time::Duration::from_secs(600), t0 + chrono::Duration::seconds(5)));
        assert!(scheduler.health_check_due(std::time::Duration::from_secs(600), t0 + chrono::Duration::seconds(601)));
    }
}
