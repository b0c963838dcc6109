//! Scheduled delivery of saved lists.
//!
//! One tokio task ticks at a fixed interval, evaluates each list's cron
//! expression against the current minute in the user's time zone, runs the
//! due lists through [`Database::run_list`] and hands the result to a
//! [`DigestSink`]. Ticks never overlap: a tick finishes all of its sends
//! before the next one starts, and missed ticks are skipped.

use crate::db::Database;
use crate::format::format_digest_markdown;
use crate::types::{ListTask, SavedList};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day month weekday), got {0}")]
    FieldCount(usize),
    #[error("invalid value '{value}' in {field} field")]
    InvalidValue { field: &'static str, value: String },
    #[error("{value} is out of range {min}-{max} in {field} field")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// Allowed values of one cron field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSet {
    allowed: Vec<bool>,
    any: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        self.allowed.get(value as usize).copied().unwrap_or(false)
    }

    fn parse(field: &'static str, text: &str, min: u32, max: u32) -> Result<Self, CronError> {
        let mut allowed = vec![false; max as usize + 1];
        let invalid = || CronError::InvalidValue {
            field,
            value: text.to_string(),
        };
        let number = |s: &str| -> Result<u32, CronError> {
            let n: u32 = s.parse().map_err(|_| invalid())?;
            if n < min || n > max {
                return Err(CronError::OutOfRange {
                    field,
                    value: n,
                    min,
                    max,
                });
            }
            Ok(n)
        };

        for part in text.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| invalid())?;
                    if step == 0 {
                        return Err(invalid());
                    }
                    (range, step)
                }
                None => (part, 1),
            };
            let (start, end) = match range {
                "*" => (min, max),
                r => match r.split_once('-') {
                    Some((a, b)) => (number(a)?, number(b)?),
                    None => {
                        let n = number(r)?;
                        // "5/15" means every 15 starting at 5
                        if part.contains('/') { (n, max) } else { (n, n) }
                    }
                },
            };
            if start > end {
                return Err(invalid());
            }
            for v in (start..=end).step_by(step as usize) {
                allowed[v as usize] = true;
            }
        }

        Ok(Self {
            allowed,
            any: text == "*",
        })
    }
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: FieldSet,
    hour: FieldSet,
    day: FieldSet,
    month: FieldSet,
    weekday: FieldSet,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }
        // Weekday accepts 7 as Sunday.
        let mut weekday = FieldSet::parse("weekday", fields[4], 0, 7)?;
        if weekday.contains(7) {
            weekday.allowed[0] = true;
        }
        Ok(Self {
            minute: FieldSet::parse("minute", fields[0], 0, 59)?,
            hour: FieldSet::parse("hour", fields[1], 0, 23)?,
            day: FieldSet::parse("day", fields[2], 1, 31)?,
            month: FieldSet::parse("month", fields[3], 1, 12)?,
            weekday,
        })
    }

    /// Whether the schedule fires in the minute containing `at`.
    ///
    /// Day-of-month and weekday follow cron's rule: when both are restricted,
    /// either may match.
    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        let day_ok = self.day.contains(at.day());
        let weekday_ok = self.weekday.contains(at.weekday().num_days_from_sunday());
        let date_ok = match (self.day.any, self.weekday.any) {
            (true, true) => true,
            (true, false) => weekday_ok,
            (false, true) => day_ok,
            (false, false) => day_ok || weekday_ok,
        };
        date_ok
            && self.minute.contains(at.minute())
            && self.hour.contains(at.hour())
            && self.month.contains(at.month())
    }
}

/// Destination for scheduled digests (chat transport, mail, ...).
#[async_trait]
pub trait DigestSink: Send + Sync {
    async fn deliver(&self, list: &SavedList, tasks: &[ListTask]) -> Result<()>;
}

/// Sink that writes digests to the log.
pub struct LogSink;

#[async_trait]
impl DigestSink for LogSink {
    async fn deliver(&self, list: &SavedList, tasks: &[ListTask]) -> Result<()> {
        info!(
            list = %list.short_id,
            count = tasks.len(),
            digest = %format_digest_markdown(list, tasks),
            "Scheduled digest"
        );
        Ok(())
    }
}

/// Scheduler state. Owns the "last fired minute" per list so a list is
/// delivered at most once per minute even with short tick intervals.
pub struct Scheduler {
    db: Arc<Database>,
    sink: Arc<dyn DigestSink>,
    tz: Tz,
    limit: usize,
    last_fired: HashMap<String, NaiveDateTime>,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, sink: Arc<dyn DigestSink>, tz: Tz, limit: usize) -> Self {
        Self {
            db,
            sink,
            tz,
            limit,
            last_fired: HashMap::new(),
        }
    }

    /// Evaluate every scheduled list at `now` and deliver the due ones.
    /// Returns the short ids of the lists delivered.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let local = now.with_timezone(&self.tz).naive_local();
        let minute = local
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local);

        let mut delivered = Vec::new();
        for list in self.db.scheduled_lists()? {
            let Some(expr) = list.schedule.as_deref() else {
                continue;
            };
            let schedule = match CronSchedule::parse(expr) {
                Ok(s) => s,
                Err(e) => {
                    warn!(list = %list.short_id, error = %e, "Skipping list with invalid schedule");
                    continue;
                }
            };
            if !schedule.matches(&minute) || self.last_fired.get(&list.id) == Some(&minute) {
                continue;
            }
            self.last_fired.insert(list.id.clone(), minute);

            let tasks = match self.db.run_list(&list.id, self.limit, self.tz) {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(list = %list.short_id, error = %e, "Scheduled list failed to run");
                    continue;
                }
            };
            if let Err(e) = self.sink.deliver(&list, &tasks).await {
                warn!(list = %list.short_id, error = %e, "Digest delivery failed");
                continue;
            }
            delivered.push(list.short_id.clone());
        }
        Ok(delivered)
    }

    /// Tick every `interval` until `shutdown` flips to true.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(sent) if !sent.is_empty() => debug!(lists = ?sent, "Scheduler tick delivered"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Scheduler tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn every_minute() {
        let s = CronSchedule::parse("* * * * *").unwrap();
        assert!(s.matches(&at(2025, 1, 6, 13, 37)));
    }

    #[test]
    fn weekday_mornings() {
        let s = CronSchedule::parse("30 8 * * 1-5").unwrap();
        assert!(s.matches(&at(2025, 1, 6, 8, 30))); // Monday
        assert!(!s.matches(&at(2025, 1, 5, 8, 30))); // Sunday
        assert!(!s.matches(&at(2025, 1, 6, 8, 31)));
    }

    #[test]
    fn steps_lists_and_sunday_as_seven() {
        let s = CronSchedule::parse("*/15 9,17 * * 7").unwrap();
        assert!(s.matches(&at(2025, 1, 5, 17, 45)));
        assert!(!s.matches(&at(2025, 1, 5, 17, 50)));
        let s = CronSchedule::parse("5/20 * * * *").unwrap();
        assert!(s.matches(&at(2025, 1, 5, 0, 45)));
        assert!(!s.matches(&at(2025, 1, 5, 0, 0)));
    }

    #[test]
    fn day_or_weekday_when_both_restricted() {
        let s = CronSchedule::parse("0 0 1 * 1").unwrap();
        assert!(s.matches(&at(2025, 1, 1, 0, 0))); // 1st, a Wednesday
        assert!(s.matches(&at(2025, 1, 6, 0, 0))); // a Monday
        assert!(!s.matches(&at(2025, 1, 7, 0, 0)));
    }

    #[test]
    fn rejects_bad_expressions() {
        assert_eq!(CronSchedule::parse("* * *"), Err(CronError::FieldCount(3)));
        assert!(matches!(
            CronSchedule::parse("60 * * * *"),
            Err(CronError::OutOfRange { field: "minute", .. })
        ));
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("a * * * *").is_err());
        assert!(CronSchedule::parse("5-1 * * * *").is_err());
    }
}
