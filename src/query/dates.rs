//! Relative date resolution.
//!
//! Turns expressions such as `today`, `next week`, `in 3 days` or `friday` into
//! ISO calendar dates, evaluated against "now" in the user's time zone.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex_lite::Regex;
use std::sync::OnceLock;

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"))
}

fn in_days_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^in (\d+) days?$").expect("valid regex"))
}

/// Parse an IANA zone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or(Tz::UTC)
}

/// Today's calendar date in the given zone.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Resolve a date expression against the current date in `tz`.
///
/// Returns `None` for anything unrecognized; callers leave the value unset.
pub fn resolve(expression: &str, tz: Tz) -> Option<String> {
    if iso_date_re().is_match(expression) {
        return Some(expression.to_string());
    }
    resolve_on(expression, today_in(tz))
}

/// Resolve a date expression relative to a fixed `today`.
pub fn resolve_on(expression: &str, today: NaiveDate) -> Option<String> {
    if iso_date_re().is_match(expression) {
        return Some(expression.to_string());
    }

    let lowered = expression.trim().to_lowercase();
    let expr = lowered
        .strip_prefix("due ")
        .or_else(|| lowered.strip_prefix("available "))
        .unwrap_or(&lowered)
        .trim();

    let date = match expr {
        "today" => today,
        "tomorrow" => today + Duration::days(1),
        "yesterday" => today - Duration::days(1),
        "next week" | "in a week" => today + Duration::days(7),
        _ => {
            if let Some(caps) = in_days_re().captures(expr) {
                let days: i64 = caps[1].parse().ok()?;
                today.checked_add_signed(Duration::try_days(days)?)?
            } else {
                let weekday = parse_weekday(expr)?;
                next_weekday(today, weekday)
            }
        }
    };

    Some(date.format("%Y-%m-%d").to_string())
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next occurrence of `weekday` strictly after `today`.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-01-06 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
    }

    #[test]
    fn iso_dates_are_echoed() {
        for d in ["2025-01-10", "1999-12-31", "2024-02-29"] {
            assert_eq!(resolve(d, Tz::UTC).as_deref(), Some(d));
            assert_eq!(resolve(d, Tz::Pacific__Auckland).as_deref(), Some(d));
        }
    }

    #[test]
    fn simple_relative_forms() {
        let today = monday();
        assert_eq!(resolve_on("today", today).as_deref(), Some("2025-01-06"));
        assert_eq!(resolve_on("Tomorrow", today).as_deref(), Some("2025-01-07"));
        assert_eq!(resolve_on("yesterday", today).as_deref(), Some("2025-01-05"));
        assert_eq!(resolve_on("next week", today).as_deref(), Some("2025-01-13"));
        assert_eq!(resolve_on("in a week", today).as_deref(), Some("2025-01-13"));
    }

    #[test]
    fn in_n_days() {
        let today = monday();
        assert_eq!(resolve_on("in 3 days", today).as_deref(), Some("2025-01-09"));
        assert_eq!(resolve_on("in 0 days", today).as_deref(), Some("2025-01-06"));
        assert_eq!(resolve_on("in 1 day", today).as_deref(), Some("2025-01-07"));
        assert_eq!(resolve_on("in -2 days", today), None);
    }

    #[test]
    fn qualifier_prefix_is_stripped() {
        let today = monday();
        assert_eq!(resolve_on("due tomorrow", today).as_deref(), Some("2025-01-07"));
        assert_eq!(
            resolve_on("  Available Today ", today).as_deref(),
            Some("2025-01-06")
        );
    }

    #[test]
    fn same_weekday_rolls_a_full_week() {
        assert_eq!(resolve_on("monday", monday()).as_deref(), Some("2025-01-13"));
    }

    #[test]
    fn weekday_is_next_occurrence() {
        let today = monday();
        assert_eq!(resolve_on("wednesday", today).as_deref(), Some("2025-01-08"));
        assert_eq!(resolve_on("sunday", today).as_deref(), Some("2025-01-12"));
        let saturday = NaiveDate::from_ymd_opt(2025, 1, 11).unwrap();
        assert_eq!(resolve_on("friday", saturday).as_deref(), Some("2025-01-17"));
    }

    #[test]
    fn unknown_expressions_resolve_to_none() {
        assert_eq!(resolve_on("someday", monday()), None);
        assert_eq!(resolve_on("", monday()), None);
        assert_eq!(resolve_on("2025/01/10", monday()), None);
    }

    #[test]
    fn invalid_zone_falls_back_to_utc() {
        assert_eq!(parse_timezone("Mars/Olympus"), Tz::UTC);
        assert_eq!(parse_timezone("Europe/Berlin"), Tz::Europe__Berlin);
    }
}
