// The matched-and-ready-to-query cron expression, plus the next-run
// search (spec §4.8 `next_runs`) and the `validate` diagnostic surface.

use super::fields::{DomField, DowField, FieldSet};
use super::parser::{self, ParseError};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct CronSchedule {
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    dom: DomField,
    months: FieldSet,
    dow: DowField,
}

/// Safety valve against a malformed field combination (e.g. Feb 30) that
/// would otherwise search forever. No real cron use case needs runs more
/// than a decade out.
const MAX_YEARS_AHEAD: i32 = 10;
const MAX_ITERATIONS: u32 = 2_000_000;
/// Hard cap on requested run count (spec §4.8).
const MAX_RUNS: usize = 1000;

pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CronSchedule {
    pub(super) fn new(seconds: FieldSet, minutes: FieldSet, hours: FieldSet, dom: DomField, months: FieldSet, dow: DowField) -> Self {
        Self {
            seconds,
            minutes,
            hours,
            dom,
            months,
            dow,
        }
    }

    pub fn minutes_contains(&self, v: u32) -> bool {
        self.minutes.contains(v)
    }

    pub fn hours_is_any(&self) -> bool {
        self.hours.is_wildcard()
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        match (self.dom.is_restricted(), self.dow.is_restricted()) {
            (true, true) => self.dom.matches(date) || self.dow.matches(date),
            (true, false) => self.dom.matches(date),
            (false, true) => self.dow.matches(date),
            (false, false) => true,
        }
    }

    /// Returns the next `n` fire times (capped at 1000) strictly after
    /// `from`, reported in `tz`. Times that fall in a DST gap (the local
    /// instant doesn't exist) are skipped; an ambiguous instant (DST
    /// fall-back) resolves to its earlier occurrence.
    pub fn next_runs(&self, tz: Tz, from: DateTime<Tz>, n: usize) -> Vec<DateTime<Tz>> {
        let n = n.min(MAX_RUNS);
        let mut results = Vec::with_capacity(n);
        let mut naive = from.naive_local() + Duration::seconds(1);
        naive = naive.with_nanosecond(0).unwrap_or(naive);
        let horizon_year = from.year() + MAX_YEARS_AHEAD;
        let mut iterations: u32 = 0;

        while results.len() < n {
            iterations += 1;
            if iterations > MAX_ITERATIONS || naive.year() > horizon_year {
                break;
            }

            if !self.months.contains(naive.month()) {
                naive = start_of_next_month(naive);
                continue;
            }
            if !self.day_matches(naive.date()) {
                naive = start_of_next_day(naive);
                continue;
            }
            if !self.hours.contains(naive.hour()) {
                naive = start_of_next_hour(naive);
                continue;
            }
            if !self.minutes.contains(naive.minute()) {
                naive = start_of_next_minute(naive);
                continue;
            }
            if !self.seconds.contains(naive.second()) {
                naive += Duration::seconds(1);
                continue;
            }

            match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => {
                    results.push(dt);
                    naive += Duration::seconds(1);
                }
                LocalResult::Ambiguous(dt, _) => {
                    results.push(dt);
                    naive += Duration::seconds(1);
                }
                LocalResult::None => {
                    // This local instant doesn't exist (spring-forward gap).
                    naive += Duration::minutes(1);
                }
            }
        }
        results
    }

    /// Parses `expr` and reports structural validity plus advisory
    /// warnings, instead of failing outright — used by the scheduling UI
    /// before a Schedule is persisted.
    pub fn validate(expr: &str) -> ValidationResult {
        match parser::parse(expr) {
            Ok(schedule) => {
                let mut warnings = Vec::new();
                if schedule.minutes.is_wildcard() && schedule.seconds.is_wildcard() {
                    warnings.push("expression fires every second — check this is intentional".to_string());
                } else if schedule.minutes.is_wildcard() {
                    warnings.push("expression fires every minute — check this is intentional".to_string());
                }
                if schedule.dom.is_restricted() && schedule.dow.is_restricted() {
                    warnings.push(
                        "both day-of-month and day-of-week are restricted — they combine with OR, not AND".to_string(),
                    );
                }
                ValidationResult {
                    valid: true,
                    errors: Vec::new(),
                    warnings,
                }
            }
            Err(ParseError(msg)) => ValidationResult {
                valid: false,
                errors: vec![msg],
                warnings: Vec::new(),
            },
        }
    }
}

fn start_of_next_month(dt: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if dt.month() == 12 { (dt.year() + 1, 1) } else { (dt.year(), dt.month() + 1) };
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap()
        .and_time(NaiveTime::MIN)
}

fn start_of_next_day(dt: NaiveDateTime) -> NaiveDateTime {
    (dt.date() + Duration::days(1)).and_time(NaiveTime::MIN)
}

fn start_of_next_hour(dt: NaiveDateTime) -> NaiveDateTime {
    let truncated = dt.date().and_hms_opt(dt.hour(), 0, 0).unwrap();
    truncated + Duration::hours(1)
}

fn start_of_next_minute(dt: NaiveDateTime) -> NaiveDateTime {
    let truncated = dt.date().and_hms_opt(dt.hour(), dt.minute(), 0).unwrap();
    truncated + Duration::minutes(1)
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    #[test]
    fn validate_reports_errors_for_bad_expression() {
        let result = CronSchedule::validate("* * * *");
        assert!(!result.valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn validate_warns_on_every_minute() {
        let result = CronSchedule::validate("* * * * *");
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("every minute")));
    }

    #[test]
    fn next_runs_caps_at_1000() {
        let schedule = parse("* * * * *").unwrap();
        let from = Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let runs = schedule.next_runs(Tz::UTC, from, 5000);
        assert_eq!(runs.len(), 1000);
    }

    #[test]
    fn next_runs_are_strictly_after_from_and_sorted() {
        let schedule = parse("0 * * * *").unwrap();
        let from = Tz::UTC.with_ymd_and_hms(2024, 1, 1, 5, 30, 0).unwrap();
        let runs = schedule.next_runs(Tz::UTC, from, 3);
        assert!(runs[0] > from);
        assert!(runs.windows(2).all(|w| w[0] < w[1]));
    }
}
