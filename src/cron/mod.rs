//! Cron expression parsing and next-run calculation (spec §4.8).
//!
//! Hand-rolled rather than built on a published `cron` crate: the field
//! grammar this spec requires (`L`, `W`, `#`, six-field seconds, the
//! `@descriptor` set) goes beyond what the common crates expose, and the
//! teacher's corpus has no precedent for a dependency here either.

mod fields;
mod parser;
mod schedule;

pub use parser::{parse, ParseError};
pub use schedule::{CronSchedule, ValidationResult};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use chrono_tz::America::New_York;
    use chrono_tz::Tz;

    #[test]
    fn hourly_descriptor_expands_to_minute_zero() {
        let schedule = parse("@hourly").unwrap();
        assert!(schedule.minutes_contains(0));
        assert!(!schedule.minutes_contains(1));
        assert!(schedule.hours_is_any());
    }

    #[test]
    fn six_field_every_15_minutes_next_four_runs() {
        let schedule = parse("0 */15 * * * *").unwrap();
        let from = Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        let runs = schedule.next_runs(Tz::UTC, from, 4);
        let minutes: Vec<u32> = runs.iter().map(|dt| dt.naive_local().hour() * 60 + dt.naive_local().minute()).collect();
        for m in &minutes {
            assert_eq!(m % 15, 0);
        }
    }

    #[test]
    fn dst_transition_day_never_yields_skipped_hour() {
        let schedule = parse("0 2 * * *").unwrap();
        // 2024-03-10 is the US spring-forward day; 02:00 does not exist.
        let from = New_York.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let runs = schedule.next_runs(New_York, from, 1);
        assert_eq!(runs.len(), 1);
        assert_ne!(runs[0].naive_local().date(), chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn weekday_9am_dst_scenario_matches_spec_example() {
        let schedule = parse("0 9 * * 1-5").unwrap();
        let from = New_York.with_ymd_and_hms(2024, 3, 8, 18, 0, 0).unwrap();
        let runs = schedule.next_runs(New_York, from, 3);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].naive_local().date(), chrono::NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(runs[1].naive_local().date(), chrono::NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
        assert_eq!(runs[2].naive_local().date(), chrono::NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());
        for dt in &runs {
            assert_eq!(dt.naive_local().hour(), 9);
        }
    }

    #[test]
    fn at_every_is_rejected() {
        assert!(parse("@every 5m").is_err());
    }

    #[test]
    fn invalid_expression_reports_errors_not_panics() {
        let result = CronSchedule::validate("not a cron expression at all, way too many fields here");
        assert!(!result.valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn simultaneous_dom_and_dow_warns() {
        let result = CronSchedule::validate("0 0 15 * 1");
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("day-of-month") || w.contains("day-of-week")));
    }
}
