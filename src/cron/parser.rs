// Expression parsing: splits a 5- or 6-field cron string (or a
// `@descriptor`) into the typed fields `CronSchedule` matches against.

use super::fields::{DomField, DomToken, DowField, DowToken, FieldSet};
use super::schedule::CronSchedule;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

fn err(msg: impl Into<String>) -> ParseError {
    ParseError(msg.into())
}

/// Parses a cron expression into a [`CronSchedule`]. Accepts 5-field,
/// 6-field (leading seconds), and the `@descriptor` shorthand. `@every`
/// is explicitly rejected per spec §4.8.
pub fn parse(expr: &str) -> Result<CronSchedule, ParseError> {
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix('@') {
        return parse_descriptor(rest);
    }

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let (seconds_str, minute_str, hour_str, dom_str, month_str, dow_str) = match fields.len() {
        5 => ("0", fields[0], fields[1], fields[2], fields[3], fields[4]),
        6 => (fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]),
        n => {
            return Err(err(format!(
                "expected 5 or 6 whitespace-separated fields, got {n}"
            )))
        }
    };

    let seconds = parse_numeric_field(seconds_str, 0, 59, "second")?;
    let minutes = parse_numeric_field(minute_str, 0, 59, "minute")?;
    let hours = parse_numeric_field(hour_str, 0, 23, "hour")?;
    let months = parse_numeric_field(month_str, 1, 12, "month")?;
    let dom = parse_dom_field(dom_str)?;
    let dow = parse_dow_field(dow_str)?;

    Ok(CronSchedule::new(seconds, minutes, hours, dom, months, dow))
}

fn parse_descriptor(name: &str) -> Result<CronSchedule, ParseError> {
    if name == "every" {
        return Err(err("@every is not a cron expression — use a plain interval timer instead"));
    }
    let expr = match name {
        "yearly" | "annually" => "0 0 1 1 *",
        "monthly" => "0 0 1 * *",
        "weekly" => "0 0 * * 0",
        "daily" | "midnight" => "0 0 * * *",
        "hourly" => "0 * * * *",
        other => return Err(err(format!("unknown descriptor '@{other}'"))),
    };
    parse(expr)
}

fn is_wildcard_token(token: &str) -> bool {
    token == "*" || token == "?"
}

fn parse_numeric_field(field: &str, min: u32, max: u32, label: &str) -> Result<FieldSet, ParseError> {
    let mut set = FieldSet::empty(min, max);
    let mut saw_wildcard_token = false;
    for token in field.split(',') {
        if is_wildcard_token(token) {
            saw_wildcard_token = true;
            for v in min..=max {
                set.set(v);
            }
            continue;
        }
        let (range_part, step) = split_step(token)?;
        let (lo, hi) = parse_range_part(range_part, min, max, label)?;
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(err(format!("{label} field: step must be > 0")));
        }
        let mut v = lo;
        while v <= hi {
            set.set(v);
            v += step;
        }
    }
    if set.is_empty() {
        return Err(err(format!("{label} field: no values parsed from '{field}'")));
    }
    if saw_wildcard_token && field.split(',').count() == 1 {
        return Ok(FieldSet::any(min, max));
    }
    Ok(set)
}

/// Splits `"a-b/n"` or `"*/n"` into the range/wildcard part and the
/// optional step.
fn split_step(token: &str) -> Result<(&str, Option<u32>), ParseError> {
    match token.split_once('/') {
        Some((range_part, step_part)) => {
            let step: u32 = step_part
                .parse()
                .map_err(|_| err(format!("invalid step '{step_part}'")))?;
            Ok((range_part, Some(step)))
        }
        None => Ok((token, None)),
    }
}

fn parse_range_part(part: &str, min: u32, max: u32, label: &str) -> Result<(u32, u32), ParseError> {
    if part == "*" {
        return Ok((min, max));
    }
    if let Some((lo, hi)) = part.split_once('-') {
        let lo: u32 = lo.parse().map_err(|_| err(format!("{label} field: invalid value '{lo}'")))?;
        let hi: u32 = hi.parse().map_err(|_| err(format!("{label} field: invalid value '{hi}'")))?;
        if lo > hi {
            return Err(err(format!("{label} field: range '{part}' has start after end")));
        }
        check_bounds(lo, min, max, label)?;
        check_bounds(hi, min, max, label)?;
        Ok((lo, hi))
    } else {
        let v: u32 = part.parse().map_err(|_| err(format!("{label} field: invalid value '{part}'")))?;
        check_bounds(v, min, max, label)?;
        Ok((v, v))
    }
}

fn check_bounds(v: u32, min: u32, max: u32, label: &str) -> Result<(), ParseError> {
    if v < min || v > max {
        return Err(err(format!(
            "{label} field: value {v} out of range [{min}, {max}]"
        )));
    }
    Ok(())
}

fn parse_dom_field(field: &str) -> Result<DomField, ParseError> {
    if field.split(',').all(is_wildcard_token) {
        return Ok(DomField::any());
    }
    let mut tokens = Vec::new();
    for token in field.split(',') {
        if is_wildcard_token(token) {
            continue;
        }
        let upper = token.to_ascii_uppercase();
        if upper == "LW" {
            tokens.push(DomToken::LastWeekday);
        } else if upper == "L" {
            tokens.push(DomToken::LastMinus(0));
        } else if let Some(k) = upper.strip_prefix("L-") {
            let k: u32 = k.parse().map_err(|_| err(format!("day-of-month: invalid 'L-{k}'")))?;
            tokens.push(DomToken::LastMinus(k));
        } else if let Some(day) = upper.strip_suffix('W') {
            let d: u32 = day.parse().map_err(|_| err(format!("day-of-month: invalid '{token}'")))?;
            check_bounds(d, 1, 31, "day-of-month")?;
            tokens.push(DomToken::NearestWeekday(d));
        } else {
            let (range_part, step) = split_step(token)?;
            let (lo, hi) = parse_range_part(range_part, 1, 31, "day-of-month")?;
            let step = step.unwrap_or(1).max(1);
            let mut v = lo;
            while v <= hi {
                tokens.push(DomToken::Day(v));
                v += step;
            }
        }
    }
    if tokens.is_empty() {
        return Err(err(format!("day-of-month field: no values parsed from '{field}'")));
    }
    Ok(DomField { tokens, is_any: false })
}

fn parse_dow_field(field: &str) -> Result<DowField, ParseError> {
    if field.split(',').all(is_wildcard_token) {
        return Ok(DowField::any());
    }
    let mut tokens = Vec::new();
    for token in field.split(',') {
        if is_wildcard_token(token) {
            continue;
        }
        let upper = token.to_ascii_uppercase();
        if let Some(day) = upper.strip_suffix('L') {
            let d = parse_dow_value(day)?;
            tokens.push(DowToken::LastOfMonth(d));
        } else if let Some((day, nth)) = upper.split_once('#') {
            let d = parse_dow_value(day)?;
            let k: u32 = nth.parse().map_err(|_| err(format!("day-of-week: invalid nth '{nth}'")))?;
            if !(1..=5).contains(&k) {
                return Err(err(format!("day-of-week: nth occurrence {k} out of range [1,5]")));
            }
            tokens.push(DowToken::Nth(d, k));
        } else {
            let (range_part, step) = split_step(token)?;
            let (lo, hi) = parse_dow_range(range_part)?;
            let step = step.unwrap_or(1).max(1);
            let mut v = lo;
            while v <= hi {
                tokens.push(DowToken::Day(v % 7));
                v += step;
            }
        }
    }
    if tokens.is_empty() {
        return Err(err(format!("day-of-week field: no values parsed from '{field}'")));
    }
    Ok(DowField { tokens, is_any: false })
}

fn parse_dow_value(s: &str) -> Result<u32, ParseError> {
    let v: u32 = s.parse().map_err(|_| err(format!("day-of-week: invalid value '{s}'")))?;
    // 7 is a common alias for Sunday in cron dialects; normalize it.
    let v = if v == 7 { 0 } else { v };
    check_bounds(v, 0, 6, "day-of-week")?;
    Ok(v)
}

fn parse_dow_range(part: &str) -> Result<(u32, u32), ParseError> {
    if part == "*" {
        return Ok((0, 6));
    }
    if let Some((lo, hi)) = part.split_once('-') {
        let lo = parse_dow_value(lo)?;
        let hi = parse_dow_value(hi)?;
        if lo > hi {
            return Err(err(format!("day-of-week field: range '{part}' has start after end")));
        }
        Ok((lo, hi))
    } else {
        let v = parse_dow_value(part)?;
        Ok((v, v))
    }
}
