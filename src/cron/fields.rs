// Per-field representation shared by the parser and the next-run
// calculator. Numeric fields (second/minute/hour/month) reduce to a fixed
// bitset; day-of-month and day-of-week keep a token list because `L`, `W`,
// and `#` are positional (they depend on the month being evaluated, not a
// fixed integer), unlike every other field in the grammar.

use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone)]
pub struct FieldSet {
    min: u32,
    max: u32,
    bits: Vec<bool>,
    /// True only for a bare `*` (used to distinguish "every value" from an
    /// explicit list that happens to cover every value, for the
    /// dom/dow OR-vs-AND rule and for warning detection).
    is_wildcard: bool,
}

impl FieldSet {
    pub fn empty(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            bits: vec![false; (max - min + 1) as usize],
            is_wildcard: false,
        }
    }

    pub fn any(min: u32, max: u32) -> Self {
        let mut set = Self::empty(min, max);
        for v in min..=max {
            set.set(v);
        }
        set.is_wildcard = true;
        set
    }

    pub fn single(min: u32, max: u32, value: u32) -> Self {
        let mut set = Self::empty(min, max);
        set.set(value);
        set
    }

    pub fn set(&mut self, value: u32) {
        if value >= self.min && value <= self.max {
            self.bits[(value - self.min) as usize] = true;
        }
    }

    pub fn union(&mut self, other: &FieldSet) {
        for (i, b) in other.bits.iter().enumerate() {
            if *b {
                self.bits[i] = true;
            }
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        if value < self.min || value > self.max {
            return false;
        }
        self.bits[(value - self.min) as usize]
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_wildcard
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }

    /// The smallest allowed value that is `>= from`, wrapping to the
    /// smallest allowed value overall if none qualifies (caller is
    /// responsible for bumping the next-larger unit when wrapping).
    pub fn next_at_or_after(&self, from: u32) -> Option<u32> {
        (from.max(self.min)..=self.max).find(|v| self.contains(*v))
    }

    pub fn smallest(&self) -> Option<u32> {
        (self.min..=self.max).find(|v| self.contains(*v))
    }
}

/// Day-of-month token. A list may mix ordinary days with `L`/`W` forms,
/// e.g. `"1,15,L"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomToken {
    Day(u32),
    /// `L` (alone) or `L-k`.
    LastMinus(u32),
    /// `<n>W` — nearest weekday to day `n`.
    NearestWeekday(u32),
    /// `LW` — last weekday of the month.
    LastWeekday,
}

#[derive(Debug, Clone)]
pub struct DomField {
    pub tokens: Vec<DomToken>,
    pub is_any: bool,
}

impl DomField {
    pub fn any() -> Self {
        Self {
            tokens: Vec::new(),
            is_any: true,
        }
    }

    pub fn is_restricted(&self) -> bool {
        !self.is_any
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        if self.is_any {
            return true;
        }
        let last_day = last_day_of_month(date.year(), date.month());
        self.tokens.iter().any(|t| match t {
            DomToken::Day(d) => date.day() == *d,
            DomToken::LastMinus(k) => last_day >= *k && date.day() == last_day - k,
            DomToken::NearestWeekday(target) => {
                let target = (*target).min(last_day);
                nearest_weekday(date.year(), date.month(), target) == date
            }
            DomToken::LastWeekday => last_weekday_of_month(date.year(), date.month()) == date,
        })
    }
}

/// Day-of-week token, 0=Sunday..6=Saturday (spec §4.8 dow range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowToken {
    Day(u32),
    /// `<n>L` — last occurrence of weekday `n` in the month.
    LastOfMonth(u32),
    /// `<n>#<k>` — the k-th occurrence of weekday `n` in the month.
    Nth(u32, u32),
}

#[derive(Debug, Clone)]
pub struct DowField {
    pub tokens: Vec<DowToken>,
    pub is_any: bool,
}

impl DowField {
    pub fn any() -> Self {
        Self {
            tokens: Vec::new(),
            is_any: true,
        }
    }

    pub fn is_restricted(&self) -> bool {
        !self.is_any
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        if self.is_any {
            return true;
        }
        let cron_dow = cron_weekday(date);
        let last_day = last_day_of_month(date.year(), date.month());
        self.tokens.iter().any(|t| match t {
            DowToken::Day(d) => cron_dow == *d,
            DowToken::LastOfMonth(d) => cron_dow == *d && date.day() + 7 > last_day,
            DowToken::Nth(d, k) => cron_dow == *d && ((date.day() - 1) / 7 + 1) == *k,
        })
    }
}

/// chrono's `Weekday` is Mon=0..Sun=6; cron's dow field is Sun=0..Sat=6.
pub fn cron_weekday(date: NaiveDate) -> u32 {
    (date.weekday().num_days_from_sunday()) % 7
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

/// Nearest weekday to `day` within `year`/`month`, clamped so the result
/// never crosses into the previous or next month (the conventional `W`
/// behavior: a Saturday day 1 resolves forward to Monday day 3, a Sunday
/// on the last day resolves backward to Friday).
pub fn nearest_weekday(year: i32, month: u32, day: u32) -> NaiveDate {
    let last_day = last_day_of_month(year, month);
    let day = day.min(last_day).max(1);
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
    use chrono::Weekday;
    match date.weekday() {
        Weekday::Sat => {
            if day == 1 {
                date.succ_opt().unwrap().succ_opt().unwrap()
            } else {
                date.pred_opt().unwrap()
            }
        }
        Weekday::Sun => {
            if day == last_day {
                date.pred_opt().unwrap().pred_opt().unwrap()
            } else {
                date.succ_opt().unwrap()
            }
        }
        _ => date,
    }
}

pub fn last_weekday_of_month(year: i32, month: u32) -> NaiveDate {
    let last_day = last_day_of_month(year, month);
    let date = NaiveDate::from_ymd_opt(year, month, last_day).unwrap();
    use chrono::Weekday;
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap(),
        Weekday::Sun => date.pred_opt().unwrap().pred_opt().unwrap(),
        _ => date,
    }
}
