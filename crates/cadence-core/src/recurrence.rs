//! Recurrence rules and their expansion into occurrence dates.
//!
//! A [`RecurrenceRule`] describes a daily, weekly, monthly or yearly cadence
//! anchored at a start date. [`expand`] turns a rule into the ordered local
//! dates falling inside a bounded `[from, to)` window.
//!
//! Expansion walks the rule period by period (one day, week, month or year
//! times `interval`), so its cost follows the number of occurrences rather
//! than the width of the requested window. Unbounded rules without a count
//! seek straight to the period containing `from`.

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How often a rule repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Returns the lowercase name of this frequency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// Errors raised for malformed recurrence input, before any expansion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRuleError {
    /// The interval must be at least one period.
    #[error("interval must be >= 1, got {0}")]
    IntervalTooSmall(u32),

    /// A monthly or yearly day-of-month outside 1..=31.
    #[error("day of month must be within 1..=31, got {0}")]
    DayOfMonthOutOfRange(u32),

    /// The requested window ends before it starts.
    #[error("expansion window is inverted: from {from} is after to {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
}

/// A recurrence rule anchored at a start date in an IANA timezone.
///
/// The end date is inclusive. When both `end` and `count` are set, whichever
/// bound is reached first terminates the series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekdays for weekly rules. Empty means the weekday of `start`.
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    /// Day of month for monthly and yearly rules. Defaults to the day of
    /// `start`; values past the end of a month clamp to its last day.
    #[serde(default)]
    pub day_of_month: Option<u32>,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

fn default_interval() -> u32 {
    1
}

fn default_timezone() -> Tz {
    Tz::UTC
}

impl RecurrenceRule {
    /// Creates a rule repeating every period from `start`, in UTC.
    pub fn new(frequency: Frequency, start: NaiveDate) -> Self {
        Self {
            frequency,
            interval: 1,
            weekdays: Vec::new(),
            day_of_month: None,
            start,
            end: None,
            count: None,
            timezone: Tz::UTC,
        }
    }

    /// Shorthand for a daily rule.
    pub fn daily(start: NaiveDate) -> Self {
        Self::new(Frequency::Daily, start)
    }

    /// Shorthand for a weekly rule on the given weekdays.
    pub fn weekly(start: NaiveDate, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        Self::new(Frequency::Weekly, start).with_weekdays(weekdays)
    }

    /// Shorthand for a monthly rule on the given day of month.
    pub fn monthly(start: NaiveDate, day_of_month: u32) -> Self {
        Self::new(Frequency::Monthly, start).with_day_of_month(day_of_month)
    }

    /// Shorthand for a yearly rule on the month and day of `start`.
    pub fn yearly(start: NaiveDate) -> Self {
        Self::new(Frequency::Yearly, start)
    }

    /// Builder method to set the interval.
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Builder method to set the weekdays of a weekly rule.
    pub fn with_weekdays(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekdays = weekdays.into_iter().collect();
        self
    }

    /// Builder method to set the day of month.
    pub fn with_day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }

    /// Builder method to set the inclusive end date.
    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    /// Builder method to cap the number of occurrences.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Builder method to set the timezone.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Checks the rule itself, independently of any window.
    pub fn validate(&self) -> Result<(), InvalidRuleError> {
        if self.interval < 1 {
            return Err(InvalidRuleError::IntervalTooSmall(self.interval));
        }
        if matches!(self.frequency, Frequency::Monthly | Frequency::Yearly) {
            if let Some(day) = self.day_of_month {
                if !(1..=31).contains(&day) {
                    return Err(InvalidRuleError::DayOfMonthOutOfRange(day));
                }
            }
        }
        Ok(())
    }

    /// Returns true if `date` is an occurrence of this rule.
    pub fn is_occurrence(&self, date: NaiveDate) -> Result<bool, InvalidRuleError> {
        let Some(next) = date.succ_opt() else {
            return Ok(false);
        };
        Ok(!expand(self, date, next)?.is_empty())
    }

    /// Returns the first occurrence strictly after `after`, if any.
    pub fn next_occurrence(&self, after: NaiveDate) -> Result<Option<NaiveDate>, InvalidRuleError> {
        self.validate()?;
        let Some(from) = after.succ_opt() else {
            return Ok(None);
        };
        Ok(Occurrences::seeking(self, from).find(|date| *date >= from))
    }

    /// Iterates over every occurrence from `start`, honouring `end` and `count`.
    ///
    /// The iterator is unbounded for open-ended rules; callers must bound it.
    pub fn occurrences(&self) -> Result<Occurrences<'_>, InvalidRuleError> {
        self.validate()?;
        Ok(Occurrences::from_start(self))
    }

    fn sorted_weekdays(&self) -> Vec<Weekday> {
        let mut days = if self.weekdays.is_empty() {
            vec![self.start.weekday()]
        } else {
            self.weekdays.clone()
        };
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        days
    }
}

/// Expands `rule` into the ordered occurrence dates inside `[from, to)`.
///
/// `from` is included when it is itself an occurrence. Only the dates inside
/// the window are allocated, whatever the rule's own extent.
pub fn expand(
    rule: &RecurrenceRule,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NaiveDate>, InvalidRuleError> {
    rule.validate()?;
    if from > to {
        return Err(InvalidRuleError::InvertedRange { from, to });
    }

    let dates = Occurrences::seeking(rule, from)
        .take_while(|date| *date < to)
        .filter(|date| *date >= from)
        .collect();
    Ok(dates)
}

/// Iterator over the occurrences of a rule, in ascending order.
///
/// Produced by [`RecurrenceRule::occurrences`]. Counting always starts at
/// `rule.start`, so a rule with a `count` is walked from its first period.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    rule: &'a RecurrenceRule,
    weekdays: Vec<Weekday>,
    period: u32,
    pending: Vec<NaiveDate>,
    emitted: u32,
    done: bool,
}

impl<'a> Occurrences<'a> {
    fn from_start(rule: &'a RecurrenceRule) -> Self {
        Self {
            rule,
            weekdays: rule.sorted_weekdays(),
            period: 0,
            pending: Vec::new(),
            emitted: 0,
            done: false,
        }
    }

    /// Starts at the period containing `target` when that cannot change the
    /// result, i.e. when the rule has no occurrence count.
    fn seeking(rule: &'a RecurrenceRule, target: NaiveDate) -> Self {
        let mut iter = Self::from_start(rule);
        if rule.count.is_none() && target > rule.start {
            iter.period = periods_before(rule, target);
        }
        iter
    }

    /// Fills `pending` with the candidates of the current period, in reverse
    /// order so that `pop` yields them ascending.
    fn refill(&mut self) -> bool {
        let rule = self.rule;
        let Some(step) = self.period.checked_mul(rule.interval) else {
            return false;
        };
        let mut candidates: Vec<NaiveDate> = match rule.frequency {
            Frequency::Daily => rule
                .start
                .checked_add_days(Days::new(u64::from(step)))
                .into_iter()
                .collect(),
            Frequency::Weekly => {
                let week_start = monday_of(rule.start)
                    .checked_add_days(Days::new(u64::from(step) * 7));
                match week_start {
                    Some(monday) => self
                        .weekdays
                        .iter()
                        .filter_map(|d| {
                            monday.checked_add_days(Days::new(u64::from(d.num_days_from_monday())))
                        })
                        .collect(),
                    None => Vec::new(),
                }
            }
            Frequency::Monthly => first_of_month(rule.start)
                .checked_add_months(Months::new(step))
                .map(|month| clamp_day(month, rule.day_of_month.unwrap_or(rule.start.day())))
                .into_iter()
                .collect(),
            Frequency::Yearly => first_of_month(rule.start)
                .checked_add_months(Months::new(step.saturating_mul(12)))
                .map(|month| clamp_day(month, rule.day_of_month.unwrap_or(rule.start.day())))
                .into_iter()
                .collect(),
        };
        if candidates.is_empty() {
            return false;
        }
        candidates.reverse();
        self.pending = candidates;
        self.period += 1;
        true
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            if self.done {
                return None;
            }
            if let Some(count) = self.rule.count {
                if self.emitted >= count {
                    self.done = true;
                    return None;
                }
            }
            let Some(candidate) = self.pending.pop() else {
                if !self.refill() {
                    self.done = true;
                }
                continue;
            };
            // The first period may contain dates before the anchor.
            if candidate < self.rule.start {
                continue;
            }
            if self.rule.end.is_some_and(|end| candidate > end) {
                self.done = true;
                return None;
            }
            self.emitted += 1;
            return Some(candidate);
        }
    }
}

/// Number of whole rule periods between `rule.start` and the period holding `target`.
fn periods_before(rule: &RecurrenceRule, target: NaiveDate) -> u32 {
    let elapsed = match rule.frequency {
        Frequency::Daily => (target - rule.start).num_days(),
        Frequency::Weekly => (monday_of(target) - monday_of(rule.start)).num_days() / 7,
        Frequency::Monthly => months_between(rule.start, target),
        Frequency::Yearly => i64::from(target.year() - rule.start.year()),
    };
    let periods = elapsed.max(0) / i64::from(rule.interval.max(1));
    u32::try_from(periods).unwrap_or(u32::MAX)
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let from_index = i64::from(from.year()) * 12 + i64::from(from.month0());
    let to_index = i64::from(to.year()) * 12 + i64::from(to.month0());
    to_index - from_index
}

/// Returns the Monday of the ISO week containing `date`.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Number of days in the month of `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = first_of_month(date);
    match first.checked_add_months(Months::new(1)) {
        Some(next) => (next - first).num_days() as u32,
        None => 31,
    }
}

/// Places `day` in the month starting at `first`, clamped to the month's last day.
fn clamp_day(first: NaiveDate, day: u32) -> NaiveDate {
    let day = day.clamp(1, days_in_month(first));
    first.with_day(day).unwrap_or(first)
}
