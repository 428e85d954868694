//! Recurrence expansion commands.

use cadence_core::{RecurrenceRule, expand};
use chrono::NaiveDate;

use crate::commands::print_json;
use crate::error::CliResult;

/// Lists the occurrences of `rule` within `[from, to)`.
pub fn run(rule: &RecurrenceRule, from: NaiveDate, to: NaiveDate, json: bool) -> CliResult<()> {
    let dates = expand(rule, from, to)?;
    if json {
        return print_json(&dates);
    }
    for date in &dates {
        println!("{} {}", date, date.format("%a"));
    }
    if dates.is_empty() {
        println!("No occurrences from {from} until {to}.");
    }
    Ok(())
}

/// Shows the first occurrence strictly after `after`.
pub fn next(rule: &RecurrenceRule, after: NaiveDate, json: bool) -> CliResult<()> {
    let next = rule.next_occurrence(after)?;
    if json {
        return print_json(&next);
    }
    match next {
        Some(date) => println!("{} {}", date, date.format("%A")),
        None => println!("The series ends before {after}."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::Frequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn inverted_window_is_an_error() {
        let rule = RecurrenceRule::daily(date(2024, 1, 1));
        assert!(run(&rule, date(2024, 2, 1), date(2024, 1, 1), false).is_err());
    }

    #[test]
    fn invalid_rule_is_an_error() {
        let rule = RecurrenceRule::new(Frequency::Daily, date(2024, 1, 1)).with_interval(0);
        assert!(next(&rule, date(2024, 1, 1), true).is_err());
    }

    #[test]
    fn valid_rule_prints() {
        let rule = RecurrenceRule::monthly(date(2024, 1, 31), 31);
        run(&rule, date(2024, 1, 1), date(2024, 6, 30), true).unwrap();
        next(&rule, date(2024, 6, 30), false).unwrap();
    }
}
