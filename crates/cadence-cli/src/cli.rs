//! Command-line interface definition.

use std::path::PathBuf;

use cadence_core::{Frequency, Granularity, RecurrenceRule, TimezoneError, parse_timezone};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use clap::{Args, Parser, Subcommand};

/// cadence - recurring schedules, streaks and calendar sync
#[derive(Debug, Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "CADENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the occurrences of a rule from a date up to (excluding) another
    Expand {
        #[command(flatten)]
        rule: RuleArgs,

        /// First date of the window
        #[arg(long)]
        from: NaiveDate,

        /// End of the window, excluded
        #[arg(long)]
        to: NaiveDate,
    },

    /// Show the first occurrence of a rule after a date
    Next {
        #[command(flatten)]
        rule: RuleArgs,

        /// Search strictly after this date
        #[arg(long)]
        after: NaiveDate,
    },

    /// Show the day, week, month or year containing an instant
    Bounds {
        /// day, week, month or year
        granularity: Granularity,

        /// Instant to look at (RFC 3339), now when omitted
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// IANA timezone, defaults to the configured one
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Compute the streak and weekly trend of a habit
    Streak {
        #[command(flatten)]
        rule: RuleArgs,

        /// Completed occurrence date (can be repeated)
        #[arg(long = "completed", action = clap::ArgAction::Append)]
        completed: Vec<NaiveDate>,

        /// Evaluate as of this date instead of today
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Weeks in the trend, defaults to the configured value
        #[arg(long)]
        weeks: Option<u32>,
    },

    /// Reconcile a file of provider events into the local state
    Sync {
        /// Connection id from the configuration
        #[arg(long)]
        connection: String,

        /// JSON array of native provider events
        #[arg(long)]
        events: PathBuf,

        /// State file, defaults to the configured one
        #[arg(long)]
        state: Option<PathBuf>,

        /// Record the run as triggered by this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the current configuration
    Dump,
    /// Validate the configuration file
    Validate,
    /// Show the configuration file path
    Path,
}

/// Recurrence rule flags shared by the rule-based commands.
#[derive(Debug, Clone, Args)]
pub struct RuleArgs {
    /// daily, weekly, monthly or yearly
    #[arg(long, short = 'f')]
    pub frequency: Frequency,

    /// Anchor date of the series
    #[arg(long)]
    pub start: NaiveDate,

    /// Every N periods
    #[arg(long, default_value_t = 1)]
    pub interval: u32,

    /// Weekday of a weekly rule (can be repeated)
    #[arg(long = "weekday", action = clap::ArgAction::Append)]
    pub weekdays: Vec<Weekday>,

    /// Day of month of a monthly or yearly rule
    #[arg(long)]
    pub day_of_month: Option<u32>,

    /// Last date of the series (inclusive)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Number of occurrences in the series
    #[arg(long)]
    pub count: Option<u32>,

    /// IANA timezone of the rule
    #[arg(long)]
    pub timezone: Option<String>,
}

impl RuleArgs {
    /// Builds the rule. `default_tz` applies when no `--timezone` was given.
    pub fn to_rule(&self, default_tz: chrono_tz::Tz) -> Result<RecurrenceRule, TimezoneError> {
        let timezone = match self.timezone {
            Some(ref name) => parse_timezone(name)?,
            None => default_tz,
        };
        let mut rule = RecurrenceRule::new(self.frequency, self.start)
            .with_interval(self.interval)
            .with_weekdays(self.weekdays.iter().copied())
            .with_timezone(timezone);
        if let Some(day) = self.day_of_month {
            rule = rule.with_day_of_month(day);
        }
        if let Some(end) = self.end {
            rule = rule.with_end(end);
        }
        if let Some(count) = self.count {
            rule = rule.with_count(count);
        }
        Ok(rule)
    }
}
