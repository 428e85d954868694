//! cadence CLI entry point.

use std::process::ExitCode;

use cadence_core::{TracingConfig, init_tracing};
use clap::Parser;

use cadence_cli::cli::{Cli, Command, ConfigAction};
use cadence_cli::commands;
use cadence_cli::config::CliConfig;
use cadence_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match cli.config {
        Some(ref path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };

    let tracing = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    init_tracing(tracing)?;

    let json = cli.json;
    match cli.command {
        Command::Expand { rule, from, to } => {
            let rule = rule.to_rule(config.timezone()?)?;
            commands::expand::run(&rule, from, to, json)
        }
        Command::Next { rule, after } => {
            let rule = rule.to_rule(config.timezone()?)?;
            commands::expand::next(&rule, after, json)
        }
        Command::Bounds {
            granularity,
            at,
            timezone,
        } => {
            let tz = match timezone {
                Some(ref name) => cadence_core::parse_timezone(name)?,
                None => config.timezone()?,
            };
            commands::bounds::run(granularity, at, tz, json)
        }
        Command::Streak {
            rule,
            completed,
            today,
            weeks,
        } => {
            let rule = rule.to_rule(config.timezone()?)?;
            let mut tracker = config.tracker_config();
            if let Some(weeks) = weeks {
                tracker = tracker.with_trend_weeks(weeks);
            }
            commands::streak::run(rule, &completed, today, tracker, json).await
        }
        Command::Sync {
            connection,
            events,
            state,
            user,
        } => {
            let state = state.unwrap_or_else(|| config.state_path());
            commands::sync::run(&config, &connection, &events, &state, user, json).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config),
        },
    }
}
