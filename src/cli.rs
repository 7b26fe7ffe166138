//! Command-line surface for the batch driver.

use clap::{Parser, Subcommand};

/// rehome - adoptable-dog listing aggregator
///
/// Runs a fleet of per-organization scrapers against rescue websites,
/// reconciles the results with the store, and emits a JSON run summary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run all enabled scrapers (the default command)
    RunCron {
        /// Run only this organization (config id)
        #[arg(long)]
        org: Option<String>,
        /// Show what would run without executing
        #[arg(long)]
        dry_run: bool,
        /// List available scrapers and their status
        #[arg(long)]
        list: bool,
        /// Emit only the machine-readable JSON summary on stdout
        #[arg(long)]
        json: bool,
    },
    /// Check adoption status of animals missing from recent scrapes
    CheckAdoptions {
        /// Check only this organization (config id)
        #[arg(long)]
        org: Option<String>,
        /// Check every organization with adoption checking enabled
        #[arg(long)]
        all: bool,
    },
    /// Score stored data quality per organization
    Quality {
        /// Limit the report to this organization (config id)
        #[arg(long)]
        org: Option<String>,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// The default when no subcommand is given: a full cron run.
    pub fn default_run() -> Self {
        Command::RunCron {
            org: None,
            dry_run: false,
            list: false,
            json: false,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Json;

fn default_tracing_format() -> TracingFormat {
    DEFAULT_TRACING_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_run_cron() {
        let args = Args::try_parse_from(["rehome"]).unwrap();
        assert!(args.command.is_none());
        assert!(matches!(Command::default_run(), Command::RunCron { .. }));
    }

    #[test]
    fn test_run_cron_flags() {
        let args =
            Args::try_parse_from(["rehome", "run-cron", "--org", "pawsofhope", "--json"]).unwrap();
        match args.command {
            Some(Command::RunCron { org, json, dry_run, list }) => {
                assert_eq!(org.as_deref(), Some("pawsofhope"));
                assert!(json);
                assert!(!dry_run);
                assert!(!list);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        assert!(Args::try_parse_from(["rehome", "run-cron", "--bogus"]).is_err());
    }
}
