//! wosync command-line shell.
//!
//! Business logic lives in the `crates/` directory; this binary parses
//! arguments, sets up logging, and collects credentials.

mod commands;
mod identity;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use tracing::error;
use wosync_core::ItemKind;

#[derive(Parser)]
#[command(
    name = "wosync",
    version,
    about = "Scrape maintenance portal records into a database"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape a range of record ids
    Scrape {
        #[command(subcommand)]
        target: ScrapeTarget,
    },
    /// Inspect the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Scrape one assignment read from stdin (spawned by `scrape`)
    #[command(hide = true)]
    Worker,
}

#[derive(Subcommand)]
enum ScrapeTarget {
    /// Work order requests (numeric ids)
    Requests(RangeArgs),
    /// Work orders (prefix + number)
    Orders {
        #[command(flatten)]
        range: RangeArgs,
        /// Id prefix, e.g. WO (defaults to scraper.order_prefix)
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RangeArgs {
    /// First id, inclusive
    #[arg(long)]
    pub start: u64,
    /// Last id, exclusive
    #[arg(long)]
    pub stop: u64,
    /// Worker processes (defaults to scraper.process_count, prompted if unset)
    #[arg(long, short = 'p')]
    pub processes: Option<u32>,
    /// Run parallel workers without a window
    #[arg(long, conflicts_with = "headful")]
    pub headless: bool,
    /// Run parallel workers with a window
    #[arg(long)]
    pub headful: bool,
    /// Portal username (or WOSYNC_USERNAME)
    #[arg(long)]
    pub username: Option<String>,
}

impl RangeArgs {
    /// Explicit headless choice, if one was given.
    pub fn headless_override(&self) -> Option<bool> {
        if self.headless {
            Some(true)
        } else if self.headful {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration file location
    Path,
    /// Print the effective configuration
    Show,
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wosync=debug"));

    // stdout carries worker outcomes, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Worker => return commands::worker().await,
        Command::Scrape { target } => match target {
            ScrapeTarget::Requests(range) => commands::scrape(ItemKind::Request, range, None).await,
            ScrapeTarget::Orders { range, prefix } => {
                commands::scrape(ItemKind::Order, range, prefix).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Path => commands::config_path(),
            ConfigAction::Show => commands::config_show(),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_orders() {
        let cli = Cli::try_parse_from([
            "wosync", "scrape", "orders", "--start", "5", "--stop", "7", "--prefix", "WO", "-p",
            "2", "--headless",
        ])
        .expect("parse");

        match cli.command {
            Command::Scrape {
                target: ScrapeTarget::Orders { range, prefix },
            } => {
                assert_eq!((range.start, range.stop), (5, 7));
                assert_eq!(range.processes, Some(2));
                assert_eq!(range.headless_override(), Some(true));
                assert_eq!(prefix.as_deref(), Some("WO"));
            }
            _ => panic!("expected scrape orders"),
        }
    }

    #[test]
    fn test_parse_requests_defaults() {
        let cli = Cli::try_parse_from(["wosync", "scrape", "requests", "--start", "0", "--stop", "3"])
            .expect("parse");

        match cli.command {
            Command::Scrape {
                target: ScrapeTarget::Requests(range),
            } => {
                assert_eq!(range.processes, None);
                assert_eq!(range.headless_override(), None);
                assert!(range.username.is_none());
            }
            _ => panic!("expected scrape requests"),
        }
    }

    #[test]
    fn test_headless_and_headful_conflict() {
        let parsed = Cli::try_parse_from([
            "wosync", "scrape", "requests", "--start", "1", "--stop", "2", "--headless",
            "--headful",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_worker_is_hidden_but_parses() {
        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("worker"));
        assert!(matches!(
            Cli::try_parse_from(["wosync", "worker"]).expect("parse").command,
            Command::Worker
        ));
    }
}
