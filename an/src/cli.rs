//! Command-line surface of `an`

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::analysis::AnalysisMode;

/// Analyst - multi-period research analysis
#[derive(Parser)]
#[command(
    name = "an",
    about = "Multi-period research analyst built on a tool-augmented reasoning loop",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Config file to use instead of the search chain
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze one or more subjects
    Analyze {
        /// Subjects to analyze, e.g. tickers
        #[arg(required = true, value_name = "SUBJECT")]
        subjects: Vec<String>,

        /// Reporting periods to cover, most recent first
        #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
        depth: u32,

        /// quick (synthesis only) or standard (with review)
        #[arg(short, long, default_value = "standard")]
        mode: AnalysisMode,

        /// Directory of pre-fetched filings and metrics
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        /// Directory reports are written to
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// List registered tools and their schemas
    Tools,

    /// Print the resolved configuration
    Config,

    /// Tail the analyst log
    Logs {
        /// Lines from the end
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// `<data-local-dir>/analyst/logs/analyst.log`
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("analyst")
        .join("logs")
        .join("analyst.log");
    debug!(?path, "get_log_path: called");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from(["an", "-l", "debug", "analyze", "ACME", "BETA", "--depth", "2", "--mode", "quick"])
            .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Analyze {
                subjects, depth, mode, ..
            } => {
                assert_eq!(subjects, vec!["ACME", "BETA"]);
                assert_eq!(depth, 2);
                assert_eq!(mode, AnalysisMode::Quick);
            }
            other => panic!("expected analyze, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        assert!(Cli::try_parse_from(["an", "analyze", "ACME", "--depth", "0"]).is_err());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["an", "analyze", "ACME", "--mode", "thorough"]).is_err());
    }

    #[test]
    fn test_log_path_ends_with_analyst_log() {
        assert!(get_log_path().ends_with("analyst/logs/analyst.log"));
    }
}
