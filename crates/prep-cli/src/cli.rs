//! CLI argument definitions for `prep-refresh`.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "prep-refresh",
    version,
    about = "Screening eligibility and status refresh for visit prep sheets",
    long_about = "Recompute screening eligibility and due/complete status for the patients \
                  of a tenant.\n\n\
                  Works against a JSON dataset; only patients and definitions touched since \
                  the last refresh are reprocessed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow clinical text (OCR output, match input) in debug logs.
    #[arg(long = "log-phi", global = true)]
    pub log_phi: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one refresh cycle for a tenant and save the dataset.
    Refresh(RefreshArgs),

    /// Score free text against screening keywords.
    Match(MatchArgs),

    /// Explain why a patient is or is not eligible for a screening type.
    Explain(ExplainArgs),

    /// List screening types grouped into variant families.
    Families(FamiliesArgs),
}

#[derive(Args)]
pub struct RefreshArgs {
    /// JSON dataset to refresh in place.
    #[arg(value_name = "DATASET")]
    pub dataset: PathBuf,

    #[arg(long = "tenant", value_name = "ID")]
    pub tenant: u64,

    /// Reprocess even when nothing changed since the last refresh.
    #[arg(long = "force")]
    pub force: bool,

    /// Restrict a manual refresh to these patients (repeatable).
    #[arg(long = "patient", value_name = "ID")]
    pub patients: Vec<u64>,

    /// Change cutoff (RFC 3339); defaults to the last refresh time.
    #[arg(long = "cutoff", value_name = "RFC3339")]
    pub cutoff: Option<DateTime<Utc>>,

    /// Evaluation date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long = "today", value_name = "DATE")]
    pub today: Option<NaiveDate>,

    /// Engine configuration (TOML).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run the cycle without writing the dataset back.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("input").required(true).args(["text", "file"]))]
pub struct MatchArgs {
    /// Keyword to look for (repeatable).
    #[arg(long = "keyword", value_name = "K", required = true)]
    pub keywords: Vec<String>,

    #[arg(long = "text", value_name = "T")]
    pub text: Option<String>,

    /// Read the text from a file.
    #[arg(long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Minimum confidence (default from config, 0.75).
    #[arg(long = "threshold", value_name = "F")]
    pub threshold: Option<f32>,

    /// Engine configuration (TOML).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExplainArgs {
    #[arg(value_name = "DATASET")]
    pub dataset: PathBuf,

    #[arg(long = "patient", value_name = "ID")]
    pub patient: u64,

    #[arg(long = "screening-type", value_name = "ID")]
    pub screening_type: u64,

    /// Evaluation date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long = "today", value_name = "DATE")]
    pub today: Option<NaiveDate>,
}

#[derive(Args)]
pub struct FamiliesArgs {
    #[arg(value_name = "DATASET")]
    pub dataset: PathBuf,

    #[arg(long = "tenant", value_name = "ID")]
    pub tenant: u64,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
