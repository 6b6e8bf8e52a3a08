pub mod export;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;

/// Export the revision history of MediaWiki articles into a git repository
#[derive(Debug, Parser)]
#[command(name = "mw2git")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Article titles to export
    #[arg(required = true)]
    pub articles: Vec<String>,

    /// Wikipedia language code (default: from $LANG)
    #[arg(short, long, conflicts_with = "site")]
    pub lang: Option<String>,

    /// Wiki site URL for non-Wikipedia installations
    #[arg(short, long)]
    pub site: Option<String>,

    /// Output directory, or stream file with --no-import
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Write the fast-import stream to stdout (or the --out file) instead
    /// of importing it
    #[arg(short = 'n', long)]
    pub no_import: bool,

    /// Create a bare repository
    #[arg(short, long)]
    pub bare: bool,

    /// Branch to commit the history to
    #[arg(long, default_value = "master")]
    pub branch: String,

    /// Only export revisions from this date on (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub since: Option<NaiveDate>,

    /// Only export revisions up to this date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub until: Option<NaiveDate>,

    /// Replace revision references in edit summaries with commit ids
    #[arg(long)]
    pub rewrite_refs: bool,

    /// Strip wikilink boilerplate from revert summaries
    #[arg(long)]
    pub denoise: bool,

    /// Cross-check every diff reconstruction against fetched full text
    #[arg(long)]
    pub verify: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("invalid date `{}` (expected YYYY-MM-DD): {}", raw, e))
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    export::run(cli)
}
