// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// Two flags read the environment when not given on the command line:
//   --token       <- GITHUB_TOKEN
//   --output-dir  <- SAVE_DIRECTORY
// main.rs loads a .env file first, so both can live there too.
// =============================================================================

use crate::config::{DEFAULT_API_URL, DEFAULT_BRANCH, DEFAULT_CONCURRENCY};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use url::Url;

/// Exclusion list read when --exclusions is not given
pub const DEFAULT_EXCLUSION_FILE: &str = "exclusion_list.txt";

#[derive(Parser, Debug)]
#[command(
    name = "repo-ripper",
    version,
    about = "Rip every text file of a GitHub repository into one archive",
    long_about = "repo-ripper lists a repository branch through the GitHub API, fetches every \
                  file that survives the exclusion list, and writes all text files into a \
                  single {repo}.txt archive. It respects the API rate limit and waits for \
                  quota resets instead of failing."
)]
pub struct Cli {
    /// GitHub repository URL or owner/name
    ///
    /// Example: repo-ripper https://github.com/rust-lang/rust
    #[arg(required_unless_present = "show_exclusions")]
    pub repo: Option<String>,

    /// Directory the archive is written to (created if missing)
    #[arg(short, long, env = "SAVE_DIRECTORY", default_value = ".")]
    pub output_dir: PathBuf,

    /// Exclusion list file, one substring per line
    #[arg(short = 'x', long, value_name = "FILE")]
    pub exclusions: Option<PathBuf>,

    /// Only apply these entries of the exclusion list (1-based)
    ///
    /// Example: --select 1 3 5
    #[arg(long, num_args = 1.., value_name = "N")]
    pub select: Vec<usize>,

    /// Extra substring to exclude (repeatable)
    #[arg(short = 'e', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Print the numbered exclusion list and exit
    #[arg(long)]
    pub show_exclusions: bool,

    /// Branch to rip
    #[arg(short, long, default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Maximum number of files fetched at the same time
    #[arg(short = 'j', long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// List the files that would be fetched, without fetching them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Abort the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Give up instead of waiting longer than this for a quota reset
    #[arg(long, value_name = "SECS", default_value_t = 3900)]
    pub max_wait: u64,

    /// GitHub access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub API base URL (for GitHub Enterprise)
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: Url,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Exclusion file to read, and whether the user named it explicitly
    pub fn exclusion_file(&self) -> (PathBuf, bool) {
        match &self.exclusions {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_EXCLUSION_FILE), false),
        }
    }
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    let n: usize = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if n == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    Ok(n)
}
