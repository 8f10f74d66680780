use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "searchruler", version, about = "Declarative alerting engine")]
pub struct Args {
    /// Replays change-feed events from a static JSON file instead of
    /// waiting on a live upstream source; intended for local/dev runs.
    #[arg(long)]
    pub rules_file: Option<PathBuf>,

    /// Overrides SEARCHRULER_LOG_FORMAT ("text" or "json").
    #[arg(long)]
    pub log_format: Option<String>,
}
