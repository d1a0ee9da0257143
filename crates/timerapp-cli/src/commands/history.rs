use std::path::PathBuf;

use clap::Subcommand;
use timerapp_core::view::HistoryRow;
use timerapp_core::{Config, CoreError, ExportError};

use super::{open_store, CliResult};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List completed runs, oldest first
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the raw history JSON to a file
    Export {
        /// Destination file (defaults to export.file_name in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

pub fn run(action: HistoryAction) -> CliResult {
    let config = Config::load()?;
    let store = open_store(&config)?;

    match action {
        HistoryAction::List { json } => {
            let rows: Vec<HistoryRow> = store
                .history()
                .entries()
                .iter()
                .map(HistoryRow::from_entry)
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No timers completed yet.");
            } else {
                for row in rows {
                    println!("✅ {}  {}  ⏱ {}", row.completed_at, row.name, row.duration);
                }
            }
        }
        HistoryAction::Export { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from(&config.export.file_name));
            match store.history().export_to(&path) {
                Ok(path) => println!("exported history to {}", path.display()),
                Err(CoreError::Export(ExportError::NoHistory)) => {
                    println!("No history data to export.");
                }
                Err(e) => return Err(format!("Failed to export history: {e}").into()),
            }
        }
    }
    Ok(())
}
