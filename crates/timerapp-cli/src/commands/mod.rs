pub mod config;
pub mod history;
pub mod timer;

use std::sync::Arc;

use timerapp_core::{Config, Database, TimerStore};
use tracing::debug;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the timer store in the data directory, with config defaults applied.
pub fn open_store(config: &Config) -> Result<TimerStore, Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    debug!(halfway_alert = config.timer.halfway_alert, "opened timer store");
    Ok(TimerStore::load(db).with_halfway_alert_default(config.timer.halfway_alert))
}
