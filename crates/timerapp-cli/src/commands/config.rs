use clap::Subcommand;
use timerapp_core::Config;

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get {
        /// Dot-path key, see `config list`
        key: String,
    },
    /// Change one setting and save it
    Set {
        /// Dot-path key, e.g. "timer.tick_interval_ms" or "export.file_name"
        key: String,
        /// New value, parsed as the key's type
        value: String,
    },
    /// Print every setting as `key = value`
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the config file location
    Path,
    /// Restore the default settings
    Reset,
}

fn unknown_key(key: &str, config: &Config) -> String {
    format!("unknown key '{key}' (known: {})", config.keys().join(", "))
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key).ok_or_else(|| unknown_key(&key, &config))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("{key} = {}", config.get(&key).unwrap_or(value));
        }
        ConfigAction::List { json } => {
            let config = Config::load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                for key in config.keys() {
                    println!("{key} = {}", config.get(&key).unwrap_or_default());
                }
            }
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("restored default settings");
        }
    }
    Ok(())
}
