use clap::Subcommand;
use lockin_core::{Config, Database};

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "short_break_minutes", "auto_attach")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    let db = Database::open()?;
    let config = Config::new(&db);

    match action {
        ConfigAction::Get { key } => {
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let stored = config.set(&key, &value)?;
            println!("{key} = {stored}");
        }
        ConfigAction::List { json } => {
            let all = config.all()?;
            if json {
                let map: serde_json::Map<_, _> = all
                    .into_iter()
                    .map(|(key, value)| Ok((key.to_string(), serde_json::to_value(value)?)))
                    .collect::<Result<_, serde_json::Error>>()?;
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in all {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            config.reset()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
