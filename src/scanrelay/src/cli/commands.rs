use crate::config::default_data_dir;
use crate::constants::{LOG_FILE, STORE_FILE};
use crate::event::CardUid;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn footer_message() -> String {
    let data_dir = default_data_dir();
    format!(
        "Default offline store: {:?}\nDefault log file: {:?}\nEvery setting can be overridden with a SCANRELAY_<KEY> environment variable.\n",
        data_dir.join(STORE_FILE),
        data_dir.join(LOG_FILE),
    )
}

#[derive(Parser, Clone, Debug)]
#[clap(
    name = "scanrelay",
    about = "Forwards RFID scans to an ingestion endpoint, buffering them on disk while offline",
    version,
    after_help = footer_message()
)]
pub struct Cli {
    /// Path to a TOML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the capture and forwarding loop
    Run,

    /// Run one reconciliation pass over the offline backlog and exit
    Drain,

    /// Show the offline backlog
    Queue {
        /// Output the backlog as JSON
        #[clap(long)]
        json: bool,
    },

    /// Capture a single card as if it had been read
    Scan {
        /// Card id, e.g. 0x04a1b2c3
        card: CardUid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan_with_config() {
        let cli = Cli::try_parse_from(["scanrelay", "--config", "relay.toml", "scan", "04:a1:b2:c3"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));
        match cli.command {
            Command::Scan { card } => assert_eq!(card.to_string(), "0x04a1b2c3"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_card() {
        assert!(Cli::try_parse_from(["scanrelay", "scan", "0x12"]).is_err());
    }

    #[test]
    fn test_parse_queue_json() {
        let cli = Cli::try_parse_from(["scanrelay", "queue", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Queue { json: true }));
    }
}
