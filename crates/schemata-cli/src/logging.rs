//! Log setup for the CLI.

use std::str::FromStr;

use clap::Args;
use tracing::Level;

/// Environment override for the log level (`error|warn|info|debug|trace`).
pub const LOG_ENV: &str = "SCHEMATA_LOG";

#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl LogArgs {
    pub fn level(&self) -> Level {
        if let Some(level) = std::env::var(LOG_ENV)
            .ok()
            .and_then(|v| Level::from_str(v.trim()).ok())
        {
            return level;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Install the global fmt subscriber on stderr. Safe to call twice.
pub fn init(args: &LogArgs) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(args.level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
