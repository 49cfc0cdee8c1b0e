use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5152 or config.listen_port)

Command-line flags take precedence over environment variables.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "lillearner-server",
    version,
    about = "LilLearner progress server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Path to the SQLite database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Listen port
    #[arg(long)]
    pub port: Option<u16>,
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the config and catalog, print a summary and exit
    CheckConfig,
    /// Recompute every child's XP total and level from the XP ledger
    RebuildLevels,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(lillearner_server::server::DEFAULT_CONFIG_PATH))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .or_else(|| std::env::var_os("DB_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data/app.db"))
    }

    /// Flag, then `PORT`, then the config value.
    pub fn port(&self, config_port: u16) -> u16 {
        self.port
            .or_else(|| {
                std::env::var("PORT")
                    .ok()
                    .and_then(|s| s.parse::<u16>().ok())
            })
            .unwrap_or(config_port)
    }
}
