use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Personal site backend")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override how long a listing page stays cached.
    #[arg(long = "cache-listing-ttl-seconds", value_name = "SECONDS")]
    pub cache_listing_ttl_seconds: Option<u64>,

    /// Override the listing cache sweep period.
    #[arg(long = "cache-listing-sweep-seconds", value_name = "SECONDS")]
    pub cache_listing_sweep_seconds: Option<u64>,

    /// Override the sliding validity window of auth tokens.
    #[arg(long = "cache-token-validity-seconds", value_name = "SECONDS")]
    pub cache_token_validity_seconds: Option<u64>,

    /// Override the auth token sweep period.
    #[arg(long = "cache-token-sweep-seconds", value_name = "SECONDS")]
    pub cache_token_sweep_seconds: Option<u64>,

    /// Cap the total lifetime of an auth token regardless of renewals.
    #[arg(long = "cache-token-max-lifetime-seconds", value_name = "SECONDS")]
    pub cache_token_max_lifetime_seconds: Option<u64>,

    /// Override how many failed producers a waiting request sits through.
    #[arg(long = "cache-max-wait-rounds", value_name = "COUNT")]
    pub cache_max_wait_rounds: Option<u32>,
}
