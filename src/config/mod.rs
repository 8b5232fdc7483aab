//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;


use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, MigrateArgs, ServeArgs, ServeOverrides};

use crate::cache::MIN_ENTROPY_BYTES;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_LISTING_TTL_SECS: u64 = 600;
const DEFAULT_LISTING_SWEEP_SECS: u64 = 300;
const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 1800;
const DEFAULT_TOKEN_SWEEP_SECS: u64 = 1800;
const DEFAULT_TOKEN_ENTROPY_BYTES: usize = 32;
const MAX_TOKEN_ENTROPY_BYTES: usize = 256;
const DEFAULT_MAX_WAIT_ROUNDS: u32 = 3;
const MAX_CACHE_DURATION_SECS: u64 = 365 * 24 * 60 * 60;
const DEFAULT_CDN_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
    pub cdn: Option<CdnSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub listing_ttl_seconds: NonZeroU64,
    pub listing_sweep_seconds: NonZeroU64,
    pub token_validity_seconds: NonZeroU64,
    pub token_sweep_seconds: NonZeroU64,
    pub token_entropy_bytes: usize,
    pub token_max_lifetime_seconds: Option<NonZeroU64>,
    pub max_wait_rounds: NonZeroU32,
}

#[derive(Clone, Default)]
pub struct AuthSettings {
    pub sudo_key: Option<String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("sudo_key", &self.sudo_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct CdnSettings {
    pub zone_id: String,
    pub api_token: String,
    pub public_host: String,
    pub api_base: String,
}

impl std::fmt::Debug for CdnSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnSettings")
            .field("zone_id", &self.zone_id)
            .field("api_token", &"<redacted>")
            .field("public_host", &self.public_host)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_migrate_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    auth: RawAuthSettings,
    cdn: RawCdnSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(seconds) = overrides.cache_listing_ttl_seconds {
            self.cache.listing_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_listing_sweep_seconds {
            self.cache.listing_sweep_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_token_validity_seconds {
            self.cache.token_validity_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_token_sweep_seconds {
            self.cache.token_sweep_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_token_max_lifetime_seconds {
            self.cache.token_max_lifetime_seconds = Some(seconds);
        }
        if let Some(rounds) = overrides.cache_max_wait_rounds {
            self.cache.max_wait_rounds = Some(rounds);
        }
    }

    fn apply_migrate_overrides(&mut self, args: &MigrateArgs) {
        if let Some(url) = args.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            auth,
            cdn,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            auth: build_auth_settings(auth),
            cdn: build_cdn_settings(cdn)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let listing_ttl_seconds = cache_duration(
        cache.listing_ttl_seconds.unwrap_or(DEFAULT_LISTING_TTL_SECS),
        "cache.listing_ttl_seconds",
    )?;
    let listing_sweep_seconds = cache_duration(
        cache
            .listing_sweep_seconds
            .unwrap_or(DEFAULT_LISTING_SWEEP_SECS),
        "cache.listing_sweep_seconds",
    )?;
    let token_validity_seconds = cache_duration(
        cache
            .token_validity_seconds
            .unwrap_or(DEFAULT_TOKEN_VALIDITY_SECS),
        "cache.token_validity_seconds",
    )?;
    let token_sweep_seconds = cache_duration(
        cache.token_sweep_seconds.unwrap_or(DEFAULT_TOKEN_SWEEP_SECS),
        "cache.token_sweep_seconds",
    )?;

    let token_entropy_bytes = cache
        .token_entropy_bytes
        .unwrap_or(DEFAULT_TOKEN_ENTROPY_BYTES);
    if !(MIN_ENTROPY_BYTES..=MAX_TOKEN_ENTROPY_BYTES).contains(&token_entropy_bytes) {
        return Err(LoadError::invalid(
            "cache.token_entropy_bytes",
            format!("must be between {MIN_ENTROPY_BYTES} and {MAX_TOKEN_ENTROPY_BYTES}"),
        ));
    }

    let token_max_lifetime_seconds = cache
        .token_max_lifetime_seconds
        .map(|secs| cache_duration(secs, "cache.token_max_lifetime_seconds"))
        .transpose()?;

    let max_wait_rounds = non_zero_u32(
        cache.max_wait_rounds.unwrap_or(DEFAULT_MAX_WAIT_ROUNDS).into(),
        "cache.max_wait_rounds",
    )?;

    Ok(CacheSettings {
        listing_ttl_seconds,
        listing_sweep_seconds,
        token_validity_seconds,
        token_sweep_seconds,
        token_entropy_bytes,
        token_max_lifetime_seconds,
        max_wait_rounds,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    AuthSettings {
        sudo_key: non_blank(auth.sudo_key),
    }
}

/// CDN purging is enabled only when zone, token and host are all present.
fn build_cdn_settings(cdn: RawCdnSettings) -> Result<Option<CdnSettings>, LoadError> {
    let zone_id = non_blank(cdn.zone_id);
    let api_token = non_blank(cdn.api_token);
    let public_host = non_blank(cdn.public_host);

    match (zone_id, api_token, public_host) {
        (None, None, None) => Ok(None),
        (Some(zone_id), Some(api_token), Some(public_host)) => {
            if !public_host.starts_with("http://") && !public_host.starts_with("https://") {
                return Err(LoadError::invalid(
                    "cdn.public_host",
                    "must be an absolute http(s) URL",
                ));
            }
            Ok(Some(CdnSettings {
                zone_id,
                api_token,
                public_host,
                api_base: non_blank(cdn.api_base)
                    .unwrap_or_else(|| DEFAULT_CDN_API_BASE.to_string()),
            }))
        }
        _ => Err(LoadError::invalid(
            "cdn",
            "zone_id, api_token and public_host must be set together",
        )),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    listing_ttl_seconds: Option<u64>,
    listing_sweep_seconds: Option<u64>,
    token_validity_seconds: Option<u64>,
    token_sweep_seconds: Option<u64>,
    token_entropy_bytes: Option<usize>,
    token_max_lifetime_seconds: Option<u64>,
    max_wait_rounds: Option<u32>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    sudo_key: Option<String>,
}

impl std::fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawAuthSettings").finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    zone_id: Option<String>,
    api_token: Option<String>,
    public_host: Option<String>,
    api_base: Option<String>,
}

impl std::fmt::Debug for RawCdnSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCdnSettings")
            .field("zone_id", &self.zone_id)
            .field("public_host", &self.public_host)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Cache windows are added to monotonic instants, so they stay within a year.
fn cache_duration(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    let secs = non_zero_u64(value, key)?;
    if secs.get() > MAX_CACHE_DURATION_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must be at most {MAX_CACHE_DURATION_SECS} seconds"),
        ));
    }
    Ok(secs)
}
