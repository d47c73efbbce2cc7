//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "curio";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_NAMESPACE: &str = "curio";
const DEFAULT_ENTRY_TTL_SECS: u64 = 3600;
const DEFAULT_LOCK_TTL_SECS: u64 = 10;
const DEFAULT_LOCK_WAIT_MS: u64 = 200;
const DEFAULT_MEMBERSHIP_TTL_SECS: u64 = 1800;
const DEFAULT_SCAN_BATCH: u64 = 200;
const DEFAULT_LISTING_LIMIT: u64 = 20;
const DEFAULT_LISTING_MAX_LIMIT: u64 = 100;

/// Command-line arguments for the Curio binary.
#[derive(Debug, Parser)]
#[command(name = "curio", version, about = "Curio content listing service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CURIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print one listing page as JSON, as seen by the given viewer.
    List(ListArgs),
    /// Drop cached listings or membership sets.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Viewer role (guest|member|content_admin|super_admin).
    #[arg(long, default_value = "guest", value_name = "ROLE")]
    pub role: String,

    /// Viewer user id; guests may omit it.
    #[arg(long = "viewer-id", value_name = "UUID")]
    pub viewer_id: Option<Uuid>,

    /// Filter as a JSON object, e.g. `{"page":2,"genres":["drama"]}`.
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(subcommand)]
    pub target: InvalidateTarget,
}

#[derive(Debug, Subcommand, Clone)]
pub enum InvalidateTarget {
    /// Drop the whole cache namespace.
    All,
    /// Drop listings embedding one item.
    Item { id: Uuid },
    /// Drop listings embedding any item of one series.
    Series { id: Uuid },
    /// Drop listings embedding or filtered to one author.
    Author { id: Uuid },
    /// Drop one user's cached group memberships.
    #[command(name = "user-groups")]
    UserGroups { id: Uuid },
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        global = true,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", global = true, value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the redis connection URL.
    #[arg(long = "redis-url", global = true, value_name = "URL")]
    pub redis_url: Option<String>,

    /// Toggle the listing cache.
    #[arg(
        long = "cache-enabled",
        global = true,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub listing: ListingSettings,
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
    /// Per-statement limit applied inside listing transactions.
    pub statement_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub namespace: String,
    pub entry_ttl_seconds: NonZeroU32,
    pub lock_ttl_seconds: NonZeroU32,
    pub lock_wait_ms: u64,
    pub membership_ttl_seconds: NonZeroU32,
    pub scan_batch: NonZeroU32,
}

/// Lock filter applied to privileged roles that did not ask for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegedLockDefault {
    Unlocked,
    Any,
}

#[derive(Debug, Clone)]
pub struct ListingSettings {
    pub default_limit: NonZeroU32,
    pub max_limit: NonZeroU32,
    pub timezone: Tz,
    pub privileged_lock_default: PrivilegedLockDefault,
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

    builder = builder.add_source(Environment::with_prefix("CURIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_runtime_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    listing: RawListingSettings,
}

impl RawSettings {
    fn apply_runtime_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            listing,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let listing = build_listing_settings(listing)?;

        Ok(Self {
            logging,
            database,
            cache,
            listing,
        })
    }
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

    let statement_timeout = match database.statement_timeout_ms {
        None | Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
    };

    Ok(DatabaseSettings {
        url,
        max_connections,
        statement_timeout,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("") => CacheBackend::Memory,
        Some(value) if value.eq_ignore_ascii_case("memory") => CacheBackend::Memory,
        Some(value) if value.eq_ignore_ascii_case("redis") => CacheBackend::Redis,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected memory|redis)"),
            ));
        }
    };

    let redis_url = non_blank(cache.redis_url);
    if backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend = \"redis\"",
        ));
    }

    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace.is_empty() {
        return Err(LoadError::invalid("cache.namespace", "must not be empty"));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(LoadError::invalid(
            "cache.namespace",
            "may only contain ASCII letters, digits, `_`, `-` and `.`",
        ));
    }

    let entry_ttl_seconds = non_zero_u32(
        cache.entry_ttl_seconds.unwrap_or(DEFAULT_ENTRY_TTL_SECS),
        "cache.entry_ttl_seconds",
    )?;
    let lock_ttl_seconds = non_zero_u32(
        cache.lock_ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS),
        "cache.lock_ttl_seconds",
    )?;
    let membership_ttl_seconds = non_zero_u32(
        cache
            .membership_ttl_seconds
            .unwrap_or(DEFAULT_MEMBERSHIP_TTL_SECS),
        "cache.membership_ttl_seconds",
    )?;
    let scan_batch = non_zero_u32(
        cache.scan_batch.unwrap_or(DEFAULT_SCAN_BATCH),
        "cache.scan_batch",
    )?;

    let lock_wait_ms = cache.lock_wait_ms.unwrap_or(DEFAULT_LOCK_WAIT_MS);
    if lock_wait_ms >= u64::from(lock_ttl_seconds.get()) * 1000 {
        return Err(LoadError::invalid(
            "cache.lock_wait_ms",
            "must be shorter than cache.lock_ttl_seconds",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        redis_url,
        namespace,
        entry_ttl_seconds,
        lock_ttl_seconds,
        lock_wait_ms,
        membership_ttl_seconds,
        scan_batch,
    })
}

fn build_listing_settings(listing: RawListingSettings) -> Result<ListingSettings, LoadError> {
    let default_limit = non_zero_u32(
        listing.default_limit.unwrap_or(DEFAULT_LISTING_LIMIT),
        "listing.default_limit",
    )?;
    let max_limit = non_zero_u32(
        listing.max_limit.unwrap_or(DEFAULT_LISTING_MAX_LIMIT),
        "listing.max_limit",
    )?;
    if default_limit > max_limit {
        return Err(LoadError::invalid(
            "listing.default_limit",
            "must not exceed listing.max_limit",
        ));
    }

    let timezone = match non_blank(listing.timezone) {
        Some(name) => Tz::from_str(&name).map_err(|err| {
            LoadError::invalid("listing.timezone", format!("unknown timezone `{name}`: {err}"))
        })?,
        None => Tz::UTC,
    };

    let privileged_lock_default = match listing.privileged_lock_default.as_deref().map(str::trim) {
        None | Some("") => PrivilegedLockDefault::Any,
        Some(value) if value.eq_ignore_ascii_case("any") => PrivilegedLockDefault::Any,
        Some(value) if value.eq_ignore_ascii_case("unlocked") => PrivilegedLockDefault::Unlocked,
        Some(other) => {
            return Err(LoadError::invalid(
                "listing.privileged_lock_default",
                format!("unknown value `{other}` (expected unlocked|any)"),
            ));
        }
    };

    Ok(ListingSettings {
        default_limit,
        max_limit,
        timezone,
        privileged_lock_default,
    })
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
    statement_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    redis_url: Option<String>,
    namespace: Option<String>,
    entry_ttl_seconds: Option<u64>,
    lock_ttl_seconds: Option<u64>,
    lock_wait_ms: Option<u64>,
    membership_ttl_seconds: Option<u64>,
    scan_batch: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawListingSettings {
    default_limit: Option<u64>,
    max_limit: Option<u64>,
    timezone: Option<String>,
    privileged_lock_default: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
