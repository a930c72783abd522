//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::idempotency::{
    DEFAULT_IGNORED_RESPONSE_HEADERS, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_KEY_LENGTH,
    DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_NAMESPACE, DEFAULT_SUPPORTED_METHODS, DEFAULT_TTL,
    ttl_millis,
};

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "idemgate";
const ENV_PREFIX: &str = "IDEMGATE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub idempotency: IdempotencySettings,
    pub store: StoreSettings,
    pub body: BodySettings,
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
pub struct IdempotencySettings {
    pub ttl: Duration,
    pub supported_methods: Vec<String>,
    pub ignored_response_headers: Vec<String>,
    pub request_matching_checks_enabled: bool,
    /// `0` disables the length check.
    pub max_key_length: usize,
    pub max_response_bytes: usize,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct BodySettings {
    pub max_request_bytes: usize,
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

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("idempotency.supported_methods")
            .with_list_parse_key("idempotency.ignored_response_headers")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
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
    idempotency: RawIdempotencySettings,
    store: RawStoreSettings,
    body: RawBodySettings,
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
        if let Some(ttl) = overrides.idempotency_ttl_ms {
            self.idempotency.ttl_ms = Some(ttl);
        }
        if let Some(max) = overrides.idempotency_max_key_length {
            self.idempotency.max_key_length = Some(max);
        }
        if let Some(enabled) = overrides.idempotency_request_matching {
            self.idempotency.request_matching_checks_enabled = Some(enabled);
        }
        if let Some(max) = overrides.idempotency_max_response_bytes {
            self.idempotency.max_response_bytes = Some(max);
        }
        if let Some(capacity) = overrides.store_capacity {
            self.store.capacity = Some(capacity);
        }
        if let Some(max) = overrides.body_max_request_bytes {
            self.body.max_request_bytes = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            idempotency,
            store,
            body,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            idempotency: build_idempotency_settings(idempotency)?,
            store: build_store_settings(store)?,
            body: build_body_settings(body)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

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

fn build_idempotency_settings(
    raw: RawIdempotencySettings,
) -> Result<IdempotencySettings, LoadError> {
    let ttl_ms = raw.ttl_ms.unwrap_or(ttl_millis(DEFAULT_TTL));
    if ttl_ms == 0 {
        return Err(LoadError::invalid(
            "idempotency.ttl_ms",
            "must be greater than zero",
        ));
    }

    let max_key_length = match raw.max_key_length {
        Some(value) => usize::try_from(value).map_err(|_| {
            LoadError::invalid(
                "idempotency.max_key_length",
                format!("must be a non-negative integer, got {value}"),
            )
        })?,
        None => DEFAULT_MAX_KEY_LENGTH,
    };

    let supported_methods = raw.supported_methods.unwrap_or_else(|| {
        DEFAULT_SUPPORTED_METHODS
            .iter()
            .map(|m| m.to_string())
            .collect()
    });
    if supported_methods.iter().any(|m| m.trim().is_empty()) {
        return Err(LoadError::invalid(
            "idempotency.supported_methods",
            "method names must not be empty",
        ));
    }

    let ignored_response_headers = raw.ignored_response_headers.unwrap_or_else(|| {
        DEFAULT_IGNORED_RESPONSE_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect()
    });

    let max_response_bytes = to_usize(
        raw.max_response_bytes
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES as u64),
        "idempotency.max_response_bytes",
    )?;

    let namespace = raw
        .namespace
        .map(|ns| ns.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace.is_empty() {
        return Err(LoadError::invalid(
            "idempotency.namespace",
            "must not be empty",
        ));
    }

    Ok(IdempotencySettings {
        ttl: Duration::from_millis(ttl_ms),
        supported_methods,
        ignored_response_headers,
        request_matching_checks_enabled: raw.request_matching_checks_enabled.unwrap_or(true),
        max_key_length,
        max_response_bytes,
        namespace,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let capacity = to_usize(
        store.capacity.unwrap_or(DEFAULT_STORE_CAPACITY as u64),
        "store.capacity",
    )?;
    let capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("store.capacity", "must be greater than zero"))?;
    Ok(StoreSettings { capacity })
}

fn build_body_settings(body: RawBodySettings) -> Result<BodySettings, LoadError> {
    let max_request_bytes = to_usize(
        body.max_request_bytes
            .unwrap_or(DEFAULT_MAX_BODY_BYTES as u64),
        "body.max_request_bytes",
    )?;
    if max_request_bytes == 0 {
        return Err(LoadError::invalid(
            "body.max_request_bytes",
            "must be greater than zero",
        ));
    }
    Ok(BodySettings { max_request_bytes })
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
struct RawIdempotencySettings {
    ttl_ms: Option<u64>,
    supported_methods: Option<Vec<String>>,
    ignored_response_headers: Option<Vec<String>>,
    request_matching_checks_enabled: Option<bool>,
    max_key_length: Option<i64>,
    max_response_bytes: Option<u64>,
    namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBodySettings {
    max_request_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn to_usize(value: u64, key: &'static str) -> Result<usize, LoadError> {
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

#[cfg(test)]
mod tests;
