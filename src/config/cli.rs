use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the idemgate binary.
#[derive(Debug, Parser)]
#[command(name = "idemgate", version, about = "Idempotency-key gateway demo server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "IDEMGATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
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

    /// Override the snapshot lifetime in milliseconds.
    #[arg(long = "idempotency-ttl-ms", value_name = "MILLISECONDS")]
    pub idempotency_ttl_ms: Option<u64>,

    /// Override the maximum idempotency key length in bytes (0 disables the check).
    #[arg(
        long = "idempotency-max-key-length",
        value_name = "BYTES",
        allow_negative_numbers = true
    )]
    pub idempotency_max_key_length: Option<i64>,

    /// Toggle rejection of keys reused for a different request.
    #[arg(
        long = "idempotency-request-matching",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub idempotency_request_matching: Option<bool>,

    /// Override the largest response body that is captured.
    #[arg(long = "idempotency-max-response-bytes", value_name = "BYTES")]
    pub idempotency_max_response_bytes: Option<u64>,

    /// Override the number of snapshots kept in memory.
    #[arg(long = "store-capacity", value_name = "COUNT")]
    pub store_capacity: Option<u64>,

    /// Override the largest request body accepted.
    #[arg(long = "body-max-request-bytes", value_name = "BYTES")]
    pub body_max_request_bytes: Option<u64>,
}
