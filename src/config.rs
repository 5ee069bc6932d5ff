//! Service configuration.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known development account key (base64 encoded). Anyone can sign
/// tokens with it, so deployments that require authentication set their own.
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 10000;

/// Default maximum number of stored access policies per container.
pub const DEFAULT_MAX_POLICIES: usize = 5;

/// Default number of entries per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 5000;

/// Default per-operation timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default garbage collection interval in seconds.
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 60;

/// Command-line arguments for the server.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobstore-rs")]
#[command(about = "Self-contained blob storage service")]
#[command(version)]
pub struct Args {
    /// Host address to bind to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the HTTP front.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory for persisted data. In-memory when omitted.
    #[arg(long, short = 'l')]
    pub location: Option<PathBuf>,

    /// Maximum number of access policies per container.
    #[arg(long, default_value_t = DEFAULT_MAX_POLICIES)]
    pub max_policies: usize,

    /// Default number of entries per listing page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Per-operation timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Interval between garbage collection passes, in seconds.
    #[arg(long, default_value_t = DEFAULT_GC_INTERVAL_SECS)]
    pub gc_interval_secs: u64,

    /// Reject anonymous HTTP requests.
    #[arg(long)]
    pub require_auth: bool,

    /// Base64 account key signing access tokens and accepted in
    /// `Authorization: Key`. Defaults to the development key.
    #[arg(
        long,
        env = "BLOBSTORE_ACCOUNT_KEY",
        hide_env_values = true,
        value_parser = parse_account_key
    )]
    pub account_key: Option<String>,

    /// Blob trigger binding such as `container-trigger-input/{name}`.
    /// May be repeated.
    #[arg(long = "trigger")]
    pub triggers: Vec<String>,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,
}

/// Service configuration derived from command-line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port for the HTTP front.
    pub port: u16,
    /// Root directory for persisted backing; `None` keeps everything in memory.
    pub storage_root: Option<PathBuf>,
    /// Maximum number of access policies a container may hold.
    pub max_policies_per_container: usize,
    /// Number of entries per listing page when the caller does not ask.
    pub default_page_size: u32,
    /// Upper bound on the duration of any single operation.
    pub operation_timeout: Duration,
    /// Interval between garbage collection passes.
    pub gc_interval: Duration,
    /// Key used to sign and verify access tokens.
    pub account_key: String,
    /// Reject anonymous HTTP requests.
    pub require_auth: bool,
    /// Blob trigger bindings.
    pub triggers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            storage_root: None,
            max_policies_per_container: DEFAULT_MAX_POLICIES,
            default_page_size: DEFAULT_PAGE_SIZE,
            operation_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            gc_interval: Duration::from_secs(DEFAULT_GC_INTERVAL_SECS),
            account_key: DEFAULT_ACCOUNT_KEY.to_string(),
            require_auth: false,
            triggers: Vec::new(),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            storage_root: args.location,
            max_policies_per_container: args.max_policies,
            default_page_size: args.page_size.max(1),
            operation_timeout: Duration::from_secs(args.timeout_secs.max(1)),
            gc_interval: Duration::from_secs(args.gc_interval_secs.max(1)),
            account_key: args
                .account_key
                .unwrap_or_else(|| DEFAULT_ACCOUNT_KEY.to_string()),
            require_auth: args.require_auth,
            triggers: args.triggers,
        }
    }
}

/// Accepts a non-empty base64 key.
fn parse_account_key(value: &str) -> Result<String, String> {
    match BASE64.decode(value) {
        Ok(bytes) if !bytes.is_empty() => Ok(value.to_string()),
        Ok(_) => Err("account key must not be empty".to_string()),
        Err(e) => Err(format!("account key is not valid base64: {}", e)),
    }
}

impl Config {
    /// Returns a configuration that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Returns a configuration persisting under `root`.
    pub fn persistent(root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Whether tokens are signed with the well-known development key.
    pub fn uses_development_key(&self) -> bool {
        self.account_key == DEFAULT_ACCOUNT_KEY
    }

    /// Returns the bind address for the HTTP front.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
