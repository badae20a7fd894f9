//! Configuration loading and types for the access signer.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, logging, redirect policy, and the per-backend
//! credentials.

use serde::Deserialize;
use std::path::Path;

use crate::policy::UNBOUNDED_URL_EXPIRY_SECS;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probes).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Redirect gateway settings shared by every backend.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// S3-compatible backend settings.
    #[serde(default)]
    pub s3: S3Config,

    /// Storj edge backend settings.
    #[serde(default)]
    pub storj: StorjConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls Prometheus metrics collection and the health probe.
/// Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

/// Redirect gateway configuration.
///
/// These settings apply to every backend; the per-backend sections below
/// only carry credentials and endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Backend mode: `s3` or `storj`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Bucket the signed links point into.
    #[serde(default)]
    pub bucket: String,

    /// Treat the first path segment of each request as a bucket name and
    /// drop it before resolving the object key.
    #[serde(default)]
    pub remove_bucket_prefix: bool,

    /// Scheme forced onto the redirect target: https when true, http when
    /// false, regardless of what the signing step produced.
    #[serde(default)]
    pub redirect_secure: bool,

    /// HTTP status code for redirect responses.  Out-of-range values and,
    /// for expiring links, the permanent codes 301/308 are replaced with
    /// 307 at request time.
    #[serde(default = "default_redirect_code")]
    pub redirect_code: u16,

    /// Lifetime of signed links in seconds.  Zero, negative, or
    /// `i64::MAX` means links never expire.
    #[serde(default = "default_url_expiry_secs")]
    pub url_expiry_secs: i64,

    /// Replace the host (and port) of the redirect target with this value
    /// verbatim.  Empty disables the override.
    #[serde(default)]
    pub host_redirect: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: String::new(),
            remove_bucket_prefix: false,
            redirect_secure: false,
            redirect_code: default_redirect_code(),
            url_expiry_secs: default_url_expiry_secs(),
            host_redirect: String::new(),
        }
    }
}

/// S3-compatible backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Storage endpoint.  Empty selects the hosted AWS endpoint for
    /// `region`; a bare `host:port` is given a scheme from `secure`.
    #[serde(default)]
    pub endpoint_url: String,

    /// Region of the backing bucket.
    #[serde(default = "default_region")]
    pub region: String,

    /// Scheme for bare `host:port` endpoints: https when true.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Explicit access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,

    /// Explicit secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,

    /// Force path-style URL addressing even on hosted endpoints.
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            region: default_region(),
            secure: true,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            force_path_style: false,
        }
    }
}

/// Storj edge backend configuration.
///
/// Exactly one access source is used, in priority order: `access_grant`,
/// then `api_key` + `passphrase` (exchanged through the auth service),
/// then a pre-registered `access_key_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorjConfig {
    /// Satellite address the API key was issued by.
    #[serde(default)]
    pub satellite_address: String,

    /// Satellite API key, used together with `passphrase`.
    #[serde(default)]
    pub api_key: String,

    /// Encryption passphrase, used together with `api_key`.
    #[serde(default)]
    pub passphrase: String,

    /// Serialized access grant.
    #[serde(default)]
    pub access_grant: String,

    /// Pre-registered edge access key id.  When this is the only access
    /// source, existence checks are skipped.
    #[serde(default)]
    pub access_key_id: String,

    /// Edge auth service that registers access grants.
    #[serde(default = "default_auth_service_url")]
    pub auth_service_url: String,

    /// Public linksharing base URL.
    #[serde(default = "default_share_base_url")]
    pub share_base_url: String,
}

impl Default for StorjConfig {
    fn default() -> Self {
        Self {
            satellite_address: String::new(),
            api_key: String::new(),
            passphrase: String::new(),
            access_grant: String::new(),
            access_key_id: String::new(),
            auth_service_url: default_auth_service_url(),
            share_base_url: default_share_base_url(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9003
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_backend() -> String {
    "s3".to_string()
}

fn default_redirect_code() -> u16 {
    301
}

fn default_url_expiry_secs() -> i64 {
    UNBOUNDED_URL_EXPIRY_SECS
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_auth_service_url() -> String {
    "https://auth.storjshare.io".to_string()
}

fn default_share_base_url() -> String {
    "https://link.storjshare.io".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
