//! Configuration loading and types for the gallery server.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then overridden from environment variables.
//! Each subsection governs a different part of the system: networking,
//! token signing, the persistent database, the remote media host, the
//! upload staging area, logging and metrics.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Persistent metadata database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Remote media host settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Upload staging and limits.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
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

    /// Allowed CORS origins. `*` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret. When empty a random per-process secret is used.
    #[serde(default)]
    pub jwt_secret: String,

    /// Lifetime of issued tokens, in hours.
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

/// Persistent database configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Connection string: `sqlite://<path>` or a bare file path.
    /// When absent the server runs on the in-memory store.
    #[serde(default)]
    pub url: Option<String>,
}

/// Remote media host configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Backend type: `cloudinary` or `memory`.
    #[serde(default = "default_media_backend")]
    pub backend: String,

    /// Cloudinary account settings.
    #[serde(default)]
    pub cloudinary: CloudinaryConfig,

    /// Public base URL handed out by the memory backend.
    #[serde(default = "default_memory_base_url")]
    pub memory_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            backend: default_media_backend(),
            cloudinary: CloudinaryConfig::default(),
            memory_base_url: default_memory_base_url(),
        }
    }
}

/// Cloudinary account settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudinaryConfig {
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Folder new uploads are placed in.
    #[serde(default = "default_media_folder")]
    pub folder: String,
    /// API root, overridable for tests and proxies.
    #[serde(default = "default_cloudinary_api_base")]
    pub api_base: String,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: default_media_folder(),
            api_base: default_cloudinary_api_base(),
        }
    }
}

impl CloudinaryConfig {
    /// Whether all three account credentials are present.
    pub fn is_complete(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Upload staging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Directory files are buffered in before the remote upload.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Maximum accepted file size in bytes (default 5 MiB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            max_file_size: default_max_file_size(),
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
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
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
    5000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_token_ttl_hours() -> u64 {
    24
}

fn default_media_backend() -> String {
    "cloudinary".to_string()
}

fn default_memory_base_url() -> String {
    "http://localhost:5000/media".to_string()
}

fn default_media_folder() -> String {
    "gallery".to_string()
}

fn default_cloudinary_api_base() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_staging_dir() -> String {
    "uploads".to_string()
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

impl Config {
    /// Apply overrides from a variable lookup (normally the process
    /// environment). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(name) = get("CLOUDINARY_CLOUD_NAME") {
            self.media.cloudinary.cloud_name = name;
        }
        if let Some(key) = get("CLOUDINARY_API_KEY") {
            self.media.cloudinary.api_key = key;
        }
        if let Some(secret) = get("CLOUDINARY_API_SECRET") {
            self.media.cloudinary.api_secret = secret;
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid PORT value: {port}"))?;
        }
        Ok(())
    }
}

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Build the effective configuration: the YAML file when given (defaults
/// otherwise), then environment overrides.
pub fn resolve_config(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => Config::default(),
    };
    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}
