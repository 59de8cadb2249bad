use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            gateway_port: default_gateway_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8081
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret for signing and verifying JWTs
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime in hours
    #[serde(default = "default_access_token_hours")]
    pub access_token_hours: i64,
    /// Refresh token lifetime in days
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
    /// Consecutive failed logins before the account is locked
    #[serde(default = "default_max_failed_logins")]
    pub max_failed_logins: i64,
    /// How long a lockout lasts, in minutes
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
    /// Lifetime of password-reset and verification tokens, in hours
    #[serde(default = "default_reset_token_hours")]
    pub reset_token_hours: i64,
    /// Email of the seeded admin account
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password of the seeded admin account; no admin is created when unset
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_hours: default_access_token_hours(),
            refresh_token_days: default_refresh_token_days(),
            max_failed_logins: default_max_failed_logins(),
            lockout_minutes: default_lockout_minutes(),
            reset_token_hours: default_reset_token_hours(),
            admin_email: default_admin_email(),
            admin_password: None,
        }
    }
}

fn default_jwt_secret() -> String {
    // Random per-process secret when not configured; tokens won't survive restarts
    uuid::Uuid::new_v4().to_string()
}

fn default_access_token_hours() -> i64 {
    24
}

fn default_refresh_token_days() -> i64 {
    7
}

fn default_max_failed_logins() -> i64 {
    5
}

fn default_lockout_minutes() -> i64 {
    15
}

fn default_reset_token_hours() -> i64 {
    2
}

fn default_admin_email() -> String {
    "admin@tienda.local".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// Destination WhatsApp phone number, e.g. "+56912345678"
    #[serde(default = "default_whatsapp_phone")]
    pub whatsapp_phone: String,
    /// Order message template. "{items}" and "{total}" are substituted.
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            whatsapp_phone: default_whatsapp_phone(),
            message_template: default_message_template(),
        }
    }
}

fn default_whatsapp_phone() -> String {
    "+56900000000".to_string()
}

fn default_message_template() -> String {
    "Hola! Quiero hacer el siguiente pedido:\n{items}\nTotal: ${total}".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Backend base URLs keyed by path segment, e.g. carrito = "http://127.0.0.1:8081"
    #[serde(default = "default_backends")]
    pub backends: HashMap<String, String>,
    /// Paths that skip token verification. A trailing '*' matches any suffix.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            public_paths: default_public_paths(),
        }
    }
}

fn default_backends() -> HashMap<String, String> {
    let mut backends = HashMap::new();
    backends.insert("carrito".to_string(), "http://127.0.0.1:8081".to_string());
    backends.insert("auth".to_string(), "http://127.0.0.1:8081".to_string());
    backends.insert("usuarios".to_string(), "http://127.0.0.1:8081".to_string());
    backends.insert("productos".to_string(), "http://127.0.0.1:8082".to_string());
    backends
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/api/auth/*".to_string(),
        "/api/productos/*".to_string(),
        "/health".to_string(),
    ]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Base URL used in reset/verification links sent to users
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Tienda".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            checkout: CheckoutConfig::default(),
            gateway: GatewayConfig::default(),
            email: EmailConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
