//! Configuration schema definitions.
//!
//! This module defines the complete settings snapshot for the application.
//! All types derive Serde traits so a snapshot can be printed or read back.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings snapshot. Built once by the loader, never mutated.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Application identity (name, version, environment).
    pub app: AppIdentity,

    /// Switches for optional subsystems.
    pub features: FeatureFlags,

    pub document_store: DocumentStoreSettings,

    pub cache: CacheSettings,

    pub search: SearchSettings,

    pub mailer: MailerSettings,

    pub queue: QueueSettings,

    /// Listener tuning.
    pub http: HttpSettings,

    pub session: SessionSettings,

    /// Object storage (S3-compatible).
    pub storage: StorageSettings,

    /// Identity provider.
    pub oidc: OidcSettings,

    /// Message broker (MQTT).
    pub broker: BrokerSettings,

    pub lifecycle: LifecycleSettings,

    pub observability: ObservabilitySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppIdentity {
    pub name: String,
    pub version: String,
    pub env: Environment,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            version: "v1.0.0".to_string(),
            env: Environment::Development,
        }
    }
}

/// Deployment environment. Selects the log format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev")]
    Development,
    #[serde(alias = "prod")]
    Production,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("dev"),
            Environment::Production => f.write_str("prod"),
            Environment::Test => f.write_str("test"),
        }
    }
}

/// Feature flags. A false flag is the only reason its subsystem stays unset.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureFlags {
    pub document_store: bool,
    pub search: bool,
    /// Mirror document-store writes into the search index.
    pub search_sync: bool,
    pub mailer: bool,
    pub broker: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DocumentStoreSettings {
    /// Connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
}

/// Key/value server shared by the cache and the queue backend.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    #[default]
    Smtp,
    Resend,
    Ses,
}

impl FromStr for MailProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(MailProvider::Smtp),
            "resend" => Ok(MailProvider::Resend),
            "ses" => Ok(MailProvider::Ses),
            other => Err(format!("unknown mail provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct MailerSettings {
    pub provider: MailProvider,
    pub from_email: String,
    pub from_name: String,
    pub smtp: SmtpSettings,
    pub resend: ResendSettings,
    pub ses: SesSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub tls: bool,
    pub local_name: String,
    /// PLAIN, LOGIN or CRAM-MD5.
    pub auth_method: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            tls: false,
            local_name: String::new(),
            auth_method: "PLAIN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ResendSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SesSettings {
    pub region: String,
    pub access_key_id: String,
    #[serde(skip_serializing)]
    pub secret_access_key: String,
    pub endpoint: String,
}

/// Queue worker tuning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueSettings {
    /// Number of jobs processed concurrently.
    pub concurrent_workers: usize,
    pub fetch_interval_secs: u64,
    /// 0 means unlimited.
    pub fetch_limit: usize,
    /// Upper bound for a single job handler.
    pub max_consume_duration_secs: u64,
    pub default_retries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrent_workers: 1,
            fetch_interval_secs: 1,
            fetch_limit: 0,
            max_consume_duration_secs: 5,
            default_retries: 3,
        }
    }
}

impl QueueSettings {
    pub fn max_consume_duration(&self) -> Duration {
        Duration::from_secs(self.max_consume_duration_secs)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,

    /// 0 binds an ephemeral port.
    pub port: u16,

    /// Value of the `Server` response header.
    pub server_header: String,

    /// Maximum request body size in bytes.
    pub body_limit: usize,

    /// Maximum concurrently handled requests.
    pub concurrency: usize,

    /// Header carrying the client address when behind a proxy.
    pub proxy_header: String,

    pub trusted_proxy_check: bool,

    pub trusted_proxies: Vec<String>,

    pub ip_validation: bool,

    pub request_timeout_secs: u64,

    /// Bound on the graceful drain after a termination signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            server_header: "AppServer/v1".to_string(),
            body_limit: 4 * 1024 * 1024,
            concurrency: 256 * 1024,
            proxy_header: String::new(),
            trusted_proxy_check: false,
            trusted_proxies: Vec::new(),
            ip_validation: false,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}

impl HttpSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// `<source>:<name>`, e.g. `cookie:session_id`.
    pub key_lookup: String,
    pub expiration_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            key_lookup: "cookie:session_id".to_string(),
            expiration_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub endpoint: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// "path" or "dns".
    pub bucket_lookup: String,
    pub use_ssl: bool,
    #[serde(skip_serializing)]
    pub token: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            region: String::new(),
            bucket_lookup: "path".to_string(),
            use_ssl: false,
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct OidcSettings {
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub scopes: Vec<String>,
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    pub client_id: String,
    pub addr: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub tls: BrokerTlsSettings,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            addr: "tcp://localhost:1883".to_string(),
            username: "admin".to_string(),
            password: "public".to_string(),
            tls: BrokerTlsSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BrokerTlsSettings {
    pub enabled: bool,
    pub ca: String,
    pub cert_file: String,
    pub key_file: String,
}

impl Default for BrokerTlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ca: "ca.pem".to_string(),
            cert_file: "client-crt.pem".to_string(),
            key_file: "client-key.pem".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Per-subsystem bound on `close()` during teardown.
    pub close_timeout_secs: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { close_timeout_secs: 5 }
    }
}

impl LifecycleSettings {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
