//! Layered configuration loading.
//!
//! Defaults are baked into the schema; each source passed to [`load`]
//! overrides the ones before it. A malformed value keeps its default and is
//! reported as a [`ConfigDiagnostic`] instead of failing the load.
//!
//! Environment-style layers answer a key by its `UPPER_SNAKE` name, file
//! layers by its schema path, so a `--print-config` dump loads back as-is.
//! File keys that match no setting are reported too.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::AppSettings;

/// Error type for opening a file source.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "IO error reading {}: {}", path.display(), e),
            ConfigError::Parse(path, e) => write!(f, "Parse error in {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// One setting, addressed by its environment name and its schema path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigKey {
    /// `HTTP_PORT`
    pub env: &'static str,
    /// `http.port`
    pub path: &'static str,
}

const fn key(env: &'static str, path: &'static str) -> ConfigKey {
    ConfigKey { env, path }
}

/// A configuration layer.
pub trait ConfigSource: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn get(&self, key: ConfigKey) -> Option<String>;

    /// Schema paths and values this layer carries, for unknown-key
    /// reporting. Layers keyed by environment names return nothing.
    fn entries(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Process environment, optionally namespaced (`PREFIX_HTTP_PORT`).
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        let name = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.env),
            None => key.env.to_string(),
        };
        std::env::var(name).ok()
    }
}

/// In-memory layer keyed by environment names.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    name: String,
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            name: "map".to_string(),
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ConfigSource for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.env).cloned()
    }
}

/// A TOML file shaped like `AppSettings` (the `--print-config` output).
///
/// Tables are flattened to dotted schema paths: `[mailer.smtp] host = ".."`
/// answers `mailer.smtp.host`. Arrays become comma lists.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    values: HashMap<String, String>,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let source = Self::parse(&path.display().to_string(), &content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        Ok(source)
    }

    /// Parse TOML text directly.
    pub fn parse(name: &str, content: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;

        let mut values = HashMap::new();
        flatten("", &table, &mut values);

        Ok(Self {
            name: name.to_string(),
            values,
        })
    }
}

impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.path).cloned()
    }

    fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort();
        entries
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let key = key.to_ascii_lowercase().replace('-', "_");
        let key = if prefix.is_empty() { key } else { format!("{}.{}", prefix, key) };
        match value {
            toml::Value::Table(nested) => flatten(&key, nested, out),
            toml::Value::Array(items) => {
                let joined = items.iter().map(scalar).collect::<Vec<_>>().join(",");
                out.insert(key, joined);
            }
            other => {
                out.insert(key, scalar(other));
            }
        }
    }
}

fn scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A value that could not be applied; its default was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiagnostic {
    pub key: String,
    pub value: String,
    pub source: String,
    pub reason: String,
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={:?} from {} ignored ({})",
            self.key, self.value, self.source, self.reason
        )
    }
}

/// Resolves keys against the layers, last source first.
struct Binder<'a> {
    sources: &'a [&'a dyn ConfigSource],
    known: Vec<&'static str>,
    diagnostics: Vec<ConfigDiagnostic>,
}

impl<'a> Binder<'a> {
    /// Topmost non-blank value. A blank value defers to the layer below.
    fn lookup(&mut self, key: ConfigKey) -> Option<(String, &'a str)> {
        self.known.push(key.path);
        self.sources.iter().rev().find_map(|source| {
            source
                .get(key)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (value, source.name()))
        })
    }

    fn reject(&mut self, key: ConfigKey, value: String, source: &str, reason: impl Into<String>) {
        self.diagnostics.push(ConfigDiagnostic {
            key: key.env.to_string(),
            value,
            source: source.to_string(),
            reason: reason.into(),
        });
    }

    fn string(&mut self, key: ConfigKey, target: &mut String) {
        if let Some((value, _)) = self.lookup(key) {
            *target = value;
        }
    }

    fn parse<T>(&mut self, key: ConfigKey, target: &mut T)
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some((value, source)) = self.lookup(key) else {
            return;
        };
        match value.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(e) => self.reject(key, value, source, e.to_string()),
        }
    }

    fn flag(&mut self, key: ConfigKey, target: &mut bool) {
        let Some((value, source)) = self.lookup(key) else {
            return;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => self.reject(key, value, source, "expected a boolean"),
        }
    }

    fn list(&mut self, key: ConfigKey, target: &mut Vec<String>) {
        if let Some((value, _)) = self.lookup(key) {
            let items: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect();
            if !items.is_empty() {
                *target = items;
            }
        }
    }

    /// Report keys a layer carries that no setting reads.
    fn finish(mut self) -> Vec<ConfigDiagnostic> {
        for source in self.sources {
            for (key, value) in source.entries() {
                if !self.known.contains(&key.as_str()) {
                    self.diagnostics.push(ConfigDiagnostic {
                        key,
                        value,
                        source: source.name().to_string(),
                        reason: "unknown key".to_string(),
                    });
                }
            }
        }
        self.diagnostics
    }
}

/// Build a snapshot from the given layers, logging ignored values.
pub fn load(sources: &[&dyn ConfigSource]) -> AppSettings {
    let (settings, diagnostics) = load_with_diagnostics(sources);
    for diagnostic in &diagnostics {
        tracing::warn!(key = %diagnostic.key, source = %diagnostic.source, "{}", diagnostic);
    }
    settings
}

/// Build a snapshot from the process environment only.
pub fn load_from_env() -> AppSettings {
    load(&[&EnvSource::new()])
}

/// Build a snapshot and return ignored values instead of logging them.
///
/// Used before the log subscriber exists.
pub fn load_with_diagnostics(sources: &[&dyn ConfigSource]) -> (AppSettings, Vec<ConfigDiagnostic>) {
    let mut settings = AppSettings::default();
    let mut b = Binder {
        sources,
        known: Vec::new(),
        diagnostics: Vec::new(),
    };

    let s = &mut settings;

    b.string(key("APP_NAME", "app.name"), &mut s.app.name);
    b.string(key("APP_VERSION", "app.version"), &mut s.app.version);
    b.parse(key("APP_ENV", "app.env"), &mut s.app.env);

    b.flag(key("DOCUMENT_STORE_ENABLED", "features.document_store"), &mut s.features.document_store);
    b.flag(key("SEARCH_ENABLED", "features.search"), &mut s.features.search);
    b.flag(key("SEARCH_SYNC_ENABLED", "features.search_sync"), &mut s.features.search_sync);
    b.flag(key("MAILER_ENABLED", "features.mailer"), &mut s.features.mailer);
    b.flag(key("BROKER_ENABLED", "features.broker"), &mut s.features.broker);

    b.string(key("DOCUMENT_STORE_URI", "document_store.uri"), &mut s.document_store.uri);
    b.string(key("DOCUMENT_STORE_DB", "document_store.database"), &mut s.document_store.database);

    b.string(key("CACHE_HOST", "cache.host"), &mut s.cache.host);
    b.parse(key("CACHE_PORT", "cache.port"), &mut s.cache.port);
    b.string(key("CACHE_USERNAME", "cache.username"), &mut s.cache.username);
    b.string(key("CACHE_PASSWORD", "cache.password"), &mut s.cache.password);

    b.string(key("SEARCH_ENDPOINT", "search.endpoint"), &mut s.search.endpoint);
    b.string(key("SEARCH_API_KEY", "search.api_key"), &mut s.search.api_key);

    b.parse(key("MAILER_PROVIDER", "mailer.provider"), &mut s.mailer.provider);
    b.string(key("MAILER_FROM_EMAIL", "mailer.from_email"), &mut s.mailer.from_email);
    b.string(key("MAILER_FROM_NAME", "mailer.from_name"), &mut s.mailer.from_name);
    b.string(key("SMTP_HOST", "mailer.smtp.host"), &mut s.mailer.smtp.host);
    b.parse(key("SMTP_PORT", "mailer.smtp.port"), &mut s.mailer.smtp.port);
    b.string(key("SMTP_USERNAME", "mailer.smtp.username"), &mut s.mailer.smtp.username);
    b.string(key("SMTP_PASSWORD", "mailer.smtp.password"), &mut s.mailer.smtp.password);
    b.flag(key("SMTP_TLS", "mailer.smtp.tls"), &mut s.mailer.smtp.tls);
    b.string(key("SMTP_LOCAL_NAME", "mailer.smtp.local_name"), &mut s.mailer.smtp.local_name);
    b.string(key("SMTP_AUTH_METHOD", "mailer.smtp.auth_method"), &mut s.mailer.smtp.auth_method);
    b.string(key("RESEND_API_KEY", "mailer.resend.api_key"), &mut s.mailer.resend.api_key);
    b.string(key("SES_REGION", "mailer.ses.region"), &mut s.mailer.ses.region);
    b.string(key("SES_ACCESS_KEY_ID", "mailer.ses.access_key_id"), &mut s.mailer.ses.access_key_id);
    b.string(key("SES_SECRET_ACCESS_KEY", "mailer.ses.secret_access_key"), &mut s.mailer.ses.secret_access_key);
    b.string(key("SES_ENDPOINT", "mailer.ses.endpoint"), &mut s.mailer.ses.endpoint);

    b.parse(key("QUEUE_CONCURRENCY", "queue.concurrent_workers"), &mut s.queue.concurrent_workers);
    b.parse(key("QUEUE_FETCH_INTERVAL", "queue.fetch_interval_secs"), &mut s.queue.fetch_interval_secs);
    b.parse(key("QUEUE_FETCH_LIMIT", "queue.fetch_limit"), &mut s.queue.fetch_limit);
    b.parse(
        key("QUEUE_MAX_CONSUME_DURATION", "queue.max_consume_duration_secs"),
        &mut s.queue.max_consume_duration_secs,
    );
    b.parse(key("QUEUE_DEFAULT_RETRIES", "queue.default_retries"), &mut s.queue.default_retries);

    b.string(key("HTTP_HOST", "http.host"), &mut s.http.host);
    b.parse(key("HTTP_PORT", "http.port"), &mut s.http.port);
    b.string(key("HTTP_SERVER_HEADER", "http.server_header"), &mut s.http.server_header);
    b.parse(key("HTTP_BODY_LIMIT", "http.body_limit"), &mut s.http.body_limit);
    b.parse(key("HTTP_CONCURRENCY", "http.concurrency"), &mut s.http.concurrency);
    b.string(key("HTTP_PROXY_HEADER", "http.proxy_header"), &mut s.http.proxy_header);
    b.flag(key("HTTP_TRUSTED_PROXY_CHECK", "http.trusted_proxy_check"), &mut s.http.trusted_proxy_check);
    b.list(key("HTTP_TRUSTED_PROXIES", "http.trusted_proxies"), &mut s.http.trusted_proxies);
    b.flag(key("HTTP_IP_VALIDATION", "http.ip_validation"), &mut s.http.ip_validation);
    b.parse(key("HTTP_REQUEST_TIMEOUT", "http.request_timeout_secs"), &mut s.http.request_timeout_secs);
    b.parse(key("HTTP_SHUTDOWN_TIMEOUT", "http.shutdown_timeout_secs"), &mut s.http.shutdown_timeout_secs);

    b.string(key("SESSION_LOOKUP", "session.key_lookup"), &mut s.session.key_lookup);
    b.parse(key("SESSION_EXPIRATION", "session.expiration_secs"), &mut s.session.expiration_secs);

    b.string(key("S3_ENDPOINT", "storage.endpoint"), &mut s.storage.endpoint);
    b.string(key("S3_ACCESS_KEY", "storage.access_key"), &mut s.storage.access_key);
    b.string(key("S3_SECRET_KEY", "storage.secret_key"), &mut s.storage.secret_key);
    b.string(key("S3_BUCKET_NAME", "storage.bucket"), &mut s.storage.bucket);
    b.string(key("S3_REGION", "storage.region"), &mut s.storage.region);
    b.string(key("S3_BUCKET_LOOKUP", "storage.bucket_lookup"), &mut s.storage.bucket_lookup);
    b.flag(key("S3_USE_SSL", "storage.use_ssl"), &mut s.storage.use_ssl);
    b.string(key("S3_TOKEN", "storage.token"), &mut s.storage.token);

    b.string(key("OIDC_APP_ID", "oidc.app_id"), &mut s.oidc.app_id);
    b.string(key("OIDC_APP_SECRET", "oidc.app_secret"), &mut s.oidc.app_secret);
    b.list(key("OIDC_APP_SCOPES", "oidc.scopes"), &mut s.oidc.scopes);
    b.string(key("OIDC_ISSUER", "oidc.issuer"), &mut s.oidc.issuer);

    b.string(key("BROKER_CLIENT_ID", "broker.client_id"), &mut s.broker.client_id);
    b.string(key("BROKER_ADDR", "broker.addr"), &mut s.broker.addr);
    b.string(key("BROKER_USERNAME", "broker.username"), &mut s.broker.username);
    b.string(key("BROKER_PASSWORD", "broker.password"), &mut s.broker.password);
    b.flag(key("BROKER_TLS_ENABLED", "broker.tls.enabled"), &mut s.broker.tls.enabled);
    b.string(key("BROKER_TLS_CA", "broker.tls.ca"), &mut s.broker.tls.ca);
    b.string(key("BROKER_TLS_CERT_FILE", "broker.tls.cert_file"), &mut s.broker.tls.cert_file);
    b.string(key("BROKER_TLS_KEY_FILE", "broker.tls.key_file"), &mut s.broker.tls.key_file);

    b.parse(key("SUBSYSTEM_CLOSE_TIMEOUT", "lifecycle.close_timeout_secs"), &mut s.lifecycle.close_timeout_secs);

    b.string(key("LOG_LEVEL", "observability.log_level"), &mut s.observability.log_level);
    b.flag(key("METRICS_ENABLED", "observability.metrics_enabled"), &mut s.observability.metrics_enabled);
    b.string(key("METRICS_ADDRESS", "observability.metrics_address"), &mut s.observability.metrics_address);

    (settings, b.finish())
}
