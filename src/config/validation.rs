//! Settings validation.
//!
//! # Responsibilities
//! - Semantic checks for flag-gated subsystems, run right before their init
//! - Required credentials, parseable endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Loading never validates; an enabled subsystem validates its own slice

use std::fmt;

use url::Url;

use crate::config::schema::{
    BrokerSettings, DocumentStoreSettings, MailProvider, MailerSettings, SearchSettings,
};

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn require(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "is required"));
    }
}

pub fn validate_document_store(settings: &DocumentStoreSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    require(&mut errors, "document_store.uri", &settings.uri);
    require(&mut errors, "document_store.database", &settings.database);
    finish(errors)
}

pub fn validate_search(settings: &SearchSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    require(&mut errors, "search.api_key", &settings.api_key);
    if settings.endpoint.trim().is_empty() {
        errors.push(ValidationError::new("search.endpoint", "is required"));
    } else if let Err(e) = Url::parse(&settings.endpoint) {
        errors.push(ValidationError::new("search.endpoint", format!("is not a valid URL ({})", e)));
    }
    finish(errors)
}

pub fn validate_mailer(settings: &MailerSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    require(&mut errors, "mailer.from_email", &settings.from_email);
    match settings.provider {
        MailProvider::Smtp => {
            require(&mut errors, "mailer.smtp.host", &settings.smtp.host);
            if settings.smtp.port == 0 {
                errors.push(ValidationError::new("mailer.smtp.port", "must be non-zero"));
            }
        }
        MailProvider::Resend => require(&mut errors, "mailer.resend.api_key", &settings.resend.api_key),
        MailProvider::Ses => {
            require(&mut errors, "mailer.ses.region", &settings.ses.region);
            require(&mut errors, "mailer.ses.access_key_id", &settings.ses.access_key_id);
            require(&mut errors, "mailer.ses.secret_access_key", &settings.ses.secret_access_key);
        }
    }
    finish(errors)
}

pub fn validate_broker(settings: &BrokerSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    require(&mut errors, "broker.client_id", &settings.client_id);
    if let Err(e) = Url::parse(&settings.addr) {
        errors.push(ValidationError::new("broker.addr", format!("is not a valid URL ({})", e)));
    }
    if settings.tls.enabled {
        require(&mut errors, "broker.tls.ca", &settings.tls.ca);
        require(&mut errors, "broker.tls.cert_file", &settings.tls.cert_file);
        require(&mut errors, "broker.tls.key_file", &settings.tls.key_file);
    }
    finish(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_reports_every_missing_field() {
        let errors = validate_search(&SearchSettings::default()).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["search.api_key", "search.endpoint"]);
    }

    #[test]
    fn search_rejects_unparseable_endpoint() {
        let settings = SearchSettings {
            endpoint: "not a url".to_string(),
            api_key: "key".to_string(),
        };
        let errors = validate_search(&settings).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("is not a valid URL"));
    }

    #[test]
    fn mailer_checks_provider_credentials() {
        let mut settings = MailerSettings {
            from_email: "noreply@example.com".to_string(),
            provider: MailProvider::Resend,
            ..Default::default()
        };
        let errors = validate_mailer(&settings).unwrap_err();
        assert_eq!(errors[0].field, "mailer.resend.api_key");

        settings.resend.api_key = "re_123".to_string();
        assert!(validate_mailer(&settings).is_ok());
    }

    #[test]
    fn default_broker_settings_are_valid() {
        assert!(validate_broker(&BrokerSettings::default()).is_ok());
    }

    #[test]
    fn document_store_needs_uri_and_database() {
        let settings = DocumentStoreSettings {
            uri: "memory://local".to_string(),
            database: String::new(),
        };
        let errors = validate_document_store(&settings).unwrap_err();
        assert_eq!(errors, vec![ValidationError::new("document_store.database", "is required")]);
    }
}
