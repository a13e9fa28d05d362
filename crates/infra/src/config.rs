//! Process configuration from environment variables.
//!
//! A `.env` file in the working directory is loaded first when present; real
//! environment variables win over it.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use leasekeep_reminders::{
    DispatcherConfig, EntityType, RetryPolicy, RunnerConfig, ScannerConfig,
};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v19.0";
pub const MAX_LOOKAHEAD_DAYS: i64 = 3650;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

impl ConfigError {
    fn invalid(var: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            message: message.into(),
        }
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct WhatsAppConfig {
    pub api_base: String,
    pub phone_number_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("api_base", &self.api_base)
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` selects the in-memory data store.
    pub database_url: Option<String>,
    /// Required by the HTTP server only.
    pub cron_secret: Option<String>,
    pub bind_addr: SocketAddr,
    /// `None` selects the log-only sender.
    pub whatsapp: Option<WhatsAppConfig>,
    pub template_language: String,
    pub lookahead_days: i64,
    pub concurrency: usize,
    pub send_timeout: Duration,
    pub entity_types: BTreeSet<EntityType>,
    pub default_country_code: Option<String>,
    pub reminder_log_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .field("whatsapp", &self.whatsapp)
            .field("template_language", &self.template_language)
            .field("lookahead_days", &self.lookahead_days)
            .field("concurrency", &self.concurrency)
            .field("send_timeout", &self.send_timeout)
            .field("entity_types", &self.entity_types)
            .field("default_country_code", &self.default_country_code)
            .field("reminder_log_enabled", &self.reminder_log_enabled)
            .finish()
    }
}

impl AppConfig {
    /// Read `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = parse_or("BIND_ADDR", get("BIND_ADDR"), || {
            SocketAddr::from(([0, 0, 0, 0], 8080))
        })?;

        let whatsapp = match (
            get("WHATSAPP_PHONE_NUMBER_ID"),
            get("WHATSAPP_ACCESS_TOKEN"),
        ) {
            (Some(phone_number_id), Some(access_token)) => Some(WhatsAppConfig {
                api_base: get("WHATSAPP_API_BASE")
                    .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                phone_number_id,
                access_token,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("WHATSAPP_ACCESS_TOKEN")),
            (None, Some(_)) => return Err(ConfigError::Missing("WHATSAPP_PHONE_NUMBER_ID")),
        };

        let lookahead_days: i64 = parse_or("REMINDER_LOOKAHEAD_DAYS", get("REMINDER_LOOKAHEAD_DAYS"), || 30)?;
        if !(0..=MAX_LOOKAHEAD_DAYS).contains(&lookahead_days) {
            return Err(ConfigError::invalid(
                "REMINDER_LOOKAHEAD_DAYS",
                format!("must be between 0 and {MAX_LOOKAHEAD_DAYS}, got {lookahead_days}"),
            ));
        }

        let concurrency: usize = parse_or("REMINDER_CONCURRENCY", get("REMINDER_CONCURRENCY"), || 5)?;
        if concurrency == 0 {
            return Err(ConfigError::invalid("REMINDER_CONCURRENCY", "must be at least 1"));
        }

        let timeout_secs: u64 =
            parse_or("REMINDER_SEND_TIMEOUT_SECS", get("REMINDER_SEND_TIMEOUT_SECS"), || 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::invalid("REMINDER_SEND_TIMEOUT_SECS", "must be at least 1"));
        }

        let entity_types = match get("REMINDER_ENTITY_TYPES") {
            None => EntityType::ALL.into_iter().collect(),
            Some(raw) => parse_entity_types(&raw)?,
        };

        let default_country_code = match get("REMINDER_DEFAULT_COUNTRY_CODE") {
            None => None,
            Some(raw) => {
                let digits = raw.trim_start_matches('+');
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) || digits.len() > 3 {
                    return Err(ConfigError::invalid(
                        "REMINDER_DEFAULT_COUNTRY_CODE",
                        format!("expected 1-3 digits, got '{raw}'"),
                    ));
                }
                Some(digits.to_string())
            }
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            cron_secret: get("CRON_SECRET"),
            bind_addr,
            whatsapp,
            template_language: get("WHATSAPP_TEMPLATE_LANGUAGE").unwrap_or_else(|| "en".to_string()),
            lookahead_days,
            concurrency,
            send_timeout: Duration::from_secs(timeout_secs),
            entity_types,
            default_country_code,
            reminder_log_enabled: parse_or("REMINDER_LOG_ENABLED", get("REMINDER_LOG_ENABLED"), || false)?,
        })
    }

    pub fn require_cron_secret(&self) -> Result<&str, ConfigError> {
        self.cron_secret
            .as_deref()
            .ok_or(ConfigError::Missing("CRON_SECRET"))
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            lookahead: chrono::Duration::days(self.lookahead_days),
            concurrency: self.concurrency,
            scanner: ScannerConfig {
                tracked: self.entity_types.clone(),
            },
            dispatcher: DispatcherConfig {
                retry: RetryPolicy::default(),
                send_timeout: self.send_timeout,
                language: self.template_language.clone(),
                default_country_code: self.default_country_code.clone(),
            },
        }
    }
}

fn parse_or<T, D>(var: &'static str, raw: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> T,
{
    match raw {
        None => Ok(default()),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, format!("'{raw}': {e}"))),
    }
}

fn parse_entity_types(raw: &str) -> Result<BTreeSet<EntityType>, ConfigError> {
    let mut types = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let entity_type = part
            .parse::<EntityType>()
            .map_err(|e| ConfigError::invalid("REMINDER_ENTITY_TYPES", e.to_string()))?;
        types.insert(entity_type);
    }
    if types.is_empty() {
        return Err(ConfigError::invalid("REMINDER_ENTITY_TYPES", "no entity types listed"));
    }
    Ok(types)
}
