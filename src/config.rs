//! Runtime configuration.
//!
//! Values come from `ROOMLEDGER_*` environment variables (a `.env` file is
//! honoured). Everything has a development default except the webhook
//! secret: without one, every gateway webhook is rejected.

use crate::domain::booking::CancellationPolicy;
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Where guests send mobile-money transfers, per operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileMoneyConfig {
    pub recipients: BTreeMap<String, String>,
}

impl Default for MobileMoneyConfig {
    fn default() -> Self {
        Self {
            recipients: BTreeMap::from([
                ("mtn".to_string(), "+237650000000".to_string()),
                ("orange".to_string(), "+237690000000".to_string()),
            ]),
        }
    }
}

impl MobileMoneyConfig {
    /// Parses `operator=number,operator=number`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut recipients = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((operator, number)) if !operator.trim().is_empty() && !number.trim().is_empty() => {
                    recipients.insert(operator.trim().to_lowercase(), number.trim().to_string());
                }
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "ROOMLEDGER_MOBILE_MONEY_RECIPIENTS",
                        value: raw.to_string(),
                    });
                }
            }
        }
        Ok(Self { recipients })
    }

    pub fn recipient(&self, operator: &str) -> Option<&str> {
        self.recipients
            .get(&operator.trim().to_lowercase())
            .map(String::as_str)
    }
}

/// Settings the booking engine itself consumes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cancellation: CancellationPolicy,
    pub allow_partial_refunds: bool,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance: chrono::Duration,
    /// How long a payment attempt may stay PENDING before it is failed.
    pub payment_expiry: chrono::Duration,
    pub gateway_timeout: Duration,
    pub store_timeout: Duration,
    pub mobile_money: MobileMoneyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cancellation: CancellationPolicy::default(),
            allow_partial_refunds: false,
            webhook_secret: None,
            webhook_tolerance: chrono::Duration::minutes(5),
            payment_expiry: chrono::Duration::hours(24),
            gateway_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            mobile_money: MobileMoneyConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub bind_addr: SocketAddr,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let cancellation = match var("ROOMLEDGER_CANCELLATION_NOTICE_HOURS") {
            Some(raw) => CancellationPolicy::with_notice_hours(parse(
                "ROOMLEDGER_CANCELLATION_NOTICE_HOURS",
                &raw,
            )?),
            None => defaults.engine.cancellation,
        };
        let allow_partial_refunds = match var("ROOMLEDGER_ALLOW_PARTIAL_REFUNDS") {
            Some(raw) => parse("ROOMLEDGER_ALLOW_PARTIAL_REFUNDS", &raw)?,
            None => defaults.engine.allow_partial_refunds,
        };
        let webhook_tolerance = match var("ROOMLEDGER_WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => chrono::Duration::seconds(parse("ROOMLEDGER_WEBHOOK_TOLERANCE_SECS", &raw)?),
            None => defaults.engine.webhook_tolerance,
        };
        let payment_expiry = match var("ROOMLEDGER_PAYMENT_EXPIRY_MINUTES") {
            Some(raw) => chrono::Duration::minutes(parse("ROOMLEDGER_PAYMENT_EXPIRY_MINUTES", &raw)?),
            None => defaults.engine.payment_expiry,
        };
        let gateway_timeout = match var("ROOMLEDGER_GATEWAY_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse("ROOMLEDGER_GATEWAY_TIMEOUT_MS", &raw)?),
            None => defaults.engine.gateway_timeout,
        };
        let store_timeout = match var("ROOMLEDGER_STORE_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse("ROOMLEDGER_STORE_TIMEOUT_MS", &raw)?),
            None => defaults.engine.store_timeout,
        };
        let mobile_money = match var("ROOMLEDGER_MOBILE_MONEY_RECIPIENTS") {
            Some(raw) => MobileMoneyConfig::parse(&raw)?,
            None => defaults.engine.mobile_money,
        };
        let bind_addr = match var("ROOMLEDGER_BIND_ADDR") {
            Some(raw) => parse("ROOMLEDGER_BIND_ADDR", &raw)?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            engine: EngineConfig {
                cancellation,
                allow_partial_refunds,
                webhook_secret: var("ROOMLEDGER_WEBHOOK_SECRET"),
                webhook_tolerance,
                payment_expiry,
                gateway_timeout,
                store_timeout,
                mobile_money,
            },
            bind_addr,
            log_level: var("ROOMLEDGER_LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_money_recipients_parse() {
        let config = MobileMoneyConfig::parse("MTN=+237650000001, orange = +237690000001").unwrap();
        assert_eq!(config.recipient("mtn"), Some("+237650000001"));
        assert_eq!(config.recipient(" Orange "), Some("+237690000001"));
        assert_eq!(config.recipient("airtel"), None);
    }

    #[test]
    fn test_mobile_money_recipients_reject_garbage() {
        assert!(MobileMoneyConfig::parse("mtn").is_err());
        assert!(MobileMoneyConfig::parse("=123").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.cancellation, CancellationPolicy::default());
        assert!(config.engine.webhook_secret.is_none());
        assert!(!config.engine.allow_partial_refunds);
        assert_eq!(config.engine.payment_expiry, chrono::Duration::hours(24));
        assert_eq!(config.bind_addr.port(), 8080);
    }
}
