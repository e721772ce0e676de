//! Configuration module for contractor-billing-service.

use service_core::config::{self as core_config, get_env, get_env_parsed, is_production};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub transaction: TransactionConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

/// Retry policy for units of work that hit transient storage errors.
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl TransactionConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            ..RetryConfig::default()
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = is_production();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "contractor-billing-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: env::var("MONGODB_DATABASE")
                    .unwrap_or_else(|_| "contractor_billing".to_string()),
            },
            transaction: TransactionConfig {
                max_retries: get_env_parsed("TXN_MAX_RETRIES", 3, false)?,
                initial_backoff_ms: get_env_parsed("TXN_INITIAL_BACKOFF_MS", 50, false)?,
            },
        })
    }
}
