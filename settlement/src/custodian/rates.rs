//! Conversion rates from an external rate service.
//!
//! Only the lookup seam lives here. Every call is bounded by
//! [`RATE_FETCH_TIMEOUT`] and quotes older than [`RATE_MAX_AGE`] are
//! refused; neither case is retried.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::{RATE_FETCH_TIMEOUT, RATE_MAX_AGE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateError {
    #[error("rate lookup for {0} timed out")]
    Timeout(String),

    #[error("no rate available for {0}")]
    NotFound(String),

    #[error("rate for {currency} is {age_secs}s old, refusing to use it")]
    Stale { currency: String, age_secs: i64 },

    #[error("rate for {0} must be positive")]
    NonPositive(String),

    #[error("rate service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuote {
    /// Units of the target currency per one unit of the base currency.
    pub rate: Decimal,
    pub last_updated: DateTime<Utc>,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rate(&self, base: &str, currency: &str) -> Result<RateQuote, RateError>;
}

/// Rates supplied up front, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct FixedRateProvider {
    rates: HashMap<String, RateQuote>,
}

impl FixedRateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rate observed now.
    pub fn with_rate(self, currency: &str, rate: Decimal) -> Self {
        self.with_quote(
            currency,
            RateQuote {
                rate,
                last_updated: Utc::now(),
            },
        )
    }

    pub fn with_quote(mut self, currency: &str, quote: RateQuote) -> Self {
        self.rates.insert(currency.to_ascii_uppercase(), quote);
        self
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn fetch_rate(&self, _base: &str, currency: &str) -> Result<RateQuote, RateError> {
        self.rates
            .get(&currency.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| RateError::NotFound(currency.to_string()))
    }
}

/// Fetches a rate with the standard timeout and freshness checks.
pub async fn fetch_rate_checked(
    provider: &dyn RateProvider,
    base: &str,
    currency: &str,
) -> Result<Decimal, RateError> {
    fetch_rate_within(provider, base, currency, RATE_FETCH_TIMEOUT).await
}

pub async fn fetch_rate_within(
    provider: &dyn RateProvider,
    base: &str,
    currency: &str,
    timeout: Duration,
) -> Result<Decimal, RateError> {
    let quote = tokio::time::timeout(timeout, provider.fetch_rate(base, currency))
        .await
        .map_err(|_| RateError::Timeout(currency.to_string()))??;

    let age = Utc::now().signed_duration_since(quote.last_updated);
    let max_age = chrono::Duration::from_std(RATE_MAX_AGE).unwrap_or_else(|_| chrono::Duration::minutes(5));
    if age > max_age {
        return Err(RateError::Stale {
            currency: currency.to_string(),
            age_secs: age.num_seconds(),
        });
    }
    if quote.rate <= Decimal::ZERO {
        return Err(RateError::NonPositive(currency.to_string()));
    }
    tracing::info!(base, currency, rate = %quote.rate, "conversion rate fetched");
    Ok(quote.rate)
}
