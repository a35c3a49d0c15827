// ============================================================================
// Engine Configuration
// Lock timeouts, fee schedule, trading session and retry behaviour
// ============================================================================

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::LiquiditySide;
use crate::numeric::{self, NumericResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Backoff schedule for retrying lock timeouts at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Upper bound on waiting for a per-asset book lock
    pub lock_timeout: Duration,

    /// Commission rate charged on the maker's notional
    pub maker_fee_rate: Decimal,

    /// Commission rate charged on the taker's notional
    pub taker_fee_rate: Decimal,

    /// Local wall-clock time at which DAY orders expire
    pub session_close: NaiveTime,

    /// Offset of the exchange's local time from UTC, in seconds
    pub utc_offset_seconds: i32,

    /// Levels returned by depth queries that do not name a count
    pub default_depth: usize,

    /// Capacity of the bounded outbound event channel
    pub event_channel_capacity: usize,

    pub retry: RetryPolicy,

    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(50),
            maker_fee_rate: Decimal::ZERO,
            taker_fee_rate: Decimal::ZERO,
            session_close: NaiveTime::MIN,
            utc_offset_seconds: 0,
            default_depth: 10,
            event_channel_capacity: 4096,
            retry: RetryPolicy::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: Set lock acquisition timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Builder method: Set maker and taker commission rates
    pub fn with_fees(mut self, maker_fee_rate: Decimal, taker_fee_rate: Decimal) -> Self {
        self.maker_fee_rate = maker_fee_rate;
        self.taker_fee_rate = taker_fee_rate;
        self
    }

    /// Builder method: Set the trading session close in local time
    pub fn with_session_close(mut self, close: NaiveTime, utc_offset_seconds: i32) -> Self {
        self.session_close = close;
        self.utc_offset_seconds = utc_offset_seconds;
        self
    }

    /// Builder method: Set default depth levels
    pub fn with_default_depth(mut self, levels: usize) -> Self {
        self.default_depth = levels;
        self
    }

    /// Builder method: Set event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Builder method: Set retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method: Set expiry sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::Invalid("lock timeout must be positive".into()));
        }

        for (name, rate) in [
            ("maker fee rate", self.maker_fee_rate),
            ("taker fee rate", self.taker_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }

        if self.utc_offset_seconds.unsigned_abs() >= 86_400 {
            return Err(ConfigError::Invalid(
                "UTC offset must be less than one day".into(),
            ));
        }

        if self.default_depth == 0 {
            return Err(ConfigError::Invalid("default depth must be positive".into()));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event channel capacity must be positive".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry policy needs at least one attempt".into(),
            ));
        }

        Ok(())
    }

    /// Create config from environment variables
    ///
    /// Reads, falling back to the default for anything unset:
    /// - `MATCHING_LOCK_TIMEOUT_MS`
    /// - `MATCHING_MAKER_FEE` / `MATCHING_TAKER_FEE`: decimal rates
    /// - `MATCHING_SESSION_CLOSE`: `HH:MM` or `HH:MM:SS` local time
    /// - `MATCHING_UTC_OFFSET_SECS`
    /// - `MATCHING_EVENT_CAPACITY`
    /// - `MATCHING_RETRY_ATTEMPTS` / `MATCHING_RETRY_BACKOFF_MS`
    /// - `MATCHING_SWEEP_INTERVAL_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_env::<u64>("MATCHING_LOCK_TIMEOUT_MS")? {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(rate) = parse_env::<Decimal>("MATCHING_MAKER_FEE")? {
            config.maker_fee_rate = rate;
        }
        if let Some(rate) = parse_env::<Decimal>("MATCHING_TAKER_FEE")? {
            config.taker_fee_rate = rate;
        }
        if let Ok(raw) = env::var("MATCHING_SESSION_CLOSE") {
            config.session_close = parse_session_close(&raw)?;
        }
        if let Some(offset) = parse_env::<i32>("MATCHING_UTC_OFFSET_SECS")? {
            config.utc_offset_seconds = offset;
        }
        if let Some(capacity) = parse_env::<usize>("MATCHING_EVENT_CAPACITY")? {
            config.event_channel_capacity = capacity;
        }
        if let Some(attempts) = parse_env::<u32>("MATCHING_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_env::<u64>("MATCHING_RETRY_BACKOFF_MS")? {
            config.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("MATCHING_SWEEP_INTERVAL_MS")? {
            config.sweep_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    // ========================================================================
    // Derived Rules
    // ========================================================================

    /// Commission for one execution: notional × the maker or taker rate
    pub fn commission(
        &self,
        liquidity: LiquiditySide,
        price: Decimal,
        quantity: Decimal,
    ) -> NumericResult<Decimal> {
        let rate = match liquidity {
            LiquiditySide::Maker => self.maker_fee_rate,
            LiquiditySide::Taker => self.taker_fee_rate,
        };
        numeric::notional(numeric::notional(price, quantity)?, rate)
    }

    /// First session close strictly after `created`. A DAY order expires then.
    pub fn day_order_expires_at(&self, created: DateTime<Utc>) -> DateTime<Utc> {
        let offset = TimeDelta::seconds(i64::from(self.utc_offset_seconds));
        let local = created.naive_utc() + offset;
        let close_local = local.date().and_time(self.session_close);

        let mut close = (close_local - offset).and_utc();
        if close <= created {
            close += TimeDelta::days(1);
        }
        close
    }

    pub fn is_day_expired(&self, created: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.day_order_expires_at(created)
    }
}

fn parse_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_session_close(raw: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|e| ConfigError::InvalidEnv {
            key: "MATCHING_SESSION_CLOSE",
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
