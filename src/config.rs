//! Verifier configuration.
//!
//! Values come from built-in defaults, optionally a JSON file, and finally
//! environment variables with the `RECEIPT_VERIFIER_` prefix.

use crate::error::{Result, VerifyError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// What the coordinator does with a receipt the service declared invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidReceiptPolicy {
    /// Report an anomaly and keep the record for an operator.
    #[default]
    Escalate,
    /// Delete the record right away.
    Discard,
}

impl InvalidReceiptPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "escalate" => Some(Self::Escalate),
            "discard" => Some(Self::Discard),
            _ => None,
        }
    }
}

/// Re-queue schedule for failed order/validation requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Failed cycles after which the coordinator stops re-queuing a task.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retries immediately; meant for tests and tooling.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before re-dispatching after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let delay = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Attempt count above which a record is reported as an anomaly.
    pub attempt_warning_threshold: u32,
    pub retry: RetryPolicy,
    pub invalid_receipt_policy: InvalidReceiptPolicy,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            attempt_warning_threshold: 5,
            retry: RetryPolicy::default(),
            invalid_receipt_policy: InvalidReceiptPolicy::default(),
        }
    }
}

impl VerifierConfig {
    /// Reads a JSON configuration file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| VerifyError::Config(e.to_string()))
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies `RECEIPT_VERIFIER_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parsed<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
            value
                .map(|v| {
                    v.trim()
                        .parse()
                        .map_err(|_| VerifyError::Config(format!("invalid value for {key}: {v}")))
                })
                .transpose()
        }

        const THRESHOLD: &str = "RECEIPT_VERIFIER_ATTEMPT_WARNING_THRESHOLD";
        const MAX_ATTEMPTS: &str = "RECEIPT_VERIFIER_RETRY_MAX_ATTEMPTS";
        const INITIAL_DELAY: &str = "RECEIPT_VERIFIER_RETRY_INITIAL_DELAY_MS";
        const MAX_DELAY: &str = "RECEIPT_VERIFIER_RETRY_MAX_DELAY_MS";
        const POLICY: &str = "RECEIPT_VERIFIER_INVALID_RECEIPT_POLICY";

        if let Some(v) = parsed(THRESHOLD, lookup(THRESHOLD))? {
            self.attempt_warning_threshold = v;
        }
        if let Some(v) = parsed(MAX_ATTEMPTS, lookup(MAX_ATTEMPTS))? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parsed(INITIAL_DELAY, lookup(INITIAL_DELAY))? {
            self.retry.initial_delay_ms = v;
        }
        if let Some(v) = parsed(MAX_DELAY, lookup(MAX_DELAY))? {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = lookup(POLICY) {
            self.invalid_receipt_policy = InvalidReceiptPolicy::parse(&v)
                .ok_or_else(|| VerifyError::Config(format!("invalid value for {POLICY}: {v}")))?;
        }
        Ok(self)
    }
}
