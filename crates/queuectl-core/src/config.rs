//! Resolved tunables.
//!
//! Where the values come from (a file, flags, env) is the caller's business.
//! The core only sees the numbers.

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;
pub const DEFAULT_WORKER_COUNT: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Used when a job definition does not carry its own `max_retries`.
    pub max_retries: u32,

    /// Retry delay is `backoff_base^attempts` seconds.
    pub backoff_base: f64,

    pub worker_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.backoff_base.is_finite() && self.backoff_base > 0.0) {
            return Err(QueueError::Validation(format!(
                "backoff-base must be a positive number, got {}",
                self.backoff_base
            )));
        }
        if self.worker_count == 0 {
            return Err(QueueError::Validation(
                "worker-count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.backoff_base, 2.0);
        assert_eq!(cfg.worker_count, 1);
        cfg.validate().unwrap();
    }

    #[rstest]
    #[case::zero_base(0.0, 1)]
    #[case::negative_base(-2.0, 1)]
    #[case::nan_base(f64::NAN, 1)]
    #[case::no_workers(2.0, 0)]
    fn invalid_values_are_rejected(#[case] backoff_base: f64, #[case] worker_count: usize) {
        let cfg = QueueConfig {
            backoff_base,
            worker_count,
            ..QueueConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(QueueError::Validation(_))));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: QueueConfig = serde_json::from_str(r#"{"worker-count": 4}"#).unwrap();
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(cfg.backoff_base, DEFAULT_BACKOFF_BASE);
    }
}
