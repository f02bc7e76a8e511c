//! Queue configuration.
//!
//! A [`QueueConfig`] is plain data fixed at construction. It can be built in
//! code or read from the environment using the DogRS `PREFIX__KEY`
//! convention:
//!
//! ```bash
//! export TXQ__MAX_PENDING=16
//! export TXQ__FAILURE_POLICY=isolate
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{QueueError, QueueResult};

/// What a failed submission does to the other submissions in its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Cancel the group token so every sibling still in flight observes
    /// cancellation. The next submission gets a fresh group.
    #[default]
    CancelGroup,

    /// Leave siblings alone; the failure is only reported in its receipt.
    Isolate,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancelGroup => "cancel-group",
            Self::Isolate => "isolate",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel-group" | "cancel_group" => Ok(Self::CancelGroup),
            "isolate" => Ok(Self::Isolate),
            other => Err(QueueError::UnknownFailurePolicy(other.to_string())),
        }
    }
}

/// Configuration for a send queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of submissions in flight at once (0 = no limit)
    pub max_pending: u64,
    /// Reaction of a group to one of its submissions failing
    pub failure_policy: FailurePolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: 0,
            failure_policy: FailurePolicy::CancelGroup,
        }
    }
}

impl QueueConfig {
    pub fn new(max_pending: u64) -> Self {
        Self {
            max_pending,
            ..Self::default()
        }
    }

    pub fn with_max_pending(mut self, max_pending: u64) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Load overrides from environment variables named `<prefix>__<KEY>`.
    ///
    /// Unset keys keep their defaults. Recognised keys: `MAX_PENDING`,
    /// `FAILURE_POLICY`.
    pub fn from_env(prefix: &str) -> QueueResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> QueueResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let key = format!("{prefix}__MAX_PENDING");
        if let Some(value) = lookup(&key) {
            config.max_pending = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                QueueError::InvalidConfig {
                    key: key.clone(),
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        let key = format!("{prefix}__FAILURE_POLICY");
        if let Some(value) = lookup(&key) {
            config.failure_policy = value.parse()?;
        }

        Ok(config)
    }

    /// Concurrency limit actually enforced, or `None` when unbounded.
    ///
    /// Limits beyond what a tokio semaphore can hold are clamped to
    /// [`Semaphore::MAX_PERMITS`]; no real deployment gets near it.
    pub fn effective_limit(&self) -> Option<usize> {
        if self.max_pending == 0 {
            return None;
        }
        let requested = usize::try_from(self.max_pending).unwrap_or(usize::MAX);
        if requested > Semaphore::MAX_PERMITS {
            warn!(
                requested = self.max_pending,
                clamped = Semaphore::MAX_PERMITS,
                "max_pending exceeds the semaphore limit; clamping"
            );
            return Some(Semaphore::MAX_PERMITS);
        }
        Some(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn default_is_unbounded_with_group_cancellation() {
        let config = QueueConfig::default();
        assert_eq!(config.max_pending, 0);
        assert_eq!(config.failure_policy, FailurePolicy::CancelGroup);
        assert_eq!(config.effective_limit(), None);
    }

    #[test]
    fn builder_methods_override_fields() {
        let config = QueueConfig::new(4).with_failure_policy(FailurePolicy::Isolate);
        assert_eq!(config.effective_limit(), Some(4));
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert_eq!(config.with_max_pending(9).max_pending, 9);
    }

    #[test]
    fn oversized_limit_is_clamped() {
        let config = QueueConfig::new(u64::MAX);
        assert_eq!(config.effective_limit(), Some(Semaphore::MAX_PERMITS));
    }

    #[test]
    fn failure_policy_parses_both_spellings() {
        assert_eq!("cancel-group".parse::<FailurePolicy>().unwrap(), FailurePolicy::CancelGroup);
        assert_eq!("CANCEL_GROUP".parse::<FailurePolicy>().unwrap(), FailurePolicy::CancelGroup);
        assert_eq!(" isolate ".parse::<FailurePolicy>().unwrap(), FailurePolicy::Isolate);
        assert!(matches!(
            "retry".parse::<FailurePolicy>(),
            Err(QueueError::UnknownFailurePolicy(p)) if p == "retry"
        ));
    }

    #[test]
    fn lookup_reads_prefixed_keys() {
        let config = QueueConfig::from_lookup(
            "TXQ",
            lookup_from(&[("TXQ__MAX_PENDING", "16"), ("TXQ__FAILURE_POLICY", "isolate")]),
        )
        .unwrap();
        assert_eq!(config, QueueConfig::new(16).with_failure_policy(FailurePolicy::Isolate));
    }

    #[test]
    fn lookup_keeps_defaults_for_missing_keys() {
        let config = QueueConfig::from_lookup("TXQ", lookup_from(&[])).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn lookup_rejects_bad_numbers() {
        let err = QueueConfig::from_lookup("TXQ", lookup_from(&[("TXQ__MAX_PENDING", "-1")]))
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidConfig { ref key, .. } if key == "TXQ__MAX_PENDING"));
    }

    #[test]
    fn from_env_reads_process_environment() {
        std::env::set_var("DOG_SENDQ_CONFIG_TEST__MAX_PENDING", "3");
        let config = QueueConfig::from_env("DOG_SENDQ_CONFIG_TEST").unwrap();
        std::env::remove_var("DOG_SENDQ_CONFIG_TEST__MAX_PENDING");
        assert_eq!(config.max_pending, 3);
    }
}
