//! Rollout policy: how long to wait and how often to retry.

use std::time::Duration;

use shipyard_core::WaitConfig;
use shipyard_ecs::WaitPolicy;

/// Timeout and retry settings applied to every service in a rollout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutPolicy {
    /// Seconds to wait for the service to report stable.
    pub wait_timeout_secs: u64,
    /// Seconds between status polls while waiting.
    pub poll_interval_secs: u64,
    /// Extra registration attempts after a transient failure. Each retry may
    /// leave one additional revision behind, so keep this small.
    pub registration_retries: u32,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 600,
            poll_interval_secs: 15,
            registration_retries: 1,
        }
    }
}

impl RolloutPolicy {
    /// Fill unset values from the defaults.
    pub fn from_config(config: &WaitConfig) -> Self {
        let defaults = Self::default();
        Self {
            wait_timeout_secs: config.timeout_secs.unwrap_or(defaults.wait_timeout_secs),
            poll_interval_secs: config
                .poll_interval_secs
                .unwrap_or(defaults.poll_interval_secs)
                .max(1),
            registration_retries: config
                .registration_retries
                .unwrap_or(defaults.registration_retries),
        }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(self.wait_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_services_stable_waiter() {
        let p = RolloutPolicy::default();
        assert_eq!(p.wait_timeout_secs / p.poll_interval_secs, 40);
        assert_eq!(p.registration_retries, 1);
    }

    #[test]
    fn config_overrides_defaults() {
        let p = RolloutPolicy::from_config(&WaitConfig {
            timeout_secs: Some(120),
            poll_interval_secs: Some(0),
            registration_retries: None,
        });
        assert_eq!(p.wait_timeout_secs, 120);
        assert_eq!(p.poll_interval_secs, 1);
        assert_eq!(p.registration_retries, 1);

        let w = p.wait_policy();
        assert_eq!(w.timeout, Duration::from_secs(120));
        assert_eq!(w.poll_interval, Duration::from_secs(1));
    }
}
