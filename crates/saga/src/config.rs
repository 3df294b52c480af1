//! Saga runtime settings.

use std::time::Duration;

use domain::DEFAULT_AUTO_RELEASE_DAYS;

/// Settings shared by the orchestrator, its steps and the escrow service.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Upper bound for every external call.
    pub call_timeout: Duration,

    /// Grace period before held funds become eligible for auto-release.
    pub auto_release_days: u32,

    /// Currency used when a request does not name one.
    pub currency: String,
}

impl SagaConfig {
    /// Sets the per-call timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Sets the auto-release grace period.
    pub fn with_auto_release_days(mut self, days: u32) -> Self {
        self.auto_release_days = days;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            auto_release_days: DEFAULT_AUTO_RELEASE_DAYS,
            currency: "USD".to_string(),
        }
    }
}
