use crate::error::{PaymentError, Result};
use std::time::Duration;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONCILE_BATCH: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

/// Tunables shared by the orchestrator, reconciler and read service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single gateway `submit`; elapsed means indeterminate.
    pub gateway_timeout: Duration,
    /// Pause between reconciliation passes in the background loop.
    pub reconcile_interval: Duration,
    /// Maximum queue entries handled per pass.
    pub reconcile_batch: usize,
    /// Default and maximum page size for transaction history.
    pub history_limit: usize,
    /// Age after which an unresolved ledger row with no queue entry is
    /// picked up by the reconciler sweep.
    pub stale_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            reconcile_batch: DEFAULT_RECONCILE_BATCH,
            history_limit: DEFAULT_HISTORY_LIMIT,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl EngineConfig {
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn with_reconcile_batch(mut self, batch: usize) -> Self {
        self.reconcile_batch = batch;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway_timeout.is_zero() {
            return Err(PaymentError::InvalidCommand(
                "gateway timeout must be greater than zero".to_string(),
            ));
        }
        if self.reconcile_interval.is_zero() {
            return Err(PaymentError::InvalidCommand(
                "reconcile interval must be greater than zero".to_string(),
            ));
        }
        if self.stale_after <= self.gateway_timeout {
            return Err(PaymentError::InvalidCommand(
                "stale threshold must exceed the gateway timeout".to_string(),
            ));
        }
        if self.reconcile_batch == 0 || self.history_limit == 0 {
            return Err(PaymentError::InvalidCommand(
                "batch and history limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
