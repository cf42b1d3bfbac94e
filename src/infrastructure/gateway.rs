use crate::domain::gateway::{GatewayOutcome, GatewayRequest};
use crate::domain::ports::GatewayAdapter;
use crate::domain::transaction::TransactionId;
use crate::error::PaymentError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// How the simulated provider answers new submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayBehavior {
    #[default]
    Accept,
    Reject,
    /// The provider charges, but its response never arrives.
    Hang,
}

impl FromStr for GatewayBehavior {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "accept" => Ok(GatewayBehavior::Accept),
            "reject" => Ok(GatewayBehavior::Reject),
            "hang" => Ok(GatewayBehavior::Hang),
            other => Err(PaymentError::InvalidCommand(format!(
                "Unknown gateway behavior '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for GatewayBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GatewayBehavior::Accept => "accept",
            GatewayBehavior::Reject => "reject",
            GatewayBehavior::Hang => "hang",
        })
    }
}

/// An in-process stand-in for the settlement provider.
///
/// Keeps its own record of what it did per transaction id, so a repeated
/// submit returns the original answer and `query` reflects charges whose
/// response was lost.
#[derive(Clone)]
pub struct SimulatedGateway {
    behavior: GatewayBehavior,
    latency: Duration,
    records: Arc<RwLock<HashMap<TransactionId, GatewayOutcome>>>,
    submissions: Arc<AtomicUsize>,
}

impl SimulatedGateway {
    pub fn new(behavior: GatewayBehavior) -> Self {
        Self {
            behavior,
            latency: Duration::ZERO,
            records: Arc::default(),
            submissions: Arc::default(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `submit` calls received, including repeats.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn decide(&self) -> GatewayOutcome {
        match self.behavior {
            GatewayBehavior::Accept | GatewayBehavior::Hang => GatewayOutcome::Accepted {
                provider_reference: format!("psp_{}", ulid::Ulid::new()),
            },
            GatewayBehavior::Reject => GatewayOutcome::Rejected {
                reason: "declined by provider".to_string(),
            },
        }
    }
}

#[async_trait]
impl GatewayAdapter for SimulatedGateway {
    async fn submit(&self, request: &GatewayRequest) -> GatewayOutcome {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = {
            let mut records = self.records.write().await;
            records
                .entry(request.transaction_id)
                .or_insert_with(|| self.decide())
                .clone()
        };
        debug!(
            transaction_id = %request.transaction_id,
            user_id = request.user_id,
            amount = %request.amount,
            method = %request.method,
            outcome = ?outcome,
            "Simulated gateway processed submission"
        );

        if self.behavior == GatewayBehavior::Hang {
            return std::future::pending::<GatewayOutcome>().await;
        }
        outcome
    }

    async fn query(&self, transaction_id: TransactionId) -> GatewayOutcome {
        let records = self.records.read().await;
        records
            .get(&transaction_id)
            .cloned()
            .unwrap_or_else(|| GatewayOutcome::Rejected {
                reason: "unknown to provider".to_string(),
            })
    }
}
