use crate::domain::booking::BookingId;
use crate::domain::money::Amount;
use crate::domain::ports::{GatewayIntent, PaymentGateway, RefundReceipt, RefundState};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRefund {
    pub intent_id: String,
    pub amount: Amount,
    pub reference: String,
}

/// An in-process stand-in for the card gateway.
///
/// Intent and refund ids carry a random uuid (`pi_<uuid>`, `re_<uuid>`), so
/// references never repeat across restarts over the same persistent store. The
/// gateway never calls back by itself; the matching webhook events are
/// delivered by whoever drives it.
#[derive(Clone, Default)]
pub struct SimulatedGateway {
    unreachable: Arc<AtomicBool>,
    settle_refunds_immediately: bool,
    latency: Option<Duration>,
    refunds: Arc<RwLock<Vec<RecordedRefund>>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refunds report `Succeeded` straight away instead of waiting for an event.
    pub fn settling_refunds_immediately(mut self) -> Self {
        self.settle_refunds_immediately = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub async fn refunds(&self) -> Vec<RecordedRefund> {
        self.refunds.read().await.clone()
    }

    async fn round_trip(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BookingError::GatewayError("gateway unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        booking: BookingId,
        amount: Amount,
        instrument: &str,
    ) -> Result<GatewayIntent> {
        if instrument.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "payment instrument reference is required".to_string(),
            ));
        }
        self.round_trip().await?;
        let intent_id = format!("pi_{}", Uuid::new_v4().simple());
        tracing::debug!(%booking, %amount, %intent_id, "gateway intent created");
        Ok(GatewayIntent {
            client_secret: format!("{intent_id}_secret"),
            intent_id,
        })
    }

    async fn refund(&self, intent_id: &str, amount: Amount) -> Result<RefundReceipt> {
        self.round_trip().await?;
        let reference = format!("re_{}", Uuid::new_v4().simple());
        self.refunds.write().await.push(RecordedRefund {
            intent_id: intent_id.to_string(),
            amount,
            reference: reference.clone(),
        });
        let state = if self.settle_refunds_immediately {
            RefundState::Succeeded
        } else {
            RefundState::Pending
        };
        Ok(RefundReceipt { reference, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_ids_never_repeat_across_instances() {
        let amount = Amount::new(dec!(10)).unwrap();
        let first = SimulatedGateway::new()
            .create_intent(BookingId::new(), amount, "pm_card")
            .await
            .unwrap();
        let restarted = SimulatedGateway::new();
        let second = restarted
            .create_intent(BookingId::new(), amount, "pm_card")
            .await
            .unwrap();
        assert!(first.intent_id.starts_with("pi_"));
        assert_ne!(first.intent_id, second.intent_id);
        assert_eq!(second.client_secret, format!("{}_secret", second.intent_id));

        let refund = restarted.refund(&second.intent_id, amount).await.unwrap();
        assert!(refund.reference.starts_with("re_"));
        assert_eq!(refund.state, RefundState::Pending);
        assert_eq!(restarted.refunds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_retryable() {
        let gateway = SimulatedGateway::new();
        gateway.set_unreachable(true);
        let err = gateway
            .create_intent(BookingId::new(), Amount::new(dec!(10)).unwrap(), "pm_card")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
