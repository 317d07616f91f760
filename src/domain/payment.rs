use super::booking::{BookingId, PaymentStatus};
use super::money::Amount;
use super::user::UserId;
use crate::error::BookingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentChannel {
    Card,
    MobileMoney,
}

impl fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentChannel::Card => f.write_str("CARD"),
            PaymentChannel::MobileMoney => f.write_str("MOBILE_MONEY"),
        }
    }
}

/// Channel-specific data captured when the payment was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelDetails {
    Card {
        intent_id: String,
    },
    MobileMoney {
        operator: String,
        phone_number: String,
        recipient: String,
        instructions_sent_at: DateTime<Utc>,
        confirmed_by: Option<UserId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub requested_at: DateTime<Utc>,
    pub amount: Option<Amount>,
    pub reference: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Refund {
    pub fn is_issued(&self) -> bool {
        self.amount.is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking: BookingId,
    pub details: ChannelDetails,
    /// Gateway intent id for cards, `operator:phone:payment` for mobile money.
    pub external_reference: String,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub refund: Option<Refund>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn card(booking: BookingId, intent_id: String, amount: Amount, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            booking,
            external_reference: intent_id.clone(),
            details: ChannelDetails::Card { intent_id },
            amount,
            status: PaymentStatus::Pending,
            refund: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mobile_money(
        booking: BookingId,
        operator: String,
        phone_number: String,
        recipient: String,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        let id = PaymentId::new();
        Self {
            id,
            booking,
            external_reference: format!("{operator}:{phone_number}:{}", id.0.simple()),
            details: ChannelDetails::MobileMoney {
                operator,
                phone_number,
                recipient,
                instructions_sent_at: now,
                confirmed_by: None,
            },
            amount,
            status: PaymentStatus::Pending,
            refund: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn channel(&self) -> PaymentChannel {
        match self.details {
            ChannelDetails::Card { .. } => PaymentChannel::Card,
            ChannelDetails::MobileMoney { .. } => PaymentChannel::MobileMoney,
        }
    }

    /// Failed attempts no longer count against the one-active-payment rule.
    pub fn is_active(&self) -> bool {
        self.status != PaymentStatus::Failed
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Paid;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.updated_at = now;
    }

    pub fn record_confirmation(&mut self, staff: UserId, now: DateTime<Utc>) {
        if let ChannelDetails::MobileMoney { confirmed_by, .. } = &mut self.details {
            *confirmed_by = Some(staff);
        }
        self.mark_paid(now);
    }

    /// Notes that the booking was cancelled while paid; no money moves yet.
    pub fn request_refund(&mut self, now: DateTime<Utc>) {
        if self.refund.is_none() {
            self.refund = Some(Refund {
                requested_at: now,
                amount: None,
                reference: None,
                settled_at: None,
            });
            self.updated_at = now;
        }
    }

    /// Records that a refund of `amount` has been sent out.
    pub fn issue_refund(
        &mut self,
        amount: Amount,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if self.status != PaymentStatus::Paid {
            return Err(BookingError::ValidationError(format!(
                "Payment {} is {} and cannot be refunded",
                self.id, self.status
            )));
        }
        if amount > self.amount {
            return Err(BookingError::ValidationError(format!(
                "Refund {} exceeds the original payment {}",
                amount, self.amount
            )));
        }
        let refund = self.refund.get_or_insert(Refund {
            requested_at: now,
            amount: None,
            reference: None,
            settled_at: None,
        });
        refund.amount = Some(amount);
        refund.reference = reference;
        self.updated_at = now;
        Ok(())
    }

    pub fn settle_refund(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        match &mut self.refund {
            Some(refund) if refund.is_issued() => {
                refund.settled_at = Some(now);
                self.status = PaymentStatus::Refunded;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(BookingError::ValidationError(format!(
                "Payment {} has no issued refund to settle",
                self.id
            ))),
        }
    }
}

/// Kinds of event the card gateway reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEventKind {
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "refund.succeeded")]
    RefundSucceeded,
}

/// A verified event delivered by the card gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: GatewayEventKind,
    /// The payment intent the event is about.
    pub reference: String,
    pub amount: Amount,
}
