use super::engine::BookingEngine;
use crate::domain::access::{Access, AccessGuard, Operation};
use crate::domain::booking::{BookingStatus, PaymentStatus};
use crate::domain::money::Money;
use crate::domain::payment::PaymentChannel;
use crate::domain::user::UserId;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Booking and payment totals. Staff see the counts only; administrators also
/// get the money columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialReport {
    pub bookings_by_status: BTreeMap<BookingStatus, usize>,
    /// Cancelled bookings whose money has not been returned yet.
    pub pending_refunds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_by_channel: Option<BTreeMap<PaymentChannel, Money>>,
}

impl BookingEngine {
    pub async fn financial_report(&self, actor: UserId) -> Result<FinancialReport> {
        let actor = self.actor(actor).await?;
        let access = AccessGuard::authorize(&actor, Operation::ViewFinancialReports)?;

        let bookings = self.bookings.get_all().await?;
        let mut bookings_by_status = BTreeMap::new();
        for booking in &bookings {
            *bookings_by_status.entry(booking.status).or_insert(0) += 1;
        }
        let pending_refunds = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Cancelled && b.payment_status == PaymentStatus::Paid)
            .count();

        let mut report = FinancialReport {
            bookings_by_status,
            pending_refunds,
            revenue: None,
            refunded: None,
            collected_by_channel: None,
        };
        if access != Access::Full {
            return Ok(report);
        }

        let payments = self.payments.get_all().await?;
        let mut collected = BTreeMap::new();
        let mut refunded = Money::ZERO;
        for payment in &payments {
            if !matches!(payment.status, PaymentStatus::Paid | PaymentStatus::Refunded) {
                continue;
            }
            *collected.entry(payment.channel()).or_insert(Money::ZERO) += Money::from(payment.amount);
            if let Some(amount) = payment
                .refund
                .as_ref()
                .filter(|r| r.is_settled())
                .and_then(|r| r.amount)
            {
                refunded += Money::from(amount);
            }
        }
        let gross: Money = collected.values().copied().sum();
        report.revenue = Some(Money::new(gross.0 - refunded.0));
        report.refunded = Some(refunded);
        report.collected_by_channel = Some(collected);
        Ok(report)
    }
}
