//! Payment reconciliation.
//!
//! Bridges the two payment channels into state-machine transitions. Card
//! outcomes arrive as signed gateway events that may be duplicated or
//! reordered; mobile-money transfers are confirmed by staff. Every path is
//! idempotent per payment, and the payment is always written before the
//! booking so a CONFIRMED booking never points at an unpaid payment. A crash
//! between the two writes is repaired when the event or confirmation is
//! delivered again.

use super::engine::{BookingEngine, with_deadline};
use crate::domain::access::{AccessGuard, Operation};
use crate::domain::booking::{Booking, BookingEvent, BookingId, BookingStatus, PaymentStatus};
use crate::domain::money::Amount;
use crate::domain::payment::{
    ChannelDetails, GatewayEvent, GatewayEventKind, Payment, PaymentChannel, PaymentId,
};
use crate::domain::ports::RefundState;
use crate::domain::user::UserId;
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};

/// What the client needs to complete a card payment with the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentIntent {
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Amount,
}

/// Transfer instructions handed to a guest paying by mobile money.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileMoneyInstructions {
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    pub operator: String,
    pub recipient: String,
    pub amount: Amount,
    pub reference: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// The event moved the payment or booking forward.
    Applied,
    /// Already applied; nothing changed.
    Duplicate,
    /// Stale or out of order; logged and ignored.
    Discarded,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Defaults to the full amount paid.
    #[serde(default)]
    pub amount: Option<Amount>,
    /// Transfer reference for a manually sent mobile-money refund.
    #[serde(default)]
    pub reference: Option<String>,
}

impl BookingEngine {
    pub async fn start_card_payment(
        &self,
        actor: UserId,
        booking_id: BookingId,
        instrument: &str,
    ) -> Result<CardPaymentIntent> {
        let actor = self.actor(actor).await?;
        let _guard = self.lock_booking(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        AccessGuard::authorize_for(&actor, Operation::StartPayment, booking.owner)?;
        self.prepare_payment_attempt(&mut booking, actor.id).await?;

        let intent = with_deadline(
            "gateway intent",
            self.config.gateway_timeout,
            self.gateway
                .create_intent(booking.id, booking.total_amount, instrument),
        )
        .await?;

        let payment = Payment::card(
            booking.id,
            intent.intent_id.clone(),
            booking.total_amount,
            self.clock.now(),
        );
        self.save_payment(payment.clone()).await?;
        self.save_booking(booking.clone()).await?;

        tracing::info!(
            booking = %booking.id,
            payment = %payment.id,
            intent = %intent.intent_id,
            amount = %payment.amount,
            "card payment started"
        );
        Ok(CardPaymentIntent {
            payment_id: payment.id,
            booking_id: booking.id,
            intent_id: intent.intent_id,
            client_secret: intent.client_secret,
            amount: payment.amount,
        })
    }

    pub async fn start_mobile_payment(
        &self,
        actor: UserId,
        booking_id: BookingId,
        phone_number: &str,
        operator: &str,
    ) -> Result<MobileMoneyInstructions> {
        let actor = self.actor(actor).await?;
        let phone_number = phone_number.trim();
        if !is_phone_number(phone_number) {
            return Err(BookingError::ValidationError(format!(
                "invalid phone number '{phone_number}'"
            )));
        }
        let operator = operator.trim().to_lowercase();
        let recipient = self
            .config
            .mobile_money
            .recipient(&operator)
            .ok_or_else(|| {
                BookingError::ValidationError(format!("unsupported mobile money operator '{operator}'"))
            })?
            .to_string();

        let _guard = self.lock_booking(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        AccessGuard::authorize_for(&actor, Operation::StartPayment, booking.owner)?;
        self.prepare_payment_attempt(&mut booking, actor.id).await?;

        let payment = Payment::mobile_money(
            booking.id,
            operator.clone(),
            phone_number.to_string(),
            recipient.clone(),
            booking.total_amount,
            self.clock.now(),
        );
        self.save_payment(payment.clone()).await?;
        self.save_booking(booking.clone()).await?;

        tracing::info!(
            booking = %booking.id,
            payment = %payment.id,
            %operator,
            amount = %payment.amount,
            "mobile money payment awaiting transfer"
        );
        let message = format!(
            "Send {} via {} to {} quoting reference {}. Your booking is confirmed once staff verify the transfer.",
            payment.amount,
            operator.to_uppercase(),
            recipient,
            payment.external_reference
        );
        Ok(MobileMoneyInstructions {
            payment_id: payment.id,
            booking_id: booking.id,
            operator,
            recipient,
            amount: payment.amount,
            reference: payment.external_reference,
            message,
        })
    }

    /// Staff confirmation that a mobile-money transfer arrived. Confirming an
    /// already confirmed payment is a no-op.
    pub async fn confirm_mobile_payment(&self, actor: UserId, payment_id: PaymentId) -> Result<Booking> {
        let actor = self.actor(actor).await?;
        AccessGuard::authorize(&actor, Operation::ConfirmMobilePayment)?;
        let booking_id = self.load_payment(payment_id).await?.booking;

        let _guard = self.lock_booking(booking_id).await;
        let mut payment = self.load_payment(payment_id).await?;
        let mut booking = self.load_booking(booking_id).await?;
        if payment.channel() != PaymentChannel::MobileMoney {
            return Err(BookingError::ValidationError(format!(
                "payment {payment_id} is a {} payment",
                payment.channel()
            )));
        }

        let now = self.clock.now();
        match payment.status {
            PaymentStatus::Paid if booking.status == BookingStatus::Pending => {
                booking.confirm(now)?;
                self.save_booking(booking.clone()).await?;
                tracing::info!(booking = %booking.id, payment = %payment.id, "confirmation completed");
                return Ok(booking);
            }
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                tracing::debug!(payment = %payment.id, "mobile money payment already confirmed");
                return Ok(booking);
            }
            // A transfer that lands after its attempt was rejected or expired
            // still counts while nothing else is in flight.
            PaymentStatus::Failed => {
                if self.active_payment(booking.id).await?.is_some() {
                    let err = BookingError::invalid_transition(
                        booking.status,
                        BookingEvent::ConfirmPayment,
                        "another payment attempt is active",
                    );
                    self.audit_rejection(booking.id, Some(actor.id), &err).await;
                    return Err(err);
                }
            }
            PaymentStatus::Pending => {}
        }

        if booking.status != BookingStatus::Pending {
            let err = BookingError::invalid_transition(
                booking.status,
                BookingEvent::ConfirmPayment,
                "status must be PENDING",
            );
            self.audit_rejection(booking.id, Some(actor.id), &err).await;
            return Err(err);
        }
        payment.record_confirmation(actor.id, now);
        self.save_payment(payment.clone()).await?;
        booking.confirm(now)?;
        self.save_booking(booking.clone()).await?;
        tracing::info!(
            booking = %booking.id,
            payment = %payment.id,
            staff = %actor.id,
            "mobile money payment confirmed"
        );
        Ok(booking)
    }

    /// Staff verdict that a mobile-money transfer never arrived. The attempt
    /// fails and the guest may start a new one on either channel.
    pub async fn reject_mobile_payment(&self, actor: UserId, payment_id: PaymentId) -> Result<Booking> {
        let actor = self.actor(actor).await?;
        AccessGuard::authorize(&actor, Operation::ConfirmMobilePayment)?;
        let booking_id = self.load_payment(payment_id).await?.booking;

        let _guard = self.lock_booking(booking_id).await;
        let mut payment = self.load_payment(payment_id).await?;
        let mut booking = self.load_booking(booking_id).await?;
        if payment.channel() != PaymentChannel::MobileMoney {
            return Err(BookingError::ValidationError(format!(
                "payment {payment_id} is a {} payment",
                payment.channel()
            )));
        }

        match payment.status {
            PaymentStatus::Failed => {
                tracing::debug!(payment = %payment.id, "mobile money payment already failed");
                Ok(booking)
            }
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                let err = BookingError::invalid_transition(
                    booking.status,
                    BookingEvent::FailPayment,
                    "payment is already confirmed",
                );
                self.audit_rejection(booking.id, Some(actor.id), &err).await;
                Err(err)
            }
            PaymentStatus::Pending => {
                self.fail_attempt(&mut payment, &mut booking).await?;
                tracing::info!(
                    booking = %booking.id,
                    payment = %payment.id,
                    staff = %actor.id,
                    "mobile money payment rejected"
                );
                Ok(booking)
            }
        }
    }

    /// Fails every PENDING payment attempt older than the configured expiry,
    /// on either channel, so its booking can take a new attempt.
    /// System-driven; returns the payments it expired.
    pub async fn expire_stale_payments(&self) -> Result<Vec<PaymentId>> {
        let cutoff = self.clock.now() - self.config.payment_expiry;
        let stale: Vec<(PaymentId, BookingId)> = self
            .payments
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Pending && p.created_at <= cutoff)
            .map(|p| (p.id, p.booking))
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for (id, booking_id) in stale {
            let _guard = self.lock_booking(booking_id).await;
            let mut payment = self.load_payment(id).await?;
            if payment.status != PaymentStatus::Pending {
                // settled since the scan
                continue;
            }
            let mut booking = self.load_booking(booking_id).await?;
            self.fail_attempt(&mut payment, &mut booking).await?;
            tracing::info!(
                booking = %booking_id,
                payment = %id,
                channel = %payment.channel(),
                "payment attempt expired"
            );
            expired.push(id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "stale payment attempts expired");
        }
        Ok(expired)
    }

    /// Verifies and applies a raw gateway webhook delivery.
    pub async fn ingest_webhook(&self, payload: &[u8], signature: &str) -> Result<ReconcileOutcome> {
        if let Err(err) = self.verifier.verify(payload, signature, self.clock.now()) {
            tracing::warn!(error = %err, "webhook rejected");
            return Err(err);
        }
        let event: GatewayEvent = serde_json::from_slice(payload)
            .map_err(|e| BookingError::ValidationError(format!("malformed gateway event: {e}")))?;
        self.apply_gateway_event(event).await
    }

    /// Applies an already verified gateway event.
    pub async fn apply_gateway_event(&self, event: GatewayEvent) -> Result<ReconcileOutcome> {
        let Some(payment) = self.payments.find_by_reference(&event.reference).await? else {
            tracing::warn!(event = %event.id, reference = %event.reference, "event for unknown payment");
            self.record_discarded(None, &event.reference, "unknown payment reference")
                .await;
            return Err(BookingError::NotFound(format!(
                "payment reference {}",
                event.reference
            )));
        };

        let _guard = self.lock_booking(payment.booking).await;
        let payment = self
            .payments
            .find_by_reference(&event.reference)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("payment reference {}", event.reference)))?;
        let booking = self.load_booking(payment.booking).await?;

        tracing::debug!(event = %event.id, kind = ?event.kind, reference = %event.reference, "applying gateway event");
        match event.kind {
            GatewayEventKind::PaymentSucceeded => self.apply_capture(&event, payment, booking).await,
            GatewayEventKind::PaymentFailed => self.apply_failure(&event, payment, booking).await,
            GatewayEventKind::RefundSucceeded => {
                self.apply_refund_settlement(&event, payment, booking).await
            }
        }
    }

    /// Sends a refund for a cancelled booking that is still PAID.
    pub async fn issue_refund(
        &self,
        actor: UserId,
        booking_id: BookingId,
        request: RefundRequest,
    ) -> Result<Payment> {
        let actor = self.actor(actor).await?;
        AccessGuard::authorize(&actor, Operation::IssueRefund)?;

        let _guard = self.lock_booking(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        let now = self.clock.now();
        if let Err(err) = booking.clone().mark_refunded(now) {
            self.audit_rejection(booking.id, Some(actor.id), &err).await;
            return Err(err);
        }

        let mut payment = self
            .paid_payment(booking.id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("paid payment for booking {}", booking.id)))?;
        if payment.refund.as_ref().is_some_and(|r| r.is_issued()) {
            return Err(BookingError::ValidationError(format!(
                "a refund for booking {} is already awaiting settlement",
                booking.id
            )));
        }
        let amount = request.amount.unwrap_or(payment.amount);
        if amount > payment.amount {
            return Err(BookingError::ValidationError(format!(
                "refund {amount} exceeds the original payment {}",
                payment.amount
            )));
        }
        if amount != payment.amount && !self.config.allow_partial_refunds {
            return Err(BookingError::ValidationError(
                "partial refunds are disabled".to_string(),
            ));
        }

        let settled = match &payment.details {
            ChannelDetails::Card { intent_id } => {
                let receipt = with_deadline(
                    "gateway refund",
                    self.config.gateway_timeout,
                    self.gateway.refund(intent_id, amount),
                )
                .await?;
                payment.issue_refund(amount, Some(receipt.reference), now)?;
                receipt.state == RefundState::Succeeded
            }
            ChannelDetails::MobileMoney { .. } => {
                payment.issue_refund(amount, request.reference, now)?;
                true
            }
        };

        if settled {
            payment.settle_refund(now)?;
            self.save_payment(payment.clone()).await?;
            booking.mark_refunded(now)?;
            self.save_booking(booking).await?;
            tracing::info!(booking = %booking_id, payment = %payment.id, %amount, "refund settled");
        } else {
            self.save_payment(payment.clone()).await?;
            tracing::info!(booking = %booking_id, payment = %payment.id, %amount, "refund sent, awaiting settlement");
        }
        Ok(payment)
    }

    async fn load_payment(&self, id: PaymentId) -> Result<Payment> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("payment {id}")))
    }

    /// Enforces one active payment per booking and moves the booking back to
    /// awaiting payment after a failed attempt.
    async fn prepare_payment_attempt(&self, booking: &mut Booking, actor: UserId) -> Result<()> {
        if let Err(err) = booking.begin_payment_attempt(self.clock.now()) {
            self.audit_rejection(booking.id, Some(actor), &err).await;
            return Err(err);
        }
        if let Some(active) = self.active_payment(booking.id).await? {
            tracing::info!(
                booking = %booking.id,
                payment = %active.id,
                channel = %active.channel(),
                "payment attempt refused: another attempt is active"
            );
            let err = BookingError::invalid_transition(
                booking.status,
                BookingEvent::StartPayment,
                "another payment attempt is active",
            );
            self.audit_rejection(booking.id, Some(actor), &err).await;
            return Err(err);
        }
        Ok(())
    }

    /// PENDING payment -> FAILED; a booking still awaiting payment records
    /// the failure and stays PENDING for a retry.
    async fn fail_attempt(&self, payment: &mut Payment, booking: &mut Booking) -> Result<()> {
        let now = self.clock.now();
        payment.mark_failed(now);
        self.save_payment(payment.clone()).await?;
        if booking.status == BookingStatus::Pending {
            booking.record_payment_failure(now)?;
            self.save_booking(booking.clone()).await?;
        }
        Ok(())
    }

    async fn apply_capture(
        &self,
        event: &GatewayEvent,
        mut payment: Payment,
        mut booking: Booking,
    ) -> Result<ReconcileOutcome> {
        if event.amount != payment.amount {
            return Err(self.amount_mismatch(event, &payment, payment.amount).await);
        }
        let now = self.clock.now();

        match payment.status {
            PaymentStatus::Paid if booking.status == BookingStatus::Pending => {
                booking.confirm(now)?;
                self.save_booking(booking.clone()).await?;
                tracing::info!(booking = %booking.id, payment = %payment.id, "confirmation completed on redelivery");
                return Ok(ReconcileOutcome::Applied);
            }
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                tracing::debug!(event = %event.id, payment = %payment.id, "duplicate capture");
                return Ok(ReconcileOutcome::Duplicate);
            }
            PaymentStatus::Failed => {
                if let Some(active) = self.active_payment(booking.id).await? {
                    self.flag_for_review(
                        Some(booking.id),
                        &event.reference,
                        format!("capture on a superseded attempt while payment {} is active", active.id),
                    )
                    .await;
                    let err = BookingError::invalid_transition(
                        booking.status,
                        BookingEvent::ConfirmPayment,
                        "another payment attempt is active",
                    );
                    self.audit_rejection(booking.id, None, &err).await;
                    return Err(err);
                }
            }
            PaymentStatus::Pending => {}
        }

        if booking.status != BookingStatus::Pending {
            // Money was taken for a booking that can no longer be confirmed.
            payment.mark_paid(now);
            payment.request_refund(now);
            self.save_payment(payment).await?;
            booking.record_late_capture(now);
            self.save_booking(booking.clone()).await?;
            self.flag_for_review(
                Some(booking.id),
                &event.reference,
                format!("captured on a {} booking; refund required", booking.status),
            )
            .await;
            let err = BookingError::invalid_transition(
                booking.status,
                BookingEvent::ConfirmPayment,
                "status must be PENDING",
            );
            self.audit_rejection(booking.id, None, &err).await;
            return Err(err);
        }

        payment.mark_paid(now);
        self.save_payment(payment.clone()).await?;
        booking.confirm(now)?;
        self.save_booking(booking.clone()).await?;
        tracing::info!(
            booking = %booking.id,
            payment = %payment.id,
            event = %event.id,
            "card payment captured, booking confirmed"
        );
        Ok(ReconcileOutcome::Applied)
    }

    async fn apply_failure(
        &self,
        event: &GatewayEvent,
        mut payment: Payment,
        mut booking: Booking,
    ) -> Result<ReconcileOutcome> {
        match payment.status {
            PaymentStatus::Failed => Ok(ReconcileOutcome::Duplicate),
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                tracing::warn!(
                    event = %event.id,
                    payment = %payment.id,
                    status = %payment.status,
                    "failure reported after capture; discarded"
                );
                self.record_discarded(Some(booking.id), &event.reference, "failure after capture")
                    .await;
                Ok(ReconcileOutcome::Discarded)
            }
            PaymentStatus::Pending => {
                self.fail_attempt(&mut payment, &mut booking).await?;
                tracing::info!(booking = %booking.id, payment = %payment.id, "card payment failed");
                Ok(ReconcileOutcome::Applied)
            }
        }
    }

    async fn apply_refund_settlement(
        &self,
        event: &GatewayEvent,
        mut payment: Payment,
        mut booking: Booking,
    ) -> Result<ReconcileOutcome> {
        let now = self.clock.now();
        if payment.status == PaymentStatus::Refunded {
            if booking.status == BookingStatus::Cancelled
                && booking.payment_status == PaymentStatus::Paid
            {
                booking.mark_refunded(now)?;
                self.save_booking(booking).await?;
                return Ok(ReconcileOutcome::Applied);
            }
            return Ok(ReconcileOutcome::Duplicate);
        }

        let issued = payment
            .refund
            .as_ref()
            .and_then(|refund| refund.amount)
            .filter(|_| payment.status == PaymentStatus::Paid);
        let Some(refunded) = issued else {
            self.flag_for_review(
                Some(booking.id),
                &event.reference,
                "refund settled without an issued refund".to_string(),
            )
            .await;
            return Err(BookingError::invalid_transition(
                booking.status,
                BookingEvent::Refund,
                "no refund has been issued",
            ));
        };
        if event.amount != refunded {
            return Err(self.amount_mismatch(event, &payment, refunded).await);
        }

        payment.settle_refund(now)?;
        self.save_payment(payment.clone()).await?;
        match booking.mark_refunded(now) {
            Ok(()) => self.save_booking(booking.clone()).await?,
            Err(err) => {
                self.audit_rejection(booking.id, None, &err).await;
                self.flag_for_review(
                    Some(booking.id),
                    &event.reference,
                    format!("refund settled on a {} booking", booking.status),
                )
                .await;
            }
        }
        tracing::info!(booking = %booking.id, payment = %payment.id, amount = %refunded, "refund settled");
        Ok(ReconcileOutcome::Applied)
    }

    async fn amount_mismatch(
        &self,
        event: &GatewayEvent,
        payment: &Payment,
        expected: Amount,
    ) -> BookingError {
        self.flag_for_review(
            Some(payment.booking),
            &event.reference,
            format!("expected {expected}, gateway reported {}", event.amount),
        )
        .await;
        BookingError::AmountMismatch {
            reference: event.reference.clone(),
            expected,
            received: event.amount,
        }
    }
}

/// An optional `+` followed by 8 to 15 digits.
fn is_phone_number(raw: &str) -> bool {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}
