use super::command_reader::Command;
use crate::application::engine::BookingEngine;
use crate::application::lifecycle::NewBooking;
use crate::application::reconciliation::{ReconcileOutcome, RefundRequest};
use crate::domain::booking::{Booking, BookingId};
use crate::domain::money::Amount;
use crate::domain::payment::{GatewayEvent, GatewayEventKind, PaymentId};
use crate::domain::ports::Clock;
use crate::error::{BookingError, Result};
use crate::infrastructure::clock::FixedClock;
use std::collections::HashMap;
use std::sync::Arc;

/// Secret used to sign simulated gateway events when none is configured.
pub const LOCAL_WEBHOOK_SECRET: &str = "whsec_replay_local";

/// Drives a command script through the engine.
///
/// Card outcomes in the script are turned into signed webhook deliveries and
/// pushed through the same verification path as real gateway calls.
pub struct ReplayDriver {
    engine: Arc<BookingEngine>,
    clock: Arc<FixedClock>,
    labels: Vec<(String, BookingId)>,
    by_label: HashMap<String, BookingId>,
    card_intents: HashMap<BookingId, (String, Amount)>,
    mobile_payments: HashMap<BookingId, PaymentId>,
    refunds: HashMap<BookingId, Amount>,
    events: u64,
}

impl ReplayDriver {
    pub fn new(engine: Arc<BookingEngine>, clock: Arc<FixedClock>) -> Self {
        Self {
            engine,
            clock,
            labels: Vec::new(),
            by_label: HashMap::new(),
            card_intents: HashMap::new(),
            mobile_payments: HashMap::new(),
            refunds: HashMap::new(),
            events: 0,
        }
    }

    pub async fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Book {
                actor,
                label,
                room,
                owner,
                check_in,
                check_out,
                guests,
                special_requests,
            } => {
                if self.by_label.contains_key(&label) {
                    return Err(BookingError::ValidationError(format!(
                        "booking label '{label}' is already used"
                    )));
                }
                let booking = self
                    .engine
                    .create_booking(
                        actor,
                        NewBooking {
                            room_id: room,
                            owner_id: owner,
                            check_in,
                            check_out,
                            guests,
                            special_requests,
                        },
                    )
                    .await?;
                self.by_label.insert(label.clone(), booking.id);
                self.labels.push((label, booking.id));
            }
            Command::PayCard {
                actor,
                label,
                instrument,
            } => {
                let id = self.booking_id(&label)?;
                let intent = self.engine.start_card_payment(actor, id, &instrument).await?;
                self.card_intents.insert(id, (intent.intent_id, intent.amount));
            }
            Command::CardSucceeded { label, amount } => {
                let (reference, charged) = self.card_intent(&label)?;
                self.deliver(GatewayEventKind::PaymentSucceeded, reference, amount.unwrap_or(charged))
                    .await?;
            }
            Command::CardFailed { label } => {
                let (reference, charged) = self.card_intent(&label)?;
                self.deliver(GatewayEventKind::PaymentFailed, reference, charged)
                    .await?;
            }
            Command::RefundSucceeded { label, amount } => {
                let id = self.booking_id(&label)?;
                let (reference, _) = self.card_intent(&label)?;
                let refunded = self.refunds.get(&id).copied().ok_or_else(|| {
                    BookingError::ValidationError(format!("no refund was issued for '{label}'"))
                })?;
                self.deliver(GatewayEventKind::RefundSucceeded, reference, amount.unwrap_or(refunded))
                    .await?;
            }
            Command::PayMobile {
                actor,
                label,
                phone_number,
                operator,
            } => {
                let id = self.booking_id(&label)?;
                let instructions = self
                    .engine
                    .start_mobile_payment(actor, id, &phone_number, &operator)
                    .await?;
                self.mobile_payments.insert(id, instructions.payment_id);
            }
            Command::ConfirmMobile { actor, label } => {
                let payment = self.mobile_payment(&label)?;
                self.engine.confirm_mobile_payment(actor, payment).await?;
            }
            Command::RejectMobile { actor, label } => {
                let payment = self.mobile_payment(&label)?;
                self.engine.reject_mobile_payment(actor, payment).await?;
            }
            Command::Cancel {
                actor,
                label,
                reason,
            } => {
                let id = self.booking_id(&label)?;
                self.engine.cancel_booking(actor, id, &reason).await?;
            }
            Command::Refund {
                actor,
                label,
                amount,
                reference,
            } => {
                let id = self.booking_id(&label)?;
                let payment = self
                    .engine
                    .issue_refund(actor, id, RefundRequest { amount, reference })
                    .await?;
                if let Some(refunded) = payment.refund.and_then(|r| r.amount) {
                    self.refunds.insert(id, refunded);
                }
            }
            Command::SetPrice { actor, room, price } => {
                self.engine.update_room_price(actor, room, price).await?;
            }
            Command::Clock { today } => {
                self.clock.set(today.and_time(chrono::NaiveTime::MIN).and_utc());
            }
            Command::Complete => {
                self.engine.complete_elapsed_stays().await?;
            }
            Command::Expire => {
                self.engine.expire_stale_payments().await?;
            }
        }
        Ok(())
    }

    /// Every labelled booking in script order, as currently stored.
    pub async fn bookings(&self) -> Result<Vec<(String, Booking)>> {
        let mut bookings = Vec::with_capacity(self.labels.len());
        for (label, id) in &self.labels {
            bookings.push((label.clone(), self.engine.load_booking(*id).await?));
        }
        Ok(bookings)
    }

    async fn deliver(
        &mut self,
        kind: GatewayEventKind,
        reference: String,
        amount: Amount,
    ) -> Result<ReconcileOutcome> {
        self.events += 1;
        let event = GatewayEvent {
            id: format!("evt_{:06}", self.events),
            kind,
            reference,
            amount,
        };
        let payload = serde_json::to_vec(&event)?;
        let signature = self.engine.verifier().sign(&payload, self.clock.now())?;
        self.engine.ingest_webhook(&payload, &signature).await
    }

    fn booking_id(&self, label: &str) -> Result<BookingId> {
        self.by_label
            .get(label)
            .copied()
            .ok_or_else(|| BookingError::NotFound(format!("booking '{label}'")))
    }

    fn mobile_payment(&self, label: &str) -> Result<PaymentId> {
        let id = self.booking_id(label)?;
        self.mobile_payments.get(&id).copied().ok_or_else(|| {
            BookingError::ValidationError(format!("no mobile money payment for '{label}'"))
        })
    }

    fn card_intent(&self, label: &str) -> Result<(String, Amount)> {
        let id = self.booking_id(label)?;
        self.card_intents
            .get(&id)
            .cloned()
            .ok_or_else(|| BookingError::ValidationError(format!("no card payment for '{label}'")))
    }
}
