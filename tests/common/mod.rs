#![allow(dead_code)]

use chrono::NaiveDate;
use roomledger::application::engine::BookingEngine;
use roomledger::application::lifecycle::NewBooking;
use roomledger::application::reconciliation::ReconcileOutcome;
use roomledger::config::EngineConfig;
use roomledger::domain::booking::Booking;
use roomledger::domain::money::Amount;
use roomledger::domain::payment::{GatewayEvent, GatewayEventKind};
use roomledger::domain::ports::{Clock, GatewayRef, Stores};
use roomledger::domain::room::{Room, RoomId, RoomType};
use roomledger::domain::user::{Role, User, UserId};
use roomledger::error::Result;
use roomledger::infrastructure::clock::FixedClock;
use roomledger::infrastructure::gateway::SimulatedGateway;
use roomledger::infrastructure::in_memory::in_memory_stores;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const GUEST: UserId = UserId(1);
pub const OTHER_GUEST: UserId = UserId(2);
pub const INACTIVE_GUEST: UserId = UserId(3);
pub const STAFF: UserId = UserId(10);
pub const ADMIN: UserId = UserId(20);

/// Room R: $100/night, sleeps 2.
pub const ROOM_R: RoomId = RoomId(101);
/// A $250/night suite for 4.
pub const SUITE: RoomId = RoomId(201);

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2027, 1, day).unwrap()
}

pub fn amount(value: i64) -> Amount {
    Amount::new(Decimal::from(value)).unwrap()
}

pub struct Harness {
    pub engine: Arc<BookingEngine>,
    pub clock: Arc<FixedClock>,
    pub gateway: SimulatedGateway,
    events: AtomicU64,
}

impl Harness {
    /// An engine at 2027-01-01 with the standard users and rooms loaded.
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        Self::with_gateway(config, SimulatedGateway::new()).await
    }

    pub async fn with_gateway(config: EngineConfig, gateway: SimulatedGateway) -> Self {
        let engine_gateway: GatewayRef = Arc::new(gateway.clone());
        Self::assemble(config, in_memory_stores(), gateway, engine_gateway).await
    }

    pub async fn with_stores(config: EngineConfig, stores: Stores) -> Self {
        let gateway = SimulatedGateway::new();
        let engine_gateway: GatewayRef = Arc::new(gateway.clone());
        Self::assemble(config, stores, gateway, engine_gateway).await
    }

    /// Drives the engine with a card gateway other than the simulated one.
    pub async fn with_card_gateway(config: EngineConfig, card_gateway: GatewayRef) -> Self {
        Self::assemble(config, in_memory_stores(), SimulatedGateway::new(), card_gateway).await
    }

    async fn assemble(
        mut config: EngineConfig,
        stores: Stores,
        gateway: SimulatedGateway,
        engine_gateway: GatewayRef,
    ) -> Self {
        config.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        let clock = Arc::new(FixedClock::at_start_of(date(1)));
        let engine = Arc::new(BookingEngine::new(stores, engine_gateway, clock.clone(), config));

        let mut inactive = User::new(INACTIVE_GUEST, "Inés", Role::Guest);
        inactive.active = false;
        for user in [
            User::new(GUEST, "Ada", Role::Guest),
            User::new(OTHER_GUEST, "Bo", Role::Guest),
            inactive,
            User::new(STAFF, "Sam", Role::Staff),
            User::new(ADMIN, "Alex", Role::Administrator),
        ] {
            engine.register_user(user).await.unwrap();
        }
        engine
            .import_room(Room::new(ROOM_R, RoomType::Double, amount(100), 2))
            .await
            .unwrap();
        engine
            .import_room(Room::new(SUITE, RoomType::Suite, amount(250), 4))
            .await
            .unwrap();

        Self {
            engine,
            clock,
            gateway,
            events: AtomicU64::new(0),
        }
    }

    pub async fn book(
        &self,
        actor: UserId,
        room: RoomId,
        check_in: u32,
        check_out: u32,
    ) -> Result<Booking> {
        self.engine
            .create_booking(
                actor,
                NewBooking {
                    room_id: room,
                    owner_id: None,
                    check_in: date(check_in),
                    check_out: date(check_out),
                    guests: 1,
                    special_requests: None,
                },
            )
            .await
    }

    /// Signs and delivers a gateway event the way the gateway would.
    pub async fn deliver(
        &self,
        kind: GatewayEventKind,
        reference: &str,
        amount: Amount,
    ) -> Result<ReconcileOutcome> {
        let n = self.events.fetch_add(1, Ordering::SeqCst) + 1;
        let event = GatewayEvent {
            id: format!("evt_{n}"),
            kind,
            reference: reference.to_string(),
            amount,
        };
        let payload = serde_json::to_vec(&event).unwrap();
        let signature = self
            .engine
            .verifier()
            .sign(&payload, self.clock.now())
            .unwrap();
        self.engine.ingest_webhook(&payload, &signature).await
    }

    /// Books `room` for `guest` and settles it by card.
    pub async fn confirmed_by_card(
        &self,
        guest: UserId,
        room: RoomId,
        check_in: u32,
        check_out: u32,
    ) -> (Booking, String) {
        let booking = self.book(guest, room, check_in, check_out).await.unwrap();
        let intent = self
            .engine
            .start_card_payment(guest, booking.id, "pm_card_visa")
            .await
            .unwrap();
        let outcome = self
            .deliver(GatewayEventKind::PaymentSucceeded, &intent.intent_id, intent.amount)
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        let booking = self.engine.get_booking(guest, booking.id).await.unwrap();
        (booking, intent.intent_id)
    }
}
