//! HTTP API over the booking engine.
//!
//! Caller identity arrives in the `x-user-id` header; authenticating it is
//! left to whatever sits in front of this service. The gateway webhook is the
//! one route that needs no identity, since its signature is checked instead.

pub mod actor;
pub mod error;
pub mod handlers;

use crate::application::engine::BookingEngine;
use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
}

impl AppState {
    pub fn new(engine: Arc<BookingEngine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/bookings",
            post(handlers::create_booking).get(handlers::list_bookings),
        )
        .route("/bookings/:id", get(handlers::get_booking))
        .route("/bookings/:id/payments", get(handlers::booking_payments))
        .route("/bookings/:id/cancel", put(handlers::cancel_booking))
        .route("/bookings/:id/refund", post(handlers::issue_refund))
        .route("/payments/card", post(handlers::start_card_payment))
        .route("/payments/mobile", post(handlers::start_mobile_payment))
        .route(
            "/payments/mobile/:id/confirm",
            put(handlers::confirm_mobile_payment),
        )
        .route(
            "/payments/mobile/:id/reject",
            put(handlers::reject_mobile_payment),
        )
        .route("/payments/webhook", post(handlers::gateway_webhook))
        .route("/rooms", get(handlers::list_rooms).post(handlers::add_room))
        .route("/rooms/:id", get(handlers::get_room))
        .route("/rooms/:id/price", put(handlers::update_room_price))
        .route("/rooms/:id/active", put(handlers::set_room_active))
        .route("/rooms/:id/availability", get(handlers::room_availability))
        .route("/reports/financial", get(handlers::financial_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
