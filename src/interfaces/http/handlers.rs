use super::actor::Actor;
use super::error::ApiResult;
use super::AppState;
use crate::application::inventory::NewRoom;
use crate::application::lifecycle::NewBooking;
use crate::application::reconciliation::{
    CardPaymentIntent, MobileMoneyInstructions, ReconcileOutcome, RefundRequest,
};
use crate::application::reports::FinancialReport;
use crate::domain::booking::{Booking, BookingId};
use crate::domain::money::Amount;
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::room::{Room, RoomId};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Deserialize)]
pub struct CancelBody {
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentBody {
    pub booking_id: BookingId,
    pub instrument: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobilePaymentBody {
    pub booking_id: BookingId,
    pub phone_number: String,
    pub operator: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBody {
    pub price_per_night: Amount,
}

#[derive(Deserialize)]
pub struct ActiveBody {
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StayQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub room_id: RoomId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub available: bool,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn create_booking(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<NewBooking>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let booking = state.engine.create_booking(actor, body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> ApiResult<Json<Vec<Booking>>> {
    Ok(Json(state.engine.list_bookings(actor).await?))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<BookingId>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.engine.get_booking(actor, id).await?))
}

pub async fn booking_payments(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<BookingId>,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.engine.booking_payments(actor, id).await?))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<BookingId>,
    Json(body): Json<CancelBody>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.engine.cancel_booking(actor, id, &body.reason).await?))
}

pub async fn issue_refund(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<BookingId>,
    Json(body): Json<RefundRequest>,
) -> ApiResult<Json<Payment>> {
    Ok(Json(state.engine.issue_refund(actor, id, body).await?))
}

pub async fn start_card_payment(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<CardPaymentBody>,
) -> ApiResult<(StatusCode, Json<CardPaymentIntent>)> {
    let intent = state
        .engine
        .start_card_payment(actor, body.booking_id, &body.instrument)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

pub async fn start_mobile_payment(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<MobilePaymentBody>,
) -> ApiResult<(StatusCode, Json<MobileMoneyInstructions>)> {
    let instructions = state
        .engine
        .start_mobile_payment(actor, body.booking_id, &body.phone_number, &body.operator)
        .await?;
    Ok((StatusCode::CREATED, Json(instructions)))
}

pub async fn confirm_mobile_payment(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PaymentId>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.engine.confirm_mobile_payment(actor, id).await?))
}

pub async fn reject_mobile_payment(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<PaymentId>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.engine.reject_mobile_payment(actor, id).await?))
}

/// Gateway callback. Authenticated by its signature, not by `x-user-id`.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let outcome: ReconcileOutcome = state.engine.ingest_webhook(&body, signature).await?;
    Ok(Json(json!({ "outcome": outcome })))
}

pub async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<Vec<Room>>> {
    Ok(Json(state.engine.list_rooms().await?))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.engine.get_room(id).await?))
}

pub async fn add_room(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<NewRoom>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let room = state.engine.add_room(actor, body).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn update_room_price(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<RoomId>,
    Json(body): Json<PriceBody>,
) -> ApiResult<Json<Room>> {
    Ok(Json(
        state
            .engine
            .update_room_price(actor, id, body.price_per_night)
            .await?,
    ))
}

pub async fn set_room_active(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<RoomId>,
    Json(body): Json<ActiveBody>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.engine.set_room_active(actor, id, body.active).await?))
}

pub async fn room_availability(
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
    Query(query): Query<StayQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let available = state
        .engine
        .is_available(id, query.check_in, query.check_out, None)
        .await?;
    Ok(Json(AvailabilityResponse {
        room_id: id,
        check_in: query.check_in,
        check_out: query.check_out,
        available,
    }))
}

pub async fn financial_report(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> ApiResult<Json<FinancialReport>> {
    Ok(Json(state.engine.financial_report(actor).await?))
}

