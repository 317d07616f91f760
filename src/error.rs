use crate::domain::access::Operation;
use crate::domain::booking::{BookingEvent, BookingStatus};
use crate::domain::money::Amount;
use crate::domain::payment::PaymentId;
use crate::domain::room::RoomId;
use crate::domain::user::{Role, UserId};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Room {room} is unavailable from {check_in} to {check_out}")]
    RoomUnavailable {
        room: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("Invalid transition: cannot {event} a {from} booking ({guard})")]
    InvalidTransition {
        from: BookingStatus,
        event: BookingEvent,
        guard: &'static str,
    },
    #[error("Forbidden: {role} may not {operation}")]
    Forbidden { role: Role, operation: Operation },
    #[error("Account {0} is inactive")]
    AccountInactive(UserId),
    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),
    #[error("Amount mismatch for {reference}: expected {expected}, received {received}")]
    AmountMismatch {
        reference: String,
        expected: Amount,
        received: Amount,
    },
    #[error("Reference {reference} already belongs to payment {payment}")]
    ReferenceConflict {
        reference: String,
        payment: PaymentId,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Gateway error: {0}")]
    GatewayError(String),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
}

impl BookingError {
    pub fn invalid_transition(
        from: BookingStatus,
        event: BookingEvent,
        guard: &'static str,
    ) -> Self {
        Self::InvalidTransition { from, event, guard }
    }

    /// Errors the caller may retry without risk of double-applying anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::GatewayError(_))
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
