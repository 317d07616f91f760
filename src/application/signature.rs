//! Gateway webhook signatures.
//!
//! The header has the form `t=<unix seconds>,v1=<hex>` where the hex digest
//! is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the shared secret.

use crate::error::BookingError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance: chrono::Duration,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, tolerance: chrono::Duration) -> Self {
        Self { secret, tolerance }
    }

    /// Builds a signature header for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: DateTime<Utc>) -> Result<String, BookingError> {
        let t = timestamp.timestamp();
        let mac = self.mac(t, payload)?;
        Ok(format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes())))
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let (timestamp, signatures) = parse_header(header)?;

        let age = now.timestamp() - timestamp;
        if age.abs() > self.tolerance.num_seconds() {
            return Err(BookingError::PaymentVerificationFailed(format!(
                "signature timestamp is {age}s away from now"
            )));
        }

        for candidate in signatures {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            if self.mac(timestamp, payload)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(BookingError::PaymentVerificationFailed(
            "no matching signature".to_string(),
        ))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BookingError> {
        let secret = self.secret.as_deref().ok_or_else(|| {
            BookingError::PaymentVerificationFailed("no webhook secret configured".to_string())
        })?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BookingError::PaymentVerificationFailed(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), BookingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(BookingError::PaymentVerificationFailed(
            "malformed signature header".to_string(),
        )),
    }
}
