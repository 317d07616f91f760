//! Application layer: the booking engine and its operations.
//!
//! [`engine::BookingEngine`] owns the injected stores, gateway and clock. The
//! sibling modules each add one group of operations to it, and every
//! operation passes through the access guard before touching state.

pub mod availability;
pub mod engine;
pub mod inventory;
pub mod lifecycle;
pub mod locks;
pub mod reconciliation;
pub mod reports;
pub mod signature;
