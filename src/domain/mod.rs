pub mod access;
pub mod audit;
pub mod availability;
pub mod booking;
pub mod money;
pub mod payment;
pub mod ports;
pub mod room;
pub mod stay;
pub mod user;
