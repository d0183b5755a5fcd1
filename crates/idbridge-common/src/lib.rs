//! idbridge Common - Shared types and utilities
//!
//! This crate provides the principal model (identities and roles with their
//! derived lifecycle state), charset handling and the clock abstraction
//! used across all idbridge components.

pub mod charset;
pub mod clock;
pub mod error;
pub mod types;

pub use charset::Charset;
pub use clock::{Clock, FixedClock, SystemClock, date_from_days, days_since_epoch};
pub use error::CharsetError;
pub use types::*;
