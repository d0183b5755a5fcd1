//! idbridge Unix - Account store over passwd, shadow and group files
//!
//! This crate provides:
//! - [`UnixAccountStore`] for identity and role lookup and administration
//! - Password and account lifecycle derivation from shadow aging fields
//! - Optional last-login enrichment through a [`LastLoginSource`]
//!
//! Password hashes are produced and verified through an
//! [`idbridge_crypt::EncoderRegistry`] handed in by the caller.

pub mod config;
pub mod error;
pub mod lastlog;
pub mod schema;
pub mod status;
pub mod store;

pub use config::UnixStoreConfig;
pub use error::{Result, StoreError};
pub use lastlog::{CommandLastLogin, LastLoginError, LastLoginSource, LastLogins, parse_lastlog};
pub use status::{ShadowAging, account_status, password_status};
pub use store::{IdentityUpdate, NewIdentity, PasswordResetType, RoleUpdate, UnixAccountStore};
