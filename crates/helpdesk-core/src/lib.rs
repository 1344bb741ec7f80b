//! # helpdesk-core
//!
//! Shared vocabulary for the help-desk client crates:
//!
//! - **IDs**: [`NotificationId`], a UUID v7 newtype generated locally
//! - **Identity**: [`User`] and [`Role`] as returned by `/auth/me`
//! - **Errors**: [`HelpdeskError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod user;

pub use errors::HelpdeskError;
pub use ids::NotificationId;
pub use user::{Role, User};
