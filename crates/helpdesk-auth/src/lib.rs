//! # helpdesk-auth
//!
//! Session lifecycle for the help-desk client.
//!
//! - [`SessionStore`]: holds the `(token, user)` pair as one atomic value and
//!   lets other components watch it change (login, refresh, logout)
//! - [`ApiClient`]: the REST calls that issue and validate sessions
//!   (`/auth/login`, `/auth/me`, `/auth/refresh`)

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod session;

pub use client::ApiClient;
pub use errors::AuthError;
pub use session::{Session, SessionStore};
