//! HTTP request handlers for all API endpoints.
//!
//! Handlers are thin: they parse the request, call into the booking registry or
//! session manager held in [`crate::AppState`], and map the result onto an API
//! model. Errors convert into [`crate::errors::Error`], which renders the JSON
//! `{error}` body and status code.
//!
//! - [`calendar`]: GPU time-slot bookings
//! - [`sessions`]: notebook session lifecycle, notebooks and logs
//! - [`health`]: liveness and GPU availability

pub mod calendar;
pub mod health;
pub mod sessions;
