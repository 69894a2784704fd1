//! API request and response data models.
//!
//! API models are distinct from the in-memory domain types in [`crate::bookings`]
//! and [`crate::sessions`]; each response type has a `From` impl for its domain
//! counterpart. Field names are camelCase on the wire.
//!
//! - [`bookings`]: calendar booking requests, responses and the conflict body
//! - [`sessions`]: notebook session, stats and notebook snapshot payloads
//! - [`health`]: service health report

pub mod bookings;
pub mod health;
pub mod sessions;
