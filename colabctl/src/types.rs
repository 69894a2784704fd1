//! Common type definitions.
//!
//! Entity IDs are UUIDs wrapped in type aliases, except GPU ids which are the
//! small integer device indices the container runtime understands.
//!
//! - [`BookingId`]: calendar booking identifier
//! - [`SessionId`]: notebook session identifier
//! - [`GpuId`]: physical GPU device index
//! - [`UserId`]: opaque user identifier supplied by the caller

use uuid::Uuid;

// Type aliases for IDs
pub type BookingId = Uuid;
pub type SessionId = Uuid;
pub type GpuId = u32;
pub type UserId = String;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
