//! Calendar bookings of GPU time slots.
//!
//! A booking reserves a number of GPUs for a half-open time window
//! `[start, end)`. Live (non-cancelled) bookings never overlap; the
//! [`BookingRegistry`] enforces this on every insert and reschedule.
//!
//! Bookings reserve GPU *counts*, not specific devices. They are not consulted
//! when a notebook session grabs a physical GPU from the
//! [`GpuPool`](crate::gpu::GpuPool).

use chrono::{DateTime, Utc};

use crate::types::{BookingId, UserId};

pub mod registry;

pub use registry::BookingRegistry;

/// Result type for booking operations
pub type Result<T> = std::result::Result<T, BookingError>;

/// Errors raised by the booking registry
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Malformed input: bad timestamps, inverted window, GPU count out of range
    #[error("{0}")]
    Validation(String),

    /// The requested window intersects one or more live bookings
    #[error("Time slot conflicts with {} existing booking(s)", .0.len())]
    Conflict(Vec<Booking>),

    #[error("Booking with ID {0} not found")]
    NotFound(BookingId),
}

/// Booking lifecycle status. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Cancelled,
}

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting empty and inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(BookingError::Validation(format!(
                "endTime ({}) must be after startTime ({})",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two RFC 3339 timestamps as sent by clients.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_instant("startTime", start)?;
        let end = parse_instant("endTime", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Strict half-open intersection. Windows that only touch at an endpoint
    /// do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Parse a single RFC 3339 instant, naming the offending field on failure.
pub fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BookingError::Validation(format!("{field} must be an ISO 8601 timestamp ({e})")))
}

/// A reserved time window plus GPU count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub gpu_count: u32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Live bookings take part in conflict checks and user listings.
    pub fn is_live(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}
