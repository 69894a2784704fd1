//! API request/response models for calendar bookings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::bookings::{Booking, BookingStatus};
use crate::types::BookingId;

/// Request body for booking a GPU time slot.
///
/// Timestamps are accepted as strings and parsed server-side so that malformed
/// values produce a 400 with a message naming the field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreate {
    /// Caller-supplied user identifier
    #[schema(example = "user-42")]
    pub user_id: String,
    /// Inclusive start of the slot, ISO 8601
    #[schema(example = "2030-06-01T09:00:00Z")]
    pub start_time: String,
    /// Exclusive end of the slot, ISO 8601
    #[schema(example = "2030-06-01T10:00:00Z")]
    pub end_time: String,
    /// Number of GPUs to reserve
    #[schema(example = 1)]
    pub gpu_count: i64,
}

/// Request body for moving an existing booking.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingReschedule {
    #[schema(example = "2030-06-01T11:00:00Z")]
    pub start_time: String,
    #[schema(example = "2030-06-01T12:00:00Z")]
    pub end_time: String,
}

/// Query parameters for the calendar slot view
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase")]
pub struct SlotsQuery {
    /// Earliest booking start to include, ISO 8601
    pub start_date: String,
    /// Latest booking start to include, ISO 8601
    pub end_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatusResponse {
    Pending,
    Cancelled,
}

impl From<BookingStatus> for BookingStatusResponse {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending => Self::Pending,
            BookingStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// A booking as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookingId,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub gpu_count: u32,
    pub status: BookingStatusResponse,
    pub created_at: DateTime<Utc>,
    /// Set when the booking was last rescheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            start_time: booking.start_time,
            end_time: booking.end_time,
            gpu_count: booking.gpu_count,
            status: booking.status.into(),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
            cancelled_at: booking.cancelled_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingEnvelope {
    pub booking: BookingResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingList {
    pub bookings: Vec<BookingResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingCancelled {
    #[schema(example = "Booking cancelled")]
    pub message: String,
    pub booking: BookingResponse,
}

/// Body returned with 409 when a slot is already taken.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConflictResponse {
    #[schema(example = "Time slot conflict")]
    pub error: String,
    /// Every live booking intersecting the requested window
    pub conflicts: Vec<BookingResponse>,
}
