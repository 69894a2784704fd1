use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::AppState;
use crate::api::extract::JsonBody;
use crate::api::models::bookings::{
    BookingCancelled, BookingCreate, BookingEnvelope, BookingList, BookingReschedule, ConflictResponse, SlotsQuery,
};
use crate::bookings::{TimeWindow, parse_instant};
use crate::errors::{Error, Result};
use crate::types::BookingId;

#[utoipa::path(
    get,
    path = "/calendar/slots",
    tag = "calendar",
    summary = "List booked slots",
    description = "Live bookings whose start lies within the given range, inclusive at both ends.",
    params(SlotsQuery),
    responses(
        (status = 200, description = "Bookings in range", body = BookingList),
        (status = 400, description = "Malformed or inverted date range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_slots(State(state): State<AppState>, Query(query): Query<SlotsQuery>) -> Result<Json<BookingList>> {
    let from = parse_instant("startDate", &query.start_date)?;
    let to = parse_instant("endDate", &query.end_date)?;
    if to < from {
        return Err(Error::BadRequest {
            message: "endDate must not be before startDate".to_string(),
        });
    }

    let bookings = state.bookings.list_in_range(from, to).await;
    Ok(Json(BookingList {
        bookings: bookings.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/calendar/book",
    tag = "calendar",
    summary = "Book a GPU time slot",
    request_body = BookingCreate,
    responses(
        (status = 201, description = "Booking created", body = BookingEnvelope),
        (status = 400, description = "Invalid timestamps or GPU count"),
        (status = 409, description = "Slot intersects existing bookings", body = ConflictResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_booking(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<BookingCreate>,
) -> Result<(StatusCode, Json<BookingEnvelope>)> {
    let window = TimeWindow::parse(&request.start_time, &request.end_time)?;
    let booking = state.bookings.create(&request.user_id, window, request.gpu_count).await?;

    Ok((StatusCode::CREATED, Json(BookingEnvelope { booking: booking.into() })))
}

#[utoipa::path(
    put,
    path = "/calendar/reschedule/{id}",
    tag = "calendar",
    summary = "Move a booking",
    request_body = BookingReschedule,
    params(("id" = String, Path, description = "Booking ID", format = "uuid")),
    responses(
        (status = 200, description = "Booking moved", body = BookingEnvelope),
        (status = 400, description = "Invalid timestamps or booking cancelled"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "New slot intersects other bookings", body = ConflictResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reschedule_booking(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    JsonBody(request): JsonBody<BookingReschedule>,
) -> Result<Json<BookingEnvelope>> {
    let window = TimeWindow::parse(&request.start_time, &request.end_time)?;
    let booking = state.bookings.reschedule(id, window).await?;

    Ok(Json(BookingEnvelope { booking: booking.into() }))
}

#[utoipa::path(
    delete,
    path = "/calendar/cancel/{id}",
    tag = "calendar",
    summary = "Cancel a booking",
    params(("id" = String, Path, description = "Booking ID", format = "uuid")),
    responses(
        (status = 200, description = "Booking cancelled", body = BookingCancelled),
        (status = 404, description = "Booking not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn cancel_booking(State(state): State<AppState>, Path(id): Path<BookingId>) -> Result<Json<BookingCancelled>> {
    let booking = state.bookings.cancel(id).await?;

    Ok(Json(BookingCancelled {
        message: "Booking cancelled".to_string(),
        booking: booking.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/calendar/user/{user_id}",
    tag = "calendar",
    summary = "List a user's bookings",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Live bookings of the user, oldest first", body = BookingList),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_user_bookings(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<BookingList> {
    let bookings = state.bookings.list_by_user(&user_id).await;
    Json(BookingList {
        bookings: bookings.into_iter().map(Into::into).collect(),
    })
}
