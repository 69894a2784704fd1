//! OpenAPI documentation for the `/api` surface.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "colabctl API",
        description = "GPU time-slot booking and notebook session control."
    ),
    servers(
        (url = "/api", description = "colabctl API server")
    ),
    paths(
        api::handlers::health::health,
        api::handlers::calendar::list_slots,
        api::handlers::calendar::create_booking,
        api::handlers::calendar::reschedule_booking,
        api::handlers::calendar::cancel_booking,
        api::handlers::calendar::list_user_bookings,
        api::handlers::sessions::create_session,
        api::handlers::sessions::get_session,
        api::handlers::sessions::terminate_session,
        api::handlers::sessions::save_notebook,
        api::handlers::sessions::get_notebook,
        api::handlers::sessions::get_session_logs,
        api::handlers::sessions::list_user_sessions,
    ),
    components(
        schemas(
            api::models::health::HealthResponse,
            api::models::health::GpuAvailability,
            api::models::bookings::BookingCreate,
            api::models::bookings::BookingReschedule,
            api::models::bookings::BookingResponse,
            api::models::bookings::BookingStatusResponse,
            api::models::bookings::BookingEnvelope,
            api::models::bookings::BookingList,
            api::models::bookings::BookingCancelled,
            api::models::bookings::ConflictResponse,
            api::models::sessions::SessionCreate,
            api::models::sessions::SessionResponse,
            api::models::sessions::SessionStatusResponse,
            api::models::sessions::ContainerStatsResponse,
            api::models::sessions::SessionEnvelope,
            api::models::sessions::SessionList,
            api::models::sessions::SessionTerminated,
            api::models::sessions::SessionLogs,
            api::models::sessions::NotebookSave,
            api::models::sessions::NotebookSaved,
            api::models::sessions::NotebookResponse,
            api::models::sessions::NotebookEnvelope,
        )
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "calendar", description = "GPU time-slot bookings"),
        (name = "sessions", description = "Notebook sessions and containers"),
    )
)]
pub struct ApiDoc;
