//! API layer for HTTP request handling and data models.
//!
//! - **[`extract`]**: Extractors that map request rejections onto API errors
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything is mounted under `/api`:
//!
//! - **Health** (`/api/health`): liveness and GPU availability
//! - **Calendar** (`/api/calendar/*`): booking, rescheduling and cancelling GPU time slots
//! - **Sessions** (`/api/sessions/*`): notebook containers, saved notebooks and logs
//!
//! The OpenAPI document is served at `/api/openapi.json` and rendered at `/api/docs`.

pub mod extract;
pub mod handlers;
pub mod models;
