//! Request extractors that report failures through [`crate::errors::Error`].

use axum::extract::FromRequest;

use crate::errors::Error;

/// JSON request body. Rejections become a 400 with the usual `{error}` body
/// instead of axum's plain-text 415/422 responses.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);
