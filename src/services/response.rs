//! HTTP response helpers
//!
//! Every error body is `{"error": "<message>"}`. Internal failures are logged
//! here and reach the caller only as `"internal error"`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::LogbookError;

pub type HttpResponse = Response<Full<Bytes>>;

/// Message sent for any failure whose details stay server-side
pub const INTERNAL_ERROR: &str = "internal error";

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

pub fn ok<T: Serialize>(body: &T) -> HttpResponse {
    json_response(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> HttpResponse {
    json_response(StatusCode::CREATED, body)
}

pub fn no_content() -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// `{"error": message}` with the given status
pub fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found(message: &str) -> HttpResponse {
    error_body(StatusCode::NOT_FOUND, message)
}

pub fn bad_request(message: &str) -> HttpResponse {
    error_body(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized(message: &str) -> HttpResponse {
    error_body(StatusCode::UNAUTHORIZED, message)
}

pub fn method_not_allowed() -> HttpResponse {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

/// Status code for an error
pub fn status_for(error: &LogbookError) -> StatusCode {
    match error {
        LogbookError::Validation(_) => StatusCode::BAD_REQUEST,
        LogbookError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        LogbookError::Forbidden(_) | LogbookError::OwnerCannotJoin => StatusCode::FORBIDDEN,
        LogbookError::NotFound(_) => StatusCode::NOT_FOUND,
        LogbookError::Conflict(_) => StatusCode::CONFLICT,
        LogbookError::Config(_)
        | LogbookError::Io(_)
        | LogbookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a LogbookError to an HTTP response
pub fn error_response(error: LogbookError) -> HttpResponse {
    let status = status_for(&error);
    if error.is_internal() {
        error!(error = %error, "Request failed");
        return error_body(status, INTERNAL_ERROR);
    }
    error_body(status, &error.to_string())
}

/// Wrap a service result into a 200 response
pub fn from_result<T: Serialize>(result: Result<T, LogbookError>) -> HttpResponse {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into a 201 response
pub fn from_create_result<T: Serialize>(result: Result<T, LogbookError>) -> HttpResponse {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a delete result into a 204 response
pub fn from_delete_result(result: Result<(), LogbookError>) -> HttpResponse {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}
