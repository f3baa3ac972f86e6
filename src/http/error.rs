//! Errors raised by the request/response/session layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    /// `get_session(false)` found no live session.
    #[error("session is null")]
    SessionNull,

    #[error("session {0} has been invalidated")]
    SessionInvalidated(String),

    /// The request body was already read once.
    #[error("request body stream already consumed")]
    StreamConsumed,

    /// The response output was closed (basic-auth challenge or redirect).
    #[error("response output stream is closed")]
    StreamClosed,

    /// Headers can no longer change once body output started.
    #[error("response headers already committed")]
    HeadersCommitted,

    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid session attribute: {0}")]
    InvalidAttribute(String),

    #[error("multipart error: {0}")]
    Multipart(String),

    #[error("body read error: {0}")]
    Body(String),

    /// Failure raised by application code inside `handle`.
    #[error("handler error: {0}")]
    Upstream(String),
}

impl From<axum::extract::multipart::MultipartError> for HttpError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        HttpError::Multipart(err.body_text())
    }
}

impl From<axum::extract::multipart::MultipartRejection> for HttpError {
    fn from(err: axum::extract::multipart::MultipartRejection) -> Self {
        HttpError::Multipart(err.body_text())
    }
}

impl From<axum::Error> for HttpError {
    fn from(err: axum::Error) -> Self {
        HttpError::Body(err.to_string())
    }
}
