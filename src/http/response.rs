//! Outbound response builder.
//!
//! # Responsibilities
//! - Collect status, headers, cookies and body for one request
//! - Enforce headers-before-body ordering
//! - Provide the fused redirect and basic-auth challenge operations
//!
//! # Design Decisions
//! - Output is buffered and turned into an axum `Response` after `handle()`
//! - The first body write commits headers; later header changes fail
//! - `redirect` and `set_basic_auth` close the output; later writes fail

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::DateTime;

use crate::http::cookie::Cookie;
use crate::http::HttpError;

/// A buffered outbound HTTP response.
#[derive(Debug)]
pub struct HttpServerResponse {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: Vec<u8>,
    committed: bool,
    closed: bool,
}

impl Default for HttpServerResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServerResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            committed: false,
            closed: false,
        }
    }

    /// Append text to the body.
    pub fn print(&mut self, text: impl AsRef<str>) -> Result<&mut Self, HttpError> {
        self.write(text.as_ref().as_bytes())
    }

    /// Append text and a line break to the body.
    pub fn println(&mut self, text: impl AsRef<str>) -> Result<&mut Self, HttpError> {
        self.print(text)?;
        self.write(b"\n")
    }

    /// Append raw bytes to the body.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self, HttpError> {
        if self.closed {
            return Err(HttpError::StreamClosed);
        }
        self.committed = true;
        self.body.extend_from_slice(data.as_ref());
        Ok(self)
    }

    /// Add a `Set-Cookie`. The cookie name must be non-blank.
    pub fn set_cookie(&mut self, cookie: Cookie) -> Result<&mut Self, HttpError> {
        self.ensure_uncommitted()?;
        cookie.validate()?;
        self.cookies.push(cookie);
        Ok(self)
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, HttpError> {
        self.ensure_uncommitted()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HttpError::InvalidHeader(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| HttpError::InvalidHeader(format!("invalid value for header '{name}'")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set a header to an RFC 1123 date given in milliseconds since epoch.
    pub fn set_date_header(&mut self, name: &str, epoch_millis: i64) -> Result<&mut Self, HttpError> {
        let date = DateTime::from_timestamp_millis(epoch_millis)
            .ok_or_else(|| HttpError::InvalidHeader(format!("date {epoch_millis} out of range")))?;
        self.set_header(name, &date.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }

    pub fn set_int_header(&mut self, name: &str, value: i64) -> Result<&mut Self, HttpError> {
        self.set_header(name, &value.to_string())
    }

    pub fn set_status(&mut self, status: u16) -> Result<&mut Self, HttpError> {
        self.ensure_uncommitted()?;
        self.status = StatusCode::from_u16(status).map_err(|_| HttpError::InvalidStatus(status))?;
        Ok(self)
    }

    /// Send a `302 Found` to `location` and close the output.
    pub fn redirect(&mut self, location: &str) -> Result<&mut Self, HttpError> {
        self.set_status(302)?;
        self.set_header("location", location)?;
        self.close();
        Ok(self)
    }

    /// Send a `401` basic-auth challenge for `realm` and close the output.
    pub fn set_basic_auth(&mut self, realm: &str) -> Result<&mut Self, HttpError> {
        self.set_status(401)?;
        self.set_header("www-authenticate", &format!("Basic realm=\"{realm}\""))?;
        self.close();
        Ok(self)
    }

    /// Close the output. Headers and body are final afterwards.
    pub fn close(&mut self) {
        self.committed = true;
        self.closed = true;
    }

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Cookie added by the server itself, bypassing the commit check.
    pub(crate) fn push_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    fn ensure_uncommitted(&self) -> Result<(), HttpError> {
        if self.committed {
            Err(HttpError::HeadersCommitted)
        } else {
            Ok(())
        }
    }
}

impl IntoResponse for HttpServerResponse {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        if !self.body.is_empty() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
        }
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => tracing::warn!(cookie = %cookie.name, "Dropping unencodable cookie"),
            }
        }

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
