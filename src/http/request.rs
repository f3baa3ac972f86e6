//! Inbound request projection.
//!
//! # Responsibilities
//! - Populate every request field in one pass before `handle()` runs
//! - Parse query params, cookies, locales and multipart parts
//! - Fold urlencoded form fields into the query params
//! - Decode basic-auth credentials
//! - Hand out the body lazily, at most once
//! - Resolve or create the caller's session
//!
//! # Design Decisions
//! - Header names are lowercased; repeated headers keep the last value
//! - Multipart bodies are buffered fully, gated on `multipart/form-data`
//! - Urlencoded form bodies are consumed by `init`; their fields follow
//!   the URI's fields in `query_params`
//! - Missing credentials are `None`; a missing session is `SessionNull`

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, request::Parts, Method, Request};
use base64::Engine;

use crate::http::cookie::{parse_cookie_headers, Cookie};
use crate::http::params::{merge_form, parse_query, ParamValue};
use crate::http::part::HttpPart;
use crate::http::session::{HttpSession, SessionStore};
use crate::http::HttpError;

/// Authenticated user name placed in request extensions by an outer auth layer.
#[derive(Debug, Clone)]
pub struct RemoteUser(pub String);

/// Connection facts the listener knows about a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub secure: bool,
    pub sessions: SessionStore,
    pub session_cookie: String,
    pub default_locale: String,
    pub max_body_bytes: usize,
}

/// Credentials from an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user_name: String,
    pub password: String,
}

/// An inbound HTTP request, populated once by [`HttpServerRequest::init`].
#[derive(Debug)]
pub struct HttpServerRequest {
    method: Method,
    query_string: String,
    headers: HashMap<String, String>,
    query_params: HashMap<String, ParamValue>,
    remote_user: Option<String>,
    request: String,
    request_uri: String,
    content_type: Option<String>,
    content_length: Option<u64>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    server_name: String,
    server_port: u16,
    protocol: String,
    scheme: &'static str,
    secure: bool,
    locales: Vec<String>,
    cookies: Vec<Cookie>,
    multipart: bool,
    parts: HashMap<String, Vec<HttpPart>>,
    body: Option<Body>,
    max_body_bytes: usize,
    sessions: SessionStore,
    session_cookie: String,
    created_session: Option<HttpSession>,
}

impl HttpServerRequest {
    /// Populate a request from the wire request and its routing `path`.
    ///
    /// For `multipart/form-data` requests the body is consumed here and
    /// its parts become available through [`parts`](Self::parts). For
    /// `application/x-www-form-urlencoded` requests the body is consumed
    /// too and its fields join [`query_params`](Self::query_params).
    pub async fn init(request: Request<Body>, path: &str, ctx: RequestContext) -> Result<Self, HttpError> {
        let (parts, body) = request.into_parts();

        let method = parts.method.clone();
        let query_string = parts.uri.query().unwrap_or_default().to_string();

        let mut headers = HashMap::new();
        for (name, value) in parts.headers.iter() {
            headers.insert(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let mut query_params = parse_query(&query_string);
        let remote_user = parts.extensions.get::<RemoteUser>().map(|u| u.0.clone());
        let request_uri = parts.uri.path().to_string();

        let content_type = headers.get("content-type").cloned();
        let content_length = headers.get("content-length").and_then(|v| v.trim().parse().ok());

        let (server_name, server_port) = server_endpoint(&parts, ctx.local_addr);
        let protocol = format!("{:?}", parts.version);
        let scheme = if ctx.secure { "https" } else { "http" };

        let locales = parse_locales(headers.get("accept-language").map(String::as_str), &ctx.default_locale);
        let cookies = parse_cookie_headers(&parts.headers);

        let multipart = content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"));

        let form = content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"));

        let (parts_map, body) = if multipart {
            let parsed = read_multipart(Request::from_parts(parts, body)).await?;
            (parsed, None)
        } else if form {
            let fields = axum::body::to_bytes(body, ctx.max_body_bytes).await?;
            merge_form(&mut query_params, &fields);
            (HashMap::new(), None)
        } else {
            (HashMap::new(), Some(body))
        };

        tracing::trace!(
            method = %method,
            path = %path,
            multipart,
            form,
            cookies = cookies.len(),
            "Request initialized"
        );

        Ok(Self {
            method,
            query_string,
            headers,
            query_params,
            remote_user,
            request: path.to_string(),
            request_uri,
            content_type,
            content_length,
            local_addr: ctx.local_addr,
            remote_addr: ctx.remote_addr,
            server_name,
            server_port,
            protocol,
            scheme,
            secure: ctx.secure,
            locales,
            cookies,
            multipart,
            parts: parts_map,
            body,
            max_body_bytes: ctx.max_body_bytes,
            sessions: ctx.sessions,
            session_cookie: ctx.session_cookie,
            created_session: None,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// All headers, keyed by lowercased name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_params(&self) -> &HashMap<String, ParamValue> {
        &self.query_params
    }

    pub fn query_param(&self, name: &str) -> Option<&ParamValue> {
        self.query_params.get(name)
    }

    pub fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    /// Target path the request was dispatched under.
    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_name(&self) -> String {
        self.local_addr.ip().to_string()
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn remote_host(&self) -> String {
        self.remote_addr.ip().to_string()
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_addr.port()
    }

    /// Host the client addressed, from `Host` or the local address.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Protocol version, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn scheme(&self) -> &str {
        self.scheme
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Preferred locales, most preferred first.
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    /// Multipart parts grouped by field name, in arrival order.
    pub fn parts(&self) -> &HashMap<String, Vec<HttpPart>> {
        &self.parts
    }

    /// Read the body as UTF-8 text. The body can be read once.
    pub async fn get_content(&mut self) -> Result<String, HttpError> {
        let bytes = self.get_content_binary().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| HttpError::Body(e.to_string()))
    }

    /// Read the raw body. The body can be read once.
    pub async fn get_content_binary(&mut self) -> Result<Bytes, HttpError> {
        let body = self.body.take().ok_or(HttpError::StreamConsumed)?;
        axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(HttpError::from)
    }

    /// Decode `Authorization: <scheme> <base64(user:pass)>`.
    ///
    /// Returns `None` unless the header has exactly two space-separated
    /// tokens and the decoded credential has exactly two `:`-separated parts.
    pub fn get_basic_auth(&self) -> Option<BasicAuth> {
        let header = self.header("authorization")?;
        let tokens: Vec<&str> = header.split(' ').collect();
        if tokens.len() != 2 {
            return None;
        }
        let decoded = base64::engine::general_purpose::STANDARD.decode(tokens[1]).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let creds: Vec<&str> = decoded.split(':').collect();
        if creds.len() != 2 {
            return None;
        }
        Some(BasicAuth {
            user_name: creds[0].to_string(),
            password: creds[1].to_string(),
        })
    }

    /// Resolve the caller's session, creating one when `create_new` is set.
    ///
    /// Fails with [`HttpError::SessionNull`] when no session exists and
    /// `create_new` is false.
    pub fn get_session(&mut self, create_new: bool) -> Result<HttpSession, HttpError> {
        if let Some(session) = self.find_session() {
            return Ok(session);
        }
        if !create_new {
            return Err(HttpError::SessionNull);
        }
        let session = self.sessions.create();
        self.created_session = Some(session.clone());
        Ok(session)
    }

    /// The caller's live session, if any.
    pub fn find_session(&self) -> Option<HttpSession> {
        if let Some(session) = self.created_session.as_ref().filter(|s| s.is_valid()) {
            return Some(session.clone());
        }
        self.cookies
            .iter()
            .filter(|c| c.name == self.session_cookie)
            .find_map(|c| self.sessions.access(&c.value))
    }

    /// Session created while handling this request; its cookie must be set.
    pub(crate) fn created_session(&self) -> Option<&HttpSession> {
        self.created_session.as_ref().filter(|s| s.is_valid())
    }

    pub(crate) fn session_cookie_name(&self) -> &str {
        &self.session_cookie
    }
}

fn server_endpoint(parts: &Parts, local: SocketAddr) -> (String, u16) {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()));

    match host.and_then(|h| h.parse::<axum::http::uri::Authority>().ok()) {
        Some(authority) => (
            authority.host().to_string(),
            authority.port_u16().unwrap_or(local.port()),
        ),
        None => (local.ip().to_string(), local.port()),
    }
}

/// Order `Accept-Language` tags by quality, highest first.
fn parse_locales(header: Option<&str>, default_locale: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = header
        .unwrap_or_default()
        .split(',')
        .filter_map(|entry| {
            let mut pieces = entry.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let q = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q > 0.0).then(|| (tag.to_string(), q))
        })
        .collect();

    // Stable sort keeps header order for equal weights.
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));

    if weighted.is_empty() {
        return vec![default_locale.to_string()];
    }
    weighted.into_iter().map(|(tag, _)| tag).collect()
}

async fn read_multipart(request: Request<Body>) -> Result<HashMap<String, Vec<HttpPart>>, HttpError> {
    let mut multipart = Multipart::from_request(request, &()).await?;
    let mut parts: HashMap<String, Vec<HttpPart>> = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().unwrap_or("text/plain").to_string();
        let headers = field
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let data = field.bytes().await?;

        parts.entry(name.clone()).or_default().push(HttpPart {
            content_type,
            headers,
            name,
            file_name,
            size: data.len(),
            data,
        });
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext {
            local_addr: "127.0.0.1:8080".parse().unwrap(),
            remote_addr: "10.0.0.7:50123".parse().unwrap(),
            secure: false,
            sessions: SessionStore::new(1800),
            session_cookie: "SESSIONID".to_string(),
            default_locale: "en-US".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }

    async fn init(request: Request<Body>) -> HttpServerRequest {
        let path = request.uri().path().to_string();
        HttpServerRequest::init(request, &path, ctx()).await.unwrap()
    }

    fn multipart_body(boundary: &str, fields: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.txt\"\r\nContent-Type: text/plain\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        body
    }

    #[tokio::test]
    async fn populates_basic_fields() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/items?a=1&a=2&b=3")
            .header("Host", "example.com:9000")
            .header("X-Trace", "first")
            .header("X-Trace", "second")
            .header("Content-Type", "text/plain")
            .header("Content-Length", "5")
            .header("Cookie", "SESSIONID=none; theme=dark")
            .body(Body::from("hello"))
            .unwrap();
        let req = init(request).await;

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.query_string(), "a=1&a=2&b=3");
        assert_eq!(req.query_param("a"), Some(&ParamValue::List(vec!["1".into(), "2".into()])));
        assert_eq!(req.query_param("b"), Some(&ParamValue::Scalar("3".into())));
        assert_eq!(req.header("x-trace"), Some("second"));
        assert_eq!(req.header("X-TRACE"), Some("second"));
        assert_eq!(req.request(), "/api/items");
        assert_eq!(req.request_uri(), "/api/items");
        assert_eq!(req.content_type(), Some("text/plain"));
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(req.server_name(), "example.com");
        assert_eq!(req.server_port(), 9000);
        assert_eq!(req.remote_host(), "10.0.0.7");
        assert_eq!(req.local_port(), 8080);
        assert_eq!(req.protocol(), "HTTP/1.1");
        assert_eq!(req.scheme(), "http");
        assert_eq!(req.cookies().len(), 2);
        assert_eq!(req.cookie("theme").map(|c| c.value.as_str()), Some("dark"));
        assert!(!req.is_multipart());
        assert!(req.remote_user().is_none());
    }

    #[tokio::test]
    async fn body_is_read_once() {
        let request = Request::builder().uri("/").body(Body::from("payload")).unwrap();
        let mut req = init(request).await;
        assert_eq!(req.get_content().await.unwrap(), "payload");
        assert!(matches!(req.get_content().await, Err(HttpError::StreamConsumed)));
        assert!(matches!(req.get_content_binary().await, Err(HttpError::StreamConsumed)));
    }

    #[tokio::test]
    async fn basic_auth_parsing() {
        let request = Request::builder()
            .uri("/")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let req = init(request).await;
        assert_eq!(
            req.get_basic_auth(),
            Some(BasicAuth {
                user_name: "user".into(),
                password: "pass".into()
            })
        );

        // "userpass" has no colon
        for value in ["Basic dXNlcnBhc3M=", "Basic", "Basic dXNlcjpwYXNz extra", "Basic !!!"] {
            let request = Request::builder()
                .uri("/")
                .header("Authorization", value)
                .body(Body::empty())
                .unwrap();
            assert_eq!(init(request).await.get_basic_auth(), None, "{value}");
        }

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(init(request).await.get_basic_auth(), None);
    }

    #[tokio::test]
    async fn locales_follow_quality() {
        let request = Request::builder()
            .uri("/")
            .header("Accept-Language", "fr;q=0.5, de-DE, en;q=0.8, *;q=0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(init(request).await.locales(), ["de-DE", "en", "fr"]);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(init(request).await.locales(), ["en-US"]);
    }

    #[tokio::test]
    async fn multipart_parts_grouped_by_name() {
        let boundary = "XyZ";
        let body = multipart_body(boundary, &[("file", "one"), ("file", "two"), ("note", "hi")]);
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let mut req = init(request).await;

        assert!(req.is_multipart());
        let files = &req.parts()["file"];
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].text(), "one");
        assert_eq!(files[1].text(), "two");
        assert_eq!(files[0].file_name.as_deref(), Some("file.txt"));
        assert_eq!(files[0].content_type, "text/plain");
        assert_eq!(files[1].size, 3);
        assert_eq!(req.parts()["note"].len(), 1);
        assert!(matches!(req.get_content().await, Err(HttpError::StreamConsumed)));
    }

    #[tokio::test]
    async fn multipart_gated_on_content_type() {
        let body = multipart_body("XyZ", &[("file", "one"), ("file", "two")]);
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("Content-Type", "application/json")
            .body(Body::from(body.clone()))
            .unwrap();
        let mut req = init(request).await;

        assert!(!req.is_multipart());
        assert!(req.parts().is_empty());
        assert_eq!(req.get_content().await.unwrap(), body);
    }

    #[tokio::test]
    async fn form_posts_join_query_params() {
        let request = Request::builder()
            .method("POST")
            .uri("/signup?source=ad&tag=a")
            .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
            .body(Body::from("name=Ann+Doe&tag=b&tag=c"))
            .unwrap();
        let mut req = init(request).await;

        assert_eq!(req.query_string(), "source=ad&tag=a");
        assert_eq!(req.query_param("name"), Some(&ParamValue::Scalar("Ann Doe".into())));
        assert_eq!(req.query_param("source").map(ParamValue::first), Some("ad"));
        assert_eq!(req.query_param("tag").unwrap().values(), vec!["a", "b", "c"]);
        assert!(matches!(req.get_content().await, Err(HttpError::StreamConsumed)));
    }

    #[tokio::test]
    async fn session_lookup_and_creation() {
        let context = ctx();
        let sessions = context.sessions.clone();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let mut req = HttpServerRequest::init(request, "/", context.clone()).await.unwrap();
        assert!(matches!(req.get_session(false), Err(HttpError::SessionNull)));
        assert!(req.find_session().is_none());

        let created = req.get_session(true).unwrap();
        assert!(created.is_new());
        assert_eq!(req.created_session().map(|s| s.id().to_string()), Some(created.id().to_string()));
        assert_eq!(req.get_session(false).unwrap().id(), created.id());

        let request = Request::builder()
            .uri("/")
            .header("Cookie", format!("SESSIONID={}", created.id()))
            .body(Body::empty())
            .unwrap();
        let mut next = HttpServerRequest::init(request, "/", context).await.unwrap();
        let found = next.get_session(false).unwrap();
        assert_eq!(found.id(), created.id());
        assert!(!found.is_new());
        assert!(next.created_session().is_none());
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn remote_user_from_extension() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(RemoteUser("alice".into()));
        assert_eq!(init(request).await.remote_user(), Some("alice"));
    }
}
