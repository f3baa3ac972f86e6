//! Browser cookie value type.
//!
//! Request cookies arrive as a single `Cookie: a=1; b=2` header and carry
//! only name and value; every other attribute is a response-side
//! (`Set-Cookie`) concern.

use std::fmt::{Display, Formatter};

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::http::HttpError;

/// A browser cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Cookie {
    pub comment: String,
    pub domain: String,
    /// Seconds until expiry; negative means a browser-session cookie.
    pub max_age: i64,
    pub name: String,
    pub path: String,
    pub secure: bool,
    pub value: String,
    pub version: u8,
    pub http_only: bool,
}

impl Default for Cookie {
    fn default() -> Self {
        Self {
            comment: String::new(),
            domain: String::new(),
            max_age: -1,
            name: String::new(),
            path: String::new(),
            secure: false,
            value: String::new(),
            version: 1,
            http_only: false,
        }
    }
}

impl Cookie {
    /// Cookie with a name and value, every other field at its default.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Check that the cookie can be serialized into a `Set-Cookie` header.
    pub fn validate(&self) -> Result<(), HttpError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(HttpError::InvalidCookie("name is not set or is blank".into()));
        }
        if !name.bytes().all(is_token_byte) {
            return Err(HttpError::InvalidCookie(format!("name '{}' contains separators", self.name)));
        }
        if !self.value.bytes().all(is_cookie_octet) {
            return Err(HttpError::InvalidCookie(format!(
                "value of '{}' contains characters not allowed in a cookie",
                self.name
            )));
        }
        for (field, attr) in [("domain", &self.domain), ("path", &self.path), ("comment", &self.comment)] {
            if attr.bytes().any(|b| b == b';' || b.is_ascii_control()) {
                return Err(HttpError::InvalidCookie(format!("{field} contains ';' or control characters")));
            }
        }
        Ok(())
    }
}

/// `Set-Cookie` serialization.
impl Display for Cookie {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name.trim(), self.value)?;
        if !self.domain.is_empty() {
            write!(f, "; Domain={}", self.domain)?;
        }
        if !self.path.is_empty() {
            write!(f, "; Path={}", self.path)?;
        }
        if self.max_age >= 0 {
            write!(f, "; Max-Age={}", self.max_age)?;
        }
        if !self.comment.is_empty() {
            write!(f, "; Comment={}", self.comment)?;
        }
        if self.version != 1 {
            write!(f, "; Version={}", self.version)?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

/// Parse every `Cookie` header into cookie records, in order.
pub fn parse_cookie_headers(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_cookie_header)
        .collect()
}

/// Parse a single `Cookie` header value.
pub fn parse_cookie_header(header: &str) -> Vec<Cookie> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some(Cookie::new(name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_quotes() {
        let cookies = parse_cookie_header("SESSIONID=abc123; theme=\"dark\"; =skip; broken");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], Cookie::new("SESSIONID", "abc123"));
        assert_eq!(cookies[1].name, "theme");
        assert_eq!(cookies[1].value, "dark");
        assert_eq!(cookies[1].max_age, -1);
        assert_eq!(cookies[1].version, 1);
    }

    #[test]
    fn set_cookie_format() {
        let mut cookie = Cookie::new("sid", "abc");
        assert_eq!(cookie.to_string(), "sid=abc");

        cookie.path = "/".into();
        cookie.max_age = 3600;
        cookie.secure = true;
        cookie.http_only = true;
        assert_eq!(cookie.to_string(), "sid=abc; Path=/; Max-Age=3600; Secure; HttpOnly");
    }

    #[test]
    fn validation() {
        assert!(Cookie::new("", "abc").validate().is_err());
        assert!(Cookie::new("   ", "abc").validate().is_err());
        assert!(Cookie::new("a;b", "abc").validate().is_err());
        assert!(Cookie::new("sid", "a b").validate().is_err());
        assert!(Cookie::new("sid", "").validate().is_ok());
        assert!(Cookie::new("sid", "abc").validate().is_ok());
    }
}
