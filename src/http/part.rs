//! One field of a `multipart/form-data` submission.

use std::collections::HashMap;

use axum::body::Bytes;

/// A multipart form part, fully buffered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpPart {
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub name: String,
    /// Original file name, when the part is a file upload.
    pub file_name: Option<String>,
    pub size: usize,
    pub data: Bytes,
}

impl HttpPart {
    /// Part payload decoded as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
