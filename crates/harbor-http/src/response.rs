use std::collections::HashMap;

use crate::constants::versions;

/// An HTTP/1.1 response under construction.
///
/// The default value carries status 0, the "handler has not produced a
/// response yet" sentinel; [`is_ready`](Response::is_ready) turns true as
/// soon as a nonzero status is set.
#[derive(Debug, Default, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    /// A response with a status line and no headers or body yet.
    pub fn with_status(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: reason.to_owned(),
            ..Self::default()
        }
    }

    /// The protocol version, fixed for this library.
    pub fn version(&self) -> &'static str {
        versions::HTTP_1_1
    }

    pub fn is_ready(&self) -> bool {
        self.status != 0
    }

    /// Set a header. Names are stored lowercase, so each name appears once
    /// in the serialized response.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_owned());
    }

    /// Look up a header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }
}
