use std::collections::HashMap;

/// A parsed HTTP/1.1 request.
///
/// Header keys are stored lowercase and each key appears once (the last
/// value wins, except `content-length` where a repeat is a protocol
/// error). The URI is kept exactly as received, without percent-decoding.
#[derive(Debug, Default, Clone)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    /// Look up a header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
