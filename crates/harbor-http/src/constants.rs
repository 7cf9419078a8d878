//! Protocol constants shared across the crate.

/// Canonical (lowercase) names of the headers the core inspects or emits.
pub mod headers {
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const TRANSFER_ENCODING: &str = "transfer-encoding";
    pub const CONNECTION: &str = "connection";
    pub const HOST: &str = "host";
}

pub mod versions {
    /// The only protocol version this library speaks.
    pub const HTTP_1_1: &str = "HTTP/1.1";
}

/// Status codes produced by the core, plus a few common ones for handlers.
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NO_CONTENT: u16 = 204;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    pub const URI_TOO_LONG: u16 = 414;
    pub const HEADER_FIELDS_TOO_LARGE: u16 = 431;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const HTTP_VERSION_NOT_SUPPORTED: u16 = 505;
}

/// Hard bounds enforced while parsing a request.
pub mod limits {
    /// Longest accepted request line, in bytes, not counting its CRLF.
    pub const MAX_REQUEST_LINE: usize = 8192;
    /// Cumulative cap on the header section, terminator included.
    pub const MAX_HEADER_SIZE: usize = 8192;
    /// Cap on a request body, whether declared or chunk-accumulated.
    pub const MAX_BODY_SIZE: usize = 10_485_760;
    /// Advisory pending-connection queue default.
    pub const DEFAULT_BACKLOG: u32 = 128;
}
