//! Stateless parsing and serialization for the HTTP/1.1 wire format.
//!
//! Everything here is a pure function over byte slices. Incremental
//! buffering and parse state live on the connection; these functions only
//! answer "is this piece complete, and what does it mean".

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use crate::constants::{headers, limits, status};
use crate::response::Response;

/// A protocol violation detected while parsing a request.
///
/// Each variant maps to the status code of the error response prepared for
/// the client; see [`status`](ProtocolError::status).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid HTTP request line")]
    InvalidRequestLine,
    #[error("HTTP request line too long")]
    RequestLineTooLong,
    #[error("HTTP header section too large")]
    HeadersTooLarge,
    #[error("invalid Content-Length header value")]
    InvalidContentLength,
    #[error("multiple Content-Length headers present")]
    MultipleContentLengthHeaders,
    #[error("Transfer-Encoding header present without final 'chunked' coding")]
    TransferEncodingWithoutChunked,
    #[error("both Content-Length and Transfer-Encoding headers present")]
    BothContentLengthAndChunked,
    #[error("invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("request body exceeds the maximum size")]
    BodyTooLarge,
    #[error("HTTP version not supported")]
    VersionNotSupported,
}

impl ProtocolError {
    /// Status code of the error response sent for this violation.
    pub fn status(&self) -> u16 {
        match self {
            Self::RequestLineTooLong => status::URI_TOO_LONG,
            Self::HeadersTooLarge => status::HEADER_FIELDS_TOO_LARGE,
            Self::BodyTooLarge => status::PAYLOAD_TOO_LARGE,
            Self::VersionNotSupported => status::HTTP_VERSION_NOT_SUPPORTED,
            _ => status::BAD_REQUEST,
        }
    }

    /// Canonical reason phrase paired with [`status`](ProtocolError::status).
    pub fn reason(&self) -> &'static str {
        match self.status() {
            status::URI_TOO_LONG => "URI Too Long",
            status::HEADER_FIELDS_TOO_LARGE => "Request Header Fields Too Large",
            status::PAYLOAD_TOO_LARGE => "Payload Too Large",
            status::HTTP_VERSION_NOT_SUPPORTED => "HTTP Version Not Supported",
            _ => "Bad Request",
        }
    }
}

/// How the body of a request is framed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body is expected.
    #[default]
    None,
    /// Exactly this many bytes follow the header terminator.
    Length(usize),
    /// Chunked transfer encoding, terminated by a zero-size chunk.
    Chunked,
}

/// Outcome of scanning a buffer for a complete line or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// More bytes are needed before a decision can be made.
    NeedMore,
    /// The wanted terminator was found; the value is the index one past it.
    Complete(usize),
}

/// The three parts of a request line.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub uri: String,
    pub version: String,
}

/// Find the CRLF of the line starting at `from`; returns the `\r` index.
fn find_crlf(buffer: &[u8], from: usize) -> Option<usize> {
    let window = buffer.get(from..)?;
    window.windows(2).position(|w| w == b"\r\n").map(|i| from + i)
}

/// Scan for the CRLF that terminates the request line starting at `start`.
///
/// The line may be at most [`limits::MAX_REQUEST_LINE`] bytes long, not
/// counting the CRLF; past that the request is rejected without waiting
/// for the terminator to show up.
pub fn scan_request_line(buffer: &[u8], start: usize) -> Result<Scan, ProtocolError> {
    match find_crlf(buffer, start) {
        Some(at) if at - start > limits::MAX_REQUEST_LINE => {
            Err(ProtocolError::RequestLineTooLong)
        }
        Some(at) => Ok(Scan::Complete(at + 2)),
        // The last buffered byte could still be the `\r` of the terminator.
        None if buffer.len().saturating_sub(start) > limits::MAX_REQUEST_LINE + 1 => {
            Err(ProtocolError::RequestLineTooLong)
        }
        None => Ok(Scan::NeedMore),
    }
}

/// Scan for the blank line that terminates the header section starting at
/// `start`. The section, terminator included, may be at most
/// [`limits::MAX_HEADER_SIZE`] bytes.
pub fn scan_headers(buffer: &[u8], start: usize) -> Result<Scan, ProtocolError> {
    // A request without headers terminates the section immediately.
    if buffer.len() >= start + 2 && &buffer[start..start + 2] == b"\r\n" {
        return Ok(Scan::Complete(start + 2));
    }

    let window_end = buffer.len().min(start + limits::MAX_HEADER_SIZE + 4);
    if let Some(window) = buffer.get(start..window_end) {
        if let Some(i) = window.windows(4).position(|w| w == b"\r\n\r\n") {
            let end = start + i + 4;
            if end - start > limits::MAX_HEADER_SIZE {
                return Err(ProtocolError::HeadersTooLarge);
            }
            return Ok(Scan::Complete(end));
        }
    }

    if buffer.len().saturating_sub(start) > limits::MAX_HEADER_SIZE {
        return Err(ProtocolError::HeadersTooLarge);
    }
    Ok(Scan::NeedMore)
}

/// Validate and split a request line (`METHOD SP URI SP VERSION`).
///
/// The line must contain exactly two spaces; `line` excludes the CRLF.
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine, ProtocolError> {
    let spaces = line.iter().filter(|&&b| b == b' ').count();
    if spaces != 2 {
        return Err(ProtocolError::InvalidRequestLine);
    }

    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidRequestLine)?;
    let mut parts = line.splitn(3, ' ');

    // Exactly two spaces always yield three parts.
    let value = RequestLine {
        method: parts.next().unwrap_or_default().to_owned(),
        uri: parts.next().unwrap_or_default().to_owned(),
        version: parts.next().unwrap_or_default().to_owned(),
    };
    Ok(value)
}

/// Parse a header section into a lowercase-keyed map.
///
/// `section` covers everything between the request line and the blank
/// line. Lines without a `:` are not recognized as headers and skipped.
/// Values keep their trailing whitespace; only leading spaces and tabs are
/// trimmed. A repeated Content-Length header is rejected even when the
/// values agree; for any other header the last value wins.
pub fn parse_headers(section: &[u8]) -> Result<HashMap<String, String>, ProtocolError> {
    let mut map = HashMap::new();

    for line in section.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };

        let key = String::from_utf8_lossy(&line[..colon]).to_ascii_lowercase();
        let rest = &line[colon + 1..];
        let value_start = rest
            .iter()
            .position(|&b| b != b' ' && b != b'\t')
            .unwrap_or(rest.len());
        let value = String::from_utf8_lossy(&rest[value_start..]).into_owned();

        if key == headers::CONTENT_LENGTH && map.contains_key(headers::CONTENT_LENGTH) {
            return Err(ProtocolError::MultipleContentLengthHeaders);
        }
        map.insert(key, value);
    }

    Ok(map)
}

/// Decide how the body is framed.
///
/// A Content-Length value must be a non-negative decimal no larger than
/// [`limits::MAX_BODY_SIZE`]; a Transfer-Encoding's final comma-separated
/// coding must be exactly `chunked`; the two framings are mutually
/// exclusive.
pub fn body_mode(map: &HashMap<String, String>) -> Result<BodyMode, ProtocolError> {
    let declared = match map.get(headers::CONTENT_LENGTH) {
        Some(value) => {
            let length = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength)?;
            if length > limits::MAX_BODY_SIZE {
                return Err(ProtocolError::BodyTooLarge);
            }
            Some(length)
        }
        None => None,
    };

    let chunked = match map.get(headers::TRANSFER_ENCODING) {
        Some(value) => {
            // Only the final applied coding matters.
            let last = value.rsplit(',').next().unwrap_or(value);
            if last.trim_matches(|c| c == ' ' || c == '\t') != "chunked" {
                return Err(ProtocolError::TransferEncodingWithoutChunked);
            }
            true
        }
        None => false,
    };

    match (declared, chunked) {
        (Some(_), true) => Err(ProtocolError::BothContentLengthAndChunked),
        (Some(length), false) => Ok(BodyMode::Length(length)),
        (None, true) => Ok(BodyMode::Chunked),
        (None, false) => Ok(BodyMode::None),
    }
}

/// Walk chunked framing starting at `start` until the zero-size chunk.
///
/// Chunk-size lines are hexadecimal; anything from `;` on is an ignored
/// extension. The sum of chunk sizes may not exceed
/// [`limits::MAX_BODY_SIZE`].
pub fn scan_chunked(buffer: &[u8], start: usize) -> Result<Scan, ProtocolError> {
    let mut pos = start;
    let mut total = 0usize;

    loop {
        let Some(line_end) = find_crlf(buffer, pos) else {
            return Ok(Scan::NeedMore);
        };
        let size = parse_chunk_size(&buffer[pos..line_end])?;

        total = total
            .checked_add(size)
            .ok_or(ProtocolError::BodyTooLarge)?;
        if total > limits::MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge);
        }

        // The chunk data and its trailing CRLF must both be present.
        let data_start = line_end + 2;
        if buffer.len() < data_start + size + 2 {
            return Ok(Scan::NeedMore);
        }
        if &buffer[data_start + size..data_start + size + 2] != b"\r\n" {
            return Err(ProtocolError::InvalidChunkedEncoding);
        }

        pos = data_start + size + 2;
        if size == 0 {
            return Ok(Scan::Complete(pos));
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ProtocolError> {
    let digits = match line.iter().position(|&b| b == b';') {
        Some(at) => &line[..at],
        None => line,
    };
    let digits: Vec<u8> = digits
        .iter()
        .copied()
        .filter(|&b| b != b' ' && b != b'\t')
        .collect();
    if digits.is_empty() {
        return Err(ProtocolError::InvalidChunkedEncoding);
    }

    let mut value = 0usize;
    for b in digits {
        let digit = (b as char)
            .to_digit(16)
            .ok_or(ProtocolError::InvalidChunkedEncoding)?;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit as usize))
            .ok_or(ProtocolError::BodyTooLarge)?;
    }
    Ok(value)
}

/// Copy the body bytes out once framing is complete.
///
/// For chunked framing the chunk data is joined; the framing itself has
/// already been validated by [`scan_chunked`].
pub fn extract_body(buffer: &[u8], body_start: usize, mode: BodyMode) -> Vec<u8> {
    match mode {
        BodyMode::None => Vec::new(),
        BodyMode::Length(length) => buffer
            .get(body_start..body_start + length)
            .map(<[u8]>::to_vec)
            .unwrap_or_default(),
        BodyMode::Chunked => {
            let mut body = Vec::new();
            let mut pos = body_start;
            while let Some(line_end) = find_crlf(buffer, pos) {
                let Ok(size) = parse_chunk_size(&buffer[pos..line_end]) else {
                    break;
                };
                if size == 0 {
                    break;
                }
                let data_start = line_end + 2;
                let Some(data) = buffer.get(data_start..data_start + size) else {
                    break;
                };
                body.extend_from_slice(data);
                pos = data_start + size + 2;
            }
            body
        }
    }
}

/// Serialize a response into wire bytes: status line, one line per header,
/// a blank line, then the body.
pub fn serialize_response(response: &Response) -> BytesMut {
    let mut data = BytesMut::with_capacity(128 + response.body.len());

    data.put(response.version().as_bytes());
    data.put_u8(b' ');
    data.put(response.status.to_string().as_bytes());
    data.put_u8(b' ');
    data.put(response.reason.as_bytes());
    data.put(&b"\r\n"[..]);

    for (name, value) in response.headers() {
        data.put(name.as_bytes());
        data.put(&b": "[..]);
        data.put(value.as_bytes());
        data.put(&b"\r\n"[..]);
    }

    data.put(&b"\r\n"[..]);
    data.put(&response.body[..]);

    data
}

/// Resolve a request URI to a normalized path.
///
/// The query string is stripped, `.` and empty segments are dropped, and
/// `..` pops the previous segment. The core does not route, but embedders
/// dispatching on the path want this.
pub fn path_from_uri(uri: &str) -> String {
    let path = uri.split('?').next().unwrap_or(uri);

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut resolved = String::from("/");
    resolved.push_str(&segments.join("/"));
    resolved
}
