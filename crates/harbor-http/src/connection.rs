use std::{
    net::SocketAddr,
    panic::{catch_unwind, AssertUnwindSafe},
    time::{Duration, Instant},
};

use bytes::BytesMut;
use tracing::{event, Level};

use harbor_net::net::Stream;

use crate::constants::{headers, status, versions};
use crate::parser::{self, BodyMode, ProtocolError, Scan};
use crate::request::Request;
use crate::response::Response;
use crate::server::Handler;

/// Progress of the request/response exchange on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    ConnectionEstablished,
    ReadingRequestLine,
    RequestLineDone,
    ReadingHeaders,
    HeadersDone,
    ReadingBody,
    RequestReadingDone,
    SendingResponse,
    Completed,
    /// I/O with the peer failed; nothing more can be sent.
    ClientError,
    /// The handler or the library itself failed; a 500 is still attempted.
    ServerError,
}

/// One accepted client connection and its request state machine.
///
/// [`progress`](Connection::progress) is driven by the server whenever the
/// poller reports the connection's socket ready. Every intermediate state
/// is safe to revisit, so partial request lines, header sections, bodies
/// and partially written responses all pick up where they left off.
pub struct Connection {
    stream: Stream,
    /// Holds request bytes while reading, then the serialized response.
    buffer: BytesMut,
    /// Parse boundary while reading, send offset while writing.
    cursor: usize,
    headers_start: usize,
    body_start: usize,
    body_mode: BodyMode,
    request: Request,
    response: Response,
    status: RequestStatus,
    peer_readable: bool,
    peer_writable: bool,
    last_activity: Instant,
}

impl Connection {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            cursor: 0,
            headers_start: 0,
            body_start: 0,
            body_mode: BodyMode::None,
            request: Request::default(),
            response: Response::default(),
            status: RequestStatus::ConnectionEstablished,
            peer_readable: false,
            peer_writable: false,
            last_activity: Instant::now(),
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.stream.peer_addr()
    }

    pub fn response_ready(&self) -> bool {
        self.response.is_ready()
    }

    /// Time since the last readiness event handled for this connection.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn mark_peer_readable(&mut self) {
        self.peer_readable = true;
    }

    pub fn mark_peer_writable(&mut self) {
        self.peer_writable = true;
    }

    /// Drop the latched readiness and refresh the idle clock.
    pub fn clear_readiness(&mut self) {
        self.peer_readable = false;
        self.peer_writable = false;
        self.last_activity = Instant::now();
    }

    pub fn stream_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }

    /// Advance the exchange as far as the latched readiness allows.
    ///
    /// Never panics and never returns an error: peer failures land in
    /// `ClientError`, everything else is answered on the wire.
    pub fn progress(&mut self, handler: &mut Handler) {
        let reading = matches!(
            self.status,
            RequestStatus::ConnectionEstablished
                | RequestStatus::ReadingRequestLine
                | RequestStatus::RequestLineDone
                | RequestStatus::ReadingHeaders
                | RequestStatus::HeadersDone
                | RequestStatus::ReadingBody
        );
        if reading && self.peer_readable {
            self.read_request();
        }

        if self.status == RequestStatus::RequestReadingDone && !self.response.is_ready() {
            self.invoke_handler(handler);
        }

        let writing = matches!(
            self.status,
            RequestStatus::RequestReadingDone
                | RequestStatus::SendingResponse
                | RequestStatus::ServerError
        );
        if writing && self.peer_writable {
            self.send_response();
        }
    }

    /// Drain the socket and push the parse forward.
    fn read_request(&mut self) {
        match self.stream.recv() {
            Ok(data) => self.buffer.extend_from_slice(&data),
            Err(error) => {
                event!(Level::ERROR, peer = %self.peer_addr(), %error, "receive failed");
                self.status = RequestStatus::ClientError;
                return;
            }
        }

        if let Err(error) = self.advance_parse() {
            event!(Level::ERROR, peer = %self.peer_addr(), %error, "request rejected");
            self.response = Response::with_status(error.status(), error.reason());
            self.status = RequestStatus::RequestReadingDone;
        }
    }

    /// Run the parse ladder over whatever is buffered.
    ///
    /// Each stage either completes and falls through to the next, or
    /// leaves the state untouched for the next readable edge.
    fn advance_parse(&mut self) -> Result<(), ProtocolError> {
        if self.status == RequestStatus::ConnectionEstablished {
            self.status = RequestStatus::ReadingRequestLine;
        }

        if self.status == RequestStatus::ReadingRequestLine {
            match parser::scan_request_line(&self.buffer, self.cursor)? {
                Scan::Complete(end) => {
                    self.cursor = end;
                    self.status = RequestStatus::RequestLineDone;
                }
                Scan::NeedMore => return Ok(()),
            }
        }

        if self.status == RequestStatus::RequestLineDone {
            // The request line always starts the buffer; no keep-alive.
            let line = parser::parse_request_line(&self.buffer[..self.cursor - 2])?;
            if line.version != versions::HTTP_1_1 {
                return Err(ProtocolError::VersionNotSupported);
            }

            self.request.method = line.method;
            self.request.uri = line.uri;
            self.request.version = line.version;
            self.headers_start = self.cursor;
            self.status = RequestStatus::ReadingHeaders;
        }

        if self.status == RequestStatus::ReadingHeaders {
            match parser::scan_headers(&self.buffer, self.headers_start)? {
                Scan::Complete(end) => {
                    self.cursor = end;
                    self.status = RequestStatus::HeadersDone;
                }
                Scan::NeedMore => return Ok(()),
            }
        }

        if self.status == RequestStatus::HeadersDone {
            let section = &self.buffer[self.headers_start..self.cursor];
            self.request.headers = parser::parse_headers(section)?;
            self.body_mode = parser::body_mode(&self.request.headers)?;
            self.body_start = self.cursor;

            self.status = match self.body_mode {
                BodyMode::None => RequestStatus::RequestReadingDone,
                _ => RequestStatus::ReadingBody,
            };
        }

        if self.status == RequestStatus::ReadingBody {
            match self.body_mode {
                BodyMode::Length(length) => {
                    if self.buffer.len() - self.body_start >= length {
                        self.cursor = self.body_start + length;
                        self.status = RequestStatus::RequestReadingDone;
                    }
                }
                BodyMode::Chunked => match parser::scan_chunked(&self.buffer, self.body_start)? {
                    Scan::Complete(end) => {
                        self.cursor = end;
                        self.status = RequestStatus::RequestReadingDone;
                    }
                    Scan::NeedMore => {}
                },
                BodyMode::None => self.status = RequestStatus::RequestReadingDone,
            }
        }

        if self.status == RequestStatus::RequestReadingDone {
            self.request.body =
                parser::extract_body(&self.buffer, self.body_start, self.body_mode);
            event!(
                Level::INFO,
                peer = %self.peer_addr(),
                method = %self.request.method,
                uri = %self.request.uri,
                "request received"
            );
        }

        Ok(())
    }

    /// Hand the request to the embedder's callback, exactly once.
    fn invoke_handler(&mut self, handler: &mut Handler) {
        let request = &self.request;
        let response = &mut self.response;
        let result = catch_unwind(AssertUnwindSafe(|| handler(request, response)));

        if result.is_err() {
            event!(Level::ERROR, peer = %self.peer_addr(), "handler panicked");
            self.response = Response::with_status(status::INTERNAL_SERVER_ERROR, "Internal Server Error");
            self.status = RequestStatus::ServerError;
        } else if !self.response.is_ready() {
            // The callback returned without setting a status; there is
            // nothing meaningful to serialize, so fail the request.
            event!(Level::WARN, peer = %self.peer_addr(), "handler produced no response");
            self.response = Response::with_status(status::INTERNAL_SERVER_ERROR, "Internal Server Error");
            self.status = RequestStatus::ServerError;
        }
    }

    /// Serialize on first entry, then push bytes until done or blocked.
    fn send_response(&mut self) {
        if matches!(
            self.status,
            RequestStatus::RequestReadingDone | RequestStatus::ServerError
        ) {
            let length = self.response.body.len().to_string();
            self.response.set_header(headers::CONNECTION, "close");
            self.response.set_header(headers::CONTENT_LENGTH, &length);

            self.buffer = parser::serialize_response(&self.response);
            self.cursor = 0;
            self.status = RequestStatus::SendingResponse;
        }

        match self.stream.send(&self.buffer, self.cursor) {
            Ok(sent) => {
                self.cursor += sent;
                if self.cursor == self.buffer.len() {
                    event!(
                        Level::INFO,
                        peer = %self.peer_addr(),
                        status = self.response.status,
                        "response sent"
                    );
                    self.status = RequestStatus::Completed;
                }
            }
            Err(error) => {
                event!(Level::ERROR, peer = %self.peer_addr(), %error, "send failed");
                self.status = RequestStatus::ClientError;
            }
        }
    }
}
