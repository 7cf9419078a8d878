use std::{
    io::{Read as _, Write as _},
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use harbor_http::{Handler, Server, ServerConfig};

/// Start a server with the given handler on an ephemeral port, on a
/// background thread. The thread runs for the rest of the test process.
pub fn spawn_server(timeout_secs: u64, handler: Handler) -> SocketAddr {
    let config = ServerConfig {
        port: 0,
        inactive_connection_timeout_in_seconds: timeout_secs,
        enable_logging: false,
        ..ServerConfig::default()
    };

    let mut server = Server::new(config, handler).expect("failed to create server");
    let port = server.local_addr().port();

    thread::spawn(move || {
        let _ = server.start();
    });

    SocketAddr::from(([127, 0, 0, 1], port))
}

/// A handler answering 200 OK with the body `Hi`.
pub fn ok_handler() -> Handler {
    Box::new(|_request, response| {
        response.status = 200;
        response.reason = "OK".into();
        response.set_body("Hi");
    })
}

/// Send raw request bytes and collect the reply until the server closes
/// the connection.
pub fn roundtrip(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut client = TcpStream::connect(addr).expect("failed to connect");
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("failed to set read timeout");

    client.write_all(request).expect("failed to send request");

    let mut reply = Vec::new();
    client
        .read_to_end(&mut reply)
        .expect("failed to read reply");
    reply
}

/// Split a reply into its header block and body.
pub fn split_reply(reply: &[u8]) -> (String, Vec<u8>) {
    let at = reply
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("reply has no header terminator");
    let head = String::from_utf8_lossy(&reply[..at + 4]).into_owned();
    (head, reply[at + 4..].to_vec())
}
