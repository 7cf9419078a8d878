use std::{
    io::{Read as _, Write as _},
    net::TcpStream as StdTcpStream,
    time::{Duration, Instant},
};

use anyhow::{bail, Error};
use harbor_net::{net::Listener, net::StreamError, Poller};
use mio::Token;
use tracing_test::traced_test;

const LISTENER: Token = Token(0);
const CLIENT: Token = Token(1);

/// Wait until the poller caches the wanted bit for `token`.
fn wait_for(
    poller: &mut Poller,
    token: Token,
    readable: bool,
) -> Result<(), Error> {
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        let ready = if readable {
            poller.is_readable(token)
        } else {
            poller.is_writable(token)
        };
        if ready {
            return Ok(());
        }
        if Instant::now() > deadline {
            bail!("timed out waiting for readiness on token {}", token.0);
        }

        poller.wait(Some(Duration::from_millis(100)))?;
    }
}

#[test]
#[traced_test]
fn accept_and_round_trip() -> Result<(), Error> {
    let mut poller = Poller::new(8)?;
    let mut listener = Listener::bind("127.0.0.1:0".parse()?)?;
    poller.register(&mut listener, LISTENER)?;

    let mut client = StdTcpStream::connect(listener.local_addr())?;
    client.set_read_timeout(Some(Duration::from_secs(5)))?;

    wait_for(&mut poller, LISTENER, true)?;
    let mut accepted = listener.accept_all()?;
    assert_eq!(accepted.len(), 1);
    let mut stream = accepted.remove(0);

    poller.register(&mut stream, CLIENT)?;

    // Registration is optimistic about the write side only.
    assert!(poller.is_writable(CLIENT));
    assert!(!poller.is_readable(CLIENT));

    client.write_all(b"ping")?;
    wait_for(&mut poller, CLIENT, true)?;
    let data = stream.recv()?;
    assert_eq!(data, b"ping");

    // Bits are sticky until explicitly cleared.
    assert!(poller.is_readable(CLIENT));
    poller.clear(CLIENT);
    assert!(!poller.is_readable(CLIENT));
    assert!(!poller.is_writable(CLIENT));

    let sent = stream.send(b"pong", 0)?;
    assert_eq!(sent, 4);

    let mut reply = [0; 4];
    client.read_exact(&mut reply)?;
    assert_eq!(&reply, b"pong");

    poller.unregister(&mut stream, CLIENT)?;
    Ok(())
}

#[test]
#[traced_test]
fn recv_reports_peer_close() -> Result<(), Error> {
    let mut poller = Poller::new(8)?;
    let mut listener = Listener::bind("127.0.0.1:0".parse()?)?;
    poller.register(&mut listener, LISTENER)?;

    let client = StdTcpStream::connect(listener.local_addr())?;

    wait_for(&mut poller, LISTENER, true)?;
    let mut accepted = listener.accept_all()?;
    assert_eq!(accepted.len(), 1);
    let mut stream = accepted.remove(0);
    poller.register(&mut stream, CLIENT)?;

    drop(client);

    // The close shows up as a readable edge and then a zero-byte read.
    wait_for(&mut poller, CLIENT, true)?;
    let result = stream.recv();
    assert!(matches!(result, Err(StreamError::Closed)));

    Ok(())
}

#[test]
#[traced_test]
fn accept_all_drains_pending_connections() -> Result<(), Error> {
    let mut poller = Poller::new(8)?;
    let mut listener = Listener::bind("127.0.0.1:0".parse()?)?;
    poller.register(&mut listener, LISTENER)?;

    let _first = StdTcpStream::connect(listener.local_addr())?;
    let _second = StdTcpStream::connect(listener.local_addr())?;

    wait_for(&mut poller, LISTENER, true)?;

    // Both connections may not be queued yet when the first edge arrives.
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut accepted = Vec::new();
    while accepted.len() < 2 {
        accepted.extend(listener.accept_all()?);
        if Instant::now() > deadline {
            bail!("only accepted {} connections", accepted.len());
        }
        poller.wait(Some(Duration::from_millis(50)))?;
    }
    assert_eq!(accepted.len(), 2);

    Ok(())
}
