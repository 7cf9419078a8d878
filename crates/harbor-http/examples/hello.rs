use anyhow::Error;
use harbor_http::{constants::status, parser, Request, Response, Server, ServerConfig};

fn main() -> Result<(), Error> {
    let config = ServerConfig {
        port: 1234,
        inactive_connection_timeout_in_seconds: 30,
        ..ServerConfig::default()
    };

    let mut server = Server::new(config, Box::new(handle))?;
    server.start()
}

fn handle(request: &Request, response: &mut Response) {
    response.status = status::OK;
    response.reason = "OK".into();
    response.set_header("content-type", "text/html");
    response.set_body(format!(
        "<!DOCTYPE html><html><body><h1>Hello from {}!</h1></body></html>",
        parser::path_from_uri(&request.uri)
    ));
}
