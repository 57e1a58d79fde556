//! Blocking TCP client for the client/admin half of §6's RPC surface.
//!
//! Deliberately tiny: one request per connection, reusing `scm_server`'s
//! frame codec (`wire::encode_request`/`decode_response`) so the CLI and
//! the daemon never drift on wire format. A real operator tool would pool
//! connections and pipeline requests; this is an admin CLI invoked once
//! per process, so a fresh connection per call is the right trade.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;

use scm_server::wire::{self, Request, Response};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends `request` to `server` (`host:port`) and waits for the matching
/// response frame.
pub fn call(server: &str, request: &Request) -> anyhow::Result<Response> {
    let addr = server
        .to_socket_addrs()
        .map_err(|e| anyhow::anyhow!("invalid server address {server}: {e}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {server}"))?;

    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .map_err(|e| anyhow::anyhow!("failed to connect to {server}: {e}"))?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_nodelay(true).ok();

    let mut out = BytesMut::new();
    wire::encode_request(request, &mut out)?;
    stream.write_all(&out)?;
    stream.flush()?;

    let mut buf = BytesMut::with_capacity(4096);
    let mut scratch = [0u8; 4096];
    loop {
        if let Some(frame) = wire::decode_frame(&mut buf)? {
            return Ok(wire::decode_response(&frame)?);
        }
        let n = stream.read(&mut scratch)?;
        if n == 0 {
            anyhow::bail!("connection to {server} closed before a full response arrived");
        }
        buf.extend_from_slice(&scratch[..n]);
    }
}
