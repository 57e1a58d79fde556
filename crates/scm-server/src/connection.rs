//! Per-connection state for the RPC listener: read/write buffering and
//! frame decode/encode, adapted from the teacher's `connection.rs` but
//! narrowed to what this server's request/response surface needs (no
//! rate limiting or auth — §6's admin/datanode RPCs are session-less).

use std::io::{self, Read, Write};

use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Interest, Token};

use crate::error::ServerResult;
use crate::tls::TlsStream;
use crate::wire::{self, Request, Response};

/// Either a plaintext or a TLS-wrapped socket, so `Connection` doesn't
/// need to be generic over the listener's security mode.
pub enum Socket {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(stream) => stream.read(buf),
            Socket::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(stream) => stream.write(buf),
            Socket::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Plain(stream) => stream.flush(),
            Socket::Tls(_) => Ok(()),
        }
    }
}

/// State of one client connection on the RPC listener (§6 datanode/admin
/// surface). Buffering mirrors the teacher's `Connection`: a temp stack
/// buffer feeds an accumulating `read_buf`, decoded frame by frame.
pub struct Connection {
    pub token: Token,
    pub socket: Socket,
    pub read_buf: BytesMut,
    pub write_buf: BytesMut,
    pub closing: bool,
    pub handshake_complete: bool,
}

impl Connection {
    pub fn new(token: Token, socket: Socket, buffer_size: usize) -> Self {
        let handshake_complete = matches!(socket, Socket::Plain(_));
        Self {
            token,
            socket,
            read_buf: BytesMut::with_capacity(buffer_size),
            write_buf: BytesMut::with_capacity(buffer_size),
            closing: false,
            handshake_complete,
        }
    }

    /// Drives the TLS handshake, if any, one step. No-op on a plaintext
    /// connection.
    pub fn drive_handshake(&mut self) -> ServerResult<()> {
        if self.handshake_complete {
            return Ok(());
        }
        if let Socket::Tls(stream) = &mut self.socket {
            self.handshake_complete = stream.do_handshake()?;
        } else {
            self.handshake_complete = true;
        }
        Ok(())
    }

    pub fn read(&mut self) -> io::Result<bool> {
        let mut temp_buf = [0u8; 8192];
        loop {
            match self.socket.read(&mut temp_buf) {
                Ok(0) => return Ok(false),
                Ok(n) => self.read_buf.extend_from_slice(&temp_buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn write(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.socket.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write to socket")),
                Ok(n) => {
                    let _ = self.write_buf.split_to(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub fn try_decode_request(&mut self) -> ServerResult<Option<Request>> {
        match wire::decode_frame(&mut self.read_buf)? {
            Some(frame) => wire::decode_request(&frame).map(Some),
            None => Ok(None),
        }
    }

    pub fn queue_response(&mut self, response: &Response) -> ServerResult<()> {
        wire::encode_response(response, &mut self.write_buf)
    }

    pub fn interest(&self) -> Interest {
        if self.write_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    pub fn has_pending_data(&self) -> bool {
        self.read_buf.len() >= wire::FRAME_HEADER_SIZE
    }
}
