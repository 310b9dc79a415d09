//! HTTP/1.1 connections on `may` coroutines.
//!
//! One coroutine accepts connections and each connection gets its own
//! coroutine. Requests on a connection are served one at a time: the head is
//! parsed with `httparse`, the body is handed to the service as a
//! [`BodyReader`] bounded by `Content-Length`, and the encoded response is
//! flushed before the next head is read.
//!
//! A body that was not read to the end is never drained. The response goes
//! out with `Connection: close` and the connection is torn down, so a client
//! that declares a huge body gets its `413` as soon as the limit is hit.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use http::StatusCode;
use may::coroutine::{self, JoinHandle};
use may::net::{TcpListener, TcpStream};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::response::ResponseWriter;

/// Request headers accepted per request. Browsers behind a proxy or API
/// gateway routinely send more than 16.
pub const MAX_HEADERS: usize = 32;

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;
const BUF_LEN: usize = 4096 * 8;

/// How long a closing connection keeps discarding client bytes so the
/// response is not lost to a reset.
const LINGER_TIMEOUT: Duration = Duration::from_millis(250);
const LINGER_MAX_BYTES: usize = 256 * 1024;

/// Why a request head was refused before reaching the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeadError {
    #[error("Malformed request: {0}")]
    Malformed(httparse::Error),
    #[error("Too many request headers (limit is {})", MAX_HEADERS)]
    TooManyHeaders,
    #[error("Request head exceeds {} bytes", MAX_HEAD_BYTES)]
    HeadTooLarge,
    #[error("Invalid Content-Length header")]
    InvalidContentLength,
    #[error("Transfer-Encoding is not supported")]
    UnsupportedTransferEncoding,
}

impl HeadError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            HeadError::Malformed(_) | HeadError::InvalidContentLength => StatusCode::BAD_REQUEST,
            HeadError::TooManyHeaders | HeadError::HeadTooLarge => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            HeadError::UnsupportedTransferEncoding => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Raw target, path plus optional `?query`
    pub target: String,
    /// Minor version: `0` for HTTP/1.0, `1` for HTTP/1.1
    pub version: u8,
    /// Headers in arrival order, names as sent
    pub headers: Vec<(String, String)>,
    /// Declared body length, `0` when absent
    pub content_length: usize,
}

impl RequestHead {
    /// Get a header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` when the client asked to end the connection after this request.
    #[must_use]
    pub fn wants_close(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        let says = |token: &str| {
            connection
                .as_deref()
                .is_some_and(|c| c.split(',').any(|t| t.trim() == token))
        };
        if self.version == 0 {
            !says("keep-alive")
        } else {
            says("close")
        }
    }
}

/// Parse one request head from the front of `buf`.
///
/// Returns `Ok(None)` while the head is incomplete, otherwise the head and
/// the number of bytes it occupied.
///
/// # Errors
///
/// Returns [`HeadError`] when the head is malformed, too large, carries more
/// than [`MAX_HEADERS`] headers, or frames its body in a way this server
/// does not accept.
pub fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) if buf.len() > MAX_HEAD_BYTES => {
            return Err(HeadError::HeadTooLarge)
        }
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooManyHeaders),
        Err(e) => return Err(HeadError::Malformed(e)),
    };

    let headers: Vec<(String, String)> = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    if headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("transfer-encoding"))
    {
        return Err(HeadError::UnsupportedTransferEncoding);
    }
    let content_length = declared_length(&headers)?;

    let head = RequestHead {
        method: req.method.unwrap_or_default().to_string(),
        target: req.path.unwrap_or("/").to_string(),
        version: req.version.unwrap_or(1),
        headers,
        content_length,
    };
    Ok(Some((head, consumed)))
}

/// Digits only; repeated headers must agree.
fn declared_length(headers: &[(String, String)]) -> Result<usize, HeadError> {
    let mut declared = None;
    for (_, value) in headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
    {
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HeadError::InvalidContentLength);
        }
        let n: usize = value.parse().map_err(|_| HeadError::InvalidContentLength)?;
        if declared.is_some_and(|d| d != n) {
            return Err(HeadError::InvalidContentLength);
        }
        declared = Some(n);
    }
    Ok(declared.unwrap_or(0))
}

/// Body of the current request, read lazily from the connection.
///
/// Yields at most the declared `Content-Length` bytes: first whatever
/// arrived with the head, then straight from the socket. Dropping it leaves
/// the rest unread.
pub struct BodyReader<'c> {
    buffered: &'c mut BytesMut,
    stream: &'c mut dyn Read,
    remaining: usize,
}

impl<'c> BodyReader<'c> {
    pub fn new(buffered: &'c mut BytesMut, stream: &'c mut dyn Read, declared: usize) -> Self {
        Self {
            buffered,
            stream,
            remaining: declared,
        }
    }

    /// Declared bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Read for BodyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining);
        let n = if self.buffered.is_empty() {
            self.stream.read(&mut buf[..want])?
        } else {
            let n = want.min(self.buffered.len());
            buf[..n].copy_from_slice(&self.buffered[..n]);
            self.buffered.advance(n);
            n
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the declared body was received",
            ));
        }
        self.remaining -= n;
        Ok(n)
    }
}

/// Serves requests accepted by [`HttpServer`].
///
/// Each connection gets its own clone.
pub trait HttpService {
    /// Serve one request. `body` is bounded by the declared length.
    fn call(&mut self, head: &RequestHead, body: &mut BodyReader<'_>) -> ResponseWriter;

    /// Answer a request whose head was refused. The connection is closed
    /// afterwards.
    fn reject(&mut self, error: &HeadError) -> ResponseWriter;
}

/// HTTP/1.1 server running `T` on `may` coroutines.
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address; the real port when started on port `0`.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` error if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if StdTcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the accept coroutine and wait for it to exit. Connections
    /// already open finish on their own.
    #[allow(unsafe_code)]
    pub fn stop(self) {
        // SAFETY: cancel() is unsafe in may because a cancelled coroutine
        // unwinds at its next yield point; the accept loop owns only the
        // listener and a service clone, and we join right after.
        unsafe {
            self.handle.coroutine().cancel();
        }
        if self.handle.join().is_err() {
            debug!(addr = %self.addr, "Accept coroutine exited by cancellation");
        }
    }

    /// Block until the server coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + 'static> HttpServer<T> {
    /// Bind `addr` and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the accept
    /// coroutine cannot be spawned.
    #[allow(unsafe_code)]
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        let service = self.0;
        // SAFETY: Builder::spawn is unsafe in may; the closure owns the
        // listener and the service, so nothing it touches can dangle.
        let handle = unsafe {
            coroutine::Builder::new()
                .name("gebeta-accept".to_owned())
                .spawn(move || accept_loop(&listener, &service))
        }?;
        info!(addr = %addr, max_headers = MAX_HEADERS, "HTTP server listening");
        Ok(ServerHandle { addr, handle })
    }
}

#[allow(unsafe_code)]
fn accept_loop<T: HttpService + Clone + Send + 'static>(listener: &TcpListener, service: &T) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        let service = service.clone();
        // SAFETY: as in `HttpServer::start`; the coroutine owns its stream
        // and service clone.
        let spawned = unsafe { coroutine::Builder::new().spawn(move || serve_connection(stream, service)) };
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn connection coroutine");
        }
    }
}

enum Disposition {
    KeepAlive,
    Close,
}

fn serve_connection<T: HttpService>(mut stream: TcpStream, mut service: T) {
    let peer = stream.peer_addr().ok();
    let mut buf = BytesMut::with_capacity(BUF_LEN);
    let mut out = BytesMut::with_capacity(BUF_LEN);
    loop {
        match next_exchange(&mut stream, &mut buf, &mut out, &mut service) {
            Ok(Disposition::KeepAlive) => {}
            Ok(Disposition::Close) => {
                linger_close(&mut stream);
                return;
            }
            Err(e) => {
                debug!(peer = ?peer, error = %e, "Connection ended");
                stream.shutdown(Shutdown::Both).ok();
                return;
            }
        }
    }
}

fn next_exchange<T: HttpService>(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    out: &mut BytesMut,
    service: &mut T,
) -> io::Result<Disposition> {
    let head = loop {
        match parse_head(buf) {
            Ok(Some((head, consumed))) => {
                buf.advance(consumed);
                break head;
            }
            Ok(None) => {
                if read_more(stream, buf)? == 0 {
                    return Ok(Disposition::Close);
                }
            }
            Err(err) => {
                warn!(error = %err, status = err.status().as_u16(), "Request head refused");
                let res = service.reject(&err);
                send(stream, out, &res, true)?;
                return Ok(Disposition::Close);
            }
        }
    };

    let mut body = BodyReader::new(buf, stream, head.content_length);
    let res = service.call(&head, &mut body);
    let unread = body.remaining();
    if unread > 0 {
        debug!(
            method = %head.method,
            target = %head.target,
            unread_bytes = unread,
            "Request body left unread - closing connection"
        );
    }
    let close = unread > 0 || head.wants_close();
    send(stream, out, &res, close)?;
    Ok(if close {
        Disposition::Close
    } else {
        Disposition::KeepAlive
    })
}

fn read_more(stream: &mut impl Read, buf: &mut BytesMut) -> io::Result<usize> {
    let mut chunk = [0u8; READ_CHUNK];
    let n = stream.read(&mut chunk)?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

fn send(stream: &mut impl Write, out: &mut BytesMut, res: &ResponseWriter, close: bool) -> io::Result<()> {
    out.clear();
    res.write_to(out, close);
    stream.write_all(out)?;
    stream.flush()
}

/// Half-close, then discard what the client is still sending for a short
/// while before the socket is dropped.
fn linger_close(stream: &mut TcpStream) {
    if stream.shutdown(Shutdown::Write).is_err() {
        return;
    }
    if stream.set_read_timeout(Some(LINGER_TIMEOUT)).is_err() {
        return;
    }
    let deadline = Instant::now() + LINGER_TIMEOUT;
    let mut scratch = [0u8; READ_CHUNK];
    let mut discarded = 0;
    while discarded < LINGER_MAX_BYTES && Instant::now() < deadline {
        match stream.read(&mut scratch) {
            Ok(0) | Err(_) => break,
            Ok(n) => discarded += n,
        }
    }
}
