//! Plain HTTP 1.1 over std sockets.
//!
//! One connection carries one request; every response closes the connection.
//! The accept loop polls a nonblocking listener so it can notice the
//! shutdown flag between connections, and hands each accepted socket to a
//! short-lived named worker thread.

use std::{
    error::Error,
    fmt,
    io::{self, BufRead, BufReader, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{Arc, atomic::Ordering},
    thread,
    time::Duration,
};

use uuid::Uuid;

use vantage_render::TileImage;

use crate::{
    ServerContext,
    route::{Method, Request, Response, Router},
};

/// Upper bound on a declared request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Per-connection socket timeout.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Errors
// ============================================================================

/// Failure to get a routable request off the socket.
#[derive(Debug)]
pub enum HttpError {
    /// Request line or header syntax we cannot make sense of.
    MalformedRequest(String),
    /// A method token the route table has no use for.
    UnsupportedMethod(String),
    /// Declared `Content-Length` above [`MAX_BODY_BYTES`].
    BodyTooLarge(usize),
    /// Socket error while reading.
    Io(io::Error),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest(line) => write!(f, "malformed request: {:?}", line),
            Self::UnsupportedMethod(method) => write!(f, "unsupported method: {}", method),
            Self::BodyTooLarge(length) => write!(
                f,
                "declared body of {} bytes exceeds the {} byte limit",
                length, MAX_BODY_BYTES
            ),
            Self::Io(err) => write!(f, "socket read failed: {}", err),
        }
    }
}

impl Error for HttpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

// ============================================================================
// Request parsing
// ============================================================================

/// Reads one request: request line, headers, then `Content-Length` bytes of
/// body. Query strings are stripped from the path; headers other than
/// `Content-Length` are ignored.
pub fn parse_request(reader: &mut impl BufRead) -> Result<Request, HttpError> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let (Some(method_token), Some(target)) = (parts.next(), parts.next()) else {
        return Err(HttpError::MalformedRequest(line.trim().to_string()));
    };
    let method = Method::parse(method_token)
        .ok_or_else(|| HttpError::UnsupportedMethod(method_token.to_string()))?;
    let path = match target.split_once('?') {
        Some((path, _query)) => path.to_string(),
        None => target.to_string(),
    };

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| HttpError::MalformedRequest(header.to_string()))?;
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge(content_length));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;
    Ok(Request { method, path, body })
}

/// The response a parse failure maps to.
pub fn parse_error_response(err: &HttpError) -> Response {
    match err {
        HttpError::UnsupportedMethod(method) => {
            Response::text(404, format!("no route for method {}", method))
        }
        HttpError::BodyTooLarge(_) => Response::text(413, err.to_string()),
        _ => Response::text(400, format!("bad request: {}", err)),
    }
}

// ============================================================================
// Response writing
// ============================================================================

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "",
    }
}

pub fn write_response(writer: &mut impl Write, response: &Response) -> io::Result<()> {
    write!(
        writer,
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason_phrase(response.status)
    )?;
    if let Some(content_type) = &response.content_type {
        write!(writer, "Content-Type: {}\r\n", content_type)?;
    }
    write!(writer, "Content-Length: {}\r\n", response.body.len())?;
    write!(writer, "Connection: close\r\n\r\n")?;
    writer.write_all(&response.body)?;
    writer.flush()
}

// ============================================================================
// Multipart encoding
// ============================================================================

/// Packs composed tile images into one multipart/form-data body.
///
/// Part `i` is named `renderTexture{i}` with a `.png` filename, but carries
/// the raw RGB24 texel data with scanlines ordered bottom-up; clients that
/// speak this protocol flip the rows once and then slice the grid top-down,
/// decoding by the dimensions they configured rather than by the label. An
/// empty slice produces a body with zero parts. Returns the content type
/// (which carries the fresh boundary) and the body.
pub fn multipart_tiles(tiles: &[TileImage]) -> (String, Vec<u8>) {
    let boundary = Uuid::new_v4().to_string();
    let content_type = format!("multipart/form-data;boundary=\"{}\"", boundary);
    let mut body = Vec::new();
    for (index, image) in tiles.iter().enumerate() {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"renderTexture{}\"; filename=\"renderTexture{}.png\"\r\n",
                index, index
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        // The composed image is top-down in memory; the wire wants the
        // bottom scanline first.
        let row_bytes = image.width() as usize * TileImage::BYTES_PER_PIXEL;
        if row_bytes > 0 {
            for scanline in image.pixels().rchunks_exact(row_bytes) {
                body.extend_from_slice(scanline);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (content_type, body)
}

// ============================================================================
// Accept loop
// ============================================================================

/// Serves requests until the context's shutdown flag is set.
///
/// The listener is switched to nonblocking so the loop can poll the flag;
/// each accepted connection runs on its own named thread. Returns after all
/// live workers have been joined.
pub fn serve(listener: TcpListener, ctx: Arc<ServerContext>, router: Arc<Router>) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "control plane listening");

    let mut workers: Vec<thread::JoinHandle<()>> = Vec::new();
    let mut next_worker = 0usize;
    while !ctx.shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = Arc::clone(&ctx);
                let router = Arc::clone(&router);
                let worker = thread::Builder::new()
                    .name(format!("vantage-http-{}", next_worker))
                    .spawn(move || handle_connection(stream, peer, &router, &ctx))
                    .expect("failed to spawn connection thread");
                next_worker += 1;
                workers.push(worker);
                workers.retain(|worker| !worker.is_finished());
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(err) => return Err(err),
        }
    }

    for worker in workers {
        let _ = worker.join();
    }
    tracing::info!("control plane stopped");
    Ok(())
}

fn handle_connection(stream: TcpStream, peer: SocketAddr, router: &Router, ctx: &ServerContext) {
    // Accepted sockets inherit the listener's nonblocking flag on some
    // platforms; connection handling wants plain blocking reads.
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(SOCKET_TIMEOUT));
    let _ = stream.set_write_timeout(Some(SOCKET_TIMEOUT));

    let mut reader = BufReader::new(&stream);
    let response = match parse_request(&mut reader) {
        Ok(request) => {
            tracing::debug!(method = %request.method, path = %request.path, %peer, "request");
            router.dispatch(ctx, &request)
        }
        Err(err) => {
            tracing::debug!(%peer, error = %err, "unroutable request");
            parse_error_response(&err)
        }
    };

    let mut writer = &stream;
    if let Err(err) = write_response(&mut writer, &response) {
        tracing::debug!(%peer, error = %err, "response write failed");
    }
    let _ = stream.shutdown(Shutdown::Both);
}

// ============================================================================
// Tests
// ============================================================================
