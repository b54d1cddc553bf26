//! Plain-TCP HTTP/1.1 transport.
//!
//! One connection per request (`Connection: close`). The response body is
//! framed by `Content-Length`, by chunked transfer coding, or by the server
//! closing the connection. TLS is out of scope; `https` origins need a
//! different [`Transport`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Transport, TransportError, TransportFuture};
use crate::http::{Headers, Method, Request, Response, ResponseError, StatusCode};

/// Default cap on a buffered response (8 MiB).
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Maximum number of trailer fields after a chunked body.
const MAX_TRAILERS: usize = 32;

/// Sends each request over a fresh TCP connection.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use semcache::http::Request;
/// use semcache::transport::{TcpTransport, Transport};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = TcpTransport::new().with_timeout(Duration::from_secs(5));
///     let response = transport.send(Request::get("127.0.0.1", 8080, "/")).await?;
///     println!("{}", response.status());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    max_response_size: usize,
    timeout: Option<Duration>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            max_response_size: MAX_RESPONSE_SIZE,
            timeout: None,
        }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects responses larger than `limit` bytes, head included.
    #[must_use]
    pub fn with_max_response_size(mut self, limit: usize) -> Self {
        self.max_response_size = limit;
        self
    }

    /// Bounds the whole exchange, connect included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Transport for TcpTransport {
    fn send(&self, request: Request) -> TransportFuture {
        let limit = self.max_response_size;
        let timeout = self.timeout;

        Box::pin(async move {
            match timeout {
                Some(duration) => tokio::time::timeout(duration, exchange(request, limit))
                    .await
                    .map_err(|_| TransportError::Timeout(duration))?,
                None => exchange(request, limit).await,
            }
        })
    }
}

async fn exchange(request: Request, limit: usize) -> Result<Response, TransportError> {
    let addr = format!("{}:{}", request.host(), request.port());
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;

    stream.write_all(&request.to_bytes()).await?;
    stream.flush().await?;
    debug!(addr = %addr, method = %request.method(), path = %request.path(), "request sent");

    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    // Head first.
    let (response, offset) = loop {
        let eof = read_more(&mut stream, &mut buf, limit).await?;
        match Response::parse(&buf) {
            Ok(parsed) => break parsed,
            Err(ResponseError::Incomplete) if !eof => continue,
            Err(ResponseError::Incomplete) => return Err(TransportError::Incomplete),
            Err(e) => return Err(e.into()),
        }
    };

    let response = match framing(&request, &response) {
        Framing::Empty => response,
        Framing::Length(length) => {
            let needed = offset
                .checked_add(length)
                .filter(|needed| *needed <= limit)
                .ok_or(TransportError::ResponseTooLarge { limit })?;
            while buf.len() < needed {
                if read_more(&mut stream, &mut buf, limit).await? {
                    return Err(TransportError::Incomplete);
                }
            }
            let body = buf.split_off(offset).split_to(length).freeze();
            response.body(body)
        }
        Framing::Chunked => loop {
            if let Some((body, trailers)) = decode_chunked(&buf[offset..])? {
                let mut response = response.body(body);
                for (name, value) in trailers.iter() {
                    response = response.trailer(name, value);
                }
                break response;
            }
            if read_more(&mut stream, &mut buf, limit).await? {
                return Err(TransportError::Incomplete);
            }
        },
        Framing::UntilClose => {
            while !read_more(&mut stream, &mut buf, limit).await? {}
            response.body(buf.split_off(offset).freeze())
        }
    };

    debug!(
        addr = %addr,
        status = %response.status(),
        bytes = response.body_bytes().len(),
        "response received"
    );
    Ok(response)
}

/// Reads once into `buf`. Returns `true` at end of stream.
async fn read_more(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    limit: usize,
) -> Result<bool, TransportError> {
    let read = stream.read_buf(buf).await?;
    if buf.len() > limit {
        return Err(TransportError::ResponseTooLarge { limit });
    }
    Ok(read == 0)
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

fn framing(request: &Request, response: &Response) -> Framing {
    let status = response.status();
    let bodiless = status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    if bodiless || *request.method() == Method::Head {
        return Framing::Empty;
    }

    let chunked = response
        .headers()
        .tokens("transfer-encoding")
        .any(|coding| coding.eq_ignore_ascii_case("chunked"));
    if chunked {
        return Framing::Chunked;
    }

    match response
        .headers()
        .get("content-length")
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        Some(length) => Framing::Length(length),
        None => Framing::UntilClose,
    }
}

/// Decodes a complete chunked body and its trailer section.
///
/// Returns `Ok(None)` while more data is needed.
fn decode_chunked(mut data: &[u8]) -> Result<Option<(Bytes, Headers)>, TransportError> {
    let mut body = BytesMut::new();

    loop {
        let (consumed, size) = match httparse::parse_chunk_size(data) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(_) => return Err(ResponseError::InvalidChunkSize.into()),
        };
        data = &data[consumed..];
        if size == 0 {
            break;
        }

        let size = usize::try_from(size).map_err(|_| ResponseError::InvalidChunkSize)?;
        // Chunk data plus its trailing CRLF.
        let end = size.checked_add(2).ok_or(ResponseError::InvalidChunkSize)?;
        if data.len() < end {
            return Ok(None);
        }
        body.extend_from_slice(&data[..size]);
        data = &data[end..];
    }

    let mut fields = [httparse::EMPTY_HEADER; MAX_TRAILERS];
    match httparse::parse_headers(data, &mut fields).map_err(ResponseError::from)? {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete((_, fields)) => {
            let trailers = fields
                .iter()
                .filter_map(|field| {
                    std::str::from_utf8(field.value)
                        .ok()
                        .map(|value| (field.name, value))
                })
                .collect();
            Ok(Some((body.freeze(), trailers)))
        }
    }
}
