//! HTTP response model and HTTP/1.1 status-line/header parsing.
//!
//! A [`Response`] carries every field the cache snapshots: protocol version,
//! status, reason phrase, headers, trailers, cookies, redirect history and body.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, StatusCode, Version};

/// Errors that can occur while parsing an HTTP/1.1 response head.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid chunk size")]
    InvalidChunkSize,
}

/// An HTTP response received from a transport or replayed from the cache.
///
/// # Examples
///
/// ```
/// use semcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Cache-Control", "public, max-age=600")
///     .body("hello");
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.message(), "OK");
/// assert_eq!(response.text(), "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    version: Version,
    status: StatusCode,
    status_message: String,
    headers: Headers,
    trailers: Headers,
    cookies: Vec<String>,
    redirects: Vec<String>,
    body: Bytes,
}

impl Response {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 96;

    /// Creates a new HTTP/1.1 response with the canonical reason phrase and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status,
            status_message: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: Headers::new(),
            trailers: Headers::new(),
            cookies: Vec::new(),
            redirects: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Parses an HTTP/1.1 status line and header block from `buf`.
    ///
    /// Returns the response (with an empty body) and the byte offset at which
    /// the body begins. `Set-Cookie` values are also collected into
    /// [`cookies`](Self::cookies).
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`]: the header block has not fully arrived.
    /// - [`ResponseError::Parse`]: the data is malformed.
    /// - [`ResponseError::MissingField`]: the status line lacks a code or version.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw.code.ok_or(ResponseError::MissingField { field: "status" })?;
        let minor = raw
            .version
            .ok_or(ResponseError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        let mut cookies = Vec::new();
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                if header.name.eq_ignore_ascii_case("set-cookie") {
                    cookies.push(value.to_owned());
                }
                header_map.insert(header.name, value);
            }
        }

        let mut response = Self::new(StatusCode::from_u16(code));
        response.version = Version::from_minor(minor);
        response.status_message = raw.reason.unwrap_or_default().to_owned();
        response.headers = header_map;
        response.cookies = cookies;

        Ok((response, body_offset))
    }

    /// Sets the protocol version.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Overrides the reason phrase.
    #[must_use]
    pub fn status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a trailer field.
    #[must_use]
    pub fn trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.insert(name, value);
        self
    }

    /// Records a cookie set by this response.
    #[must_use]
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookies.push(cookie.into());
        self
    }

    /// Records a URL followed on the way to this response.
    #[must_use]
    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.redirects.push(url.into());
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Reassembles a response from previously captured parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        version: Version,
        status: StatusCode,
        status_message: String,
        headers: Headers,
        trailers: Headers,
        cookies: Vec<String>,
        redirects: Vec<String>,
        body: Bytes,
    ) -> Self {
        Self {
            version,
            status,
            status_message,
            headers,
            trailers,
            cookies,
            redirects,
            body,
        }
    }

    pub fn http_version(&self) -> Version {
        self.version
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase sent with the status line.
    pub fn message(&self) -> &str {
        &self.status_message
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the headers for in-place decoration (e.g. setting `Age`).
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn redirects(&self) -> &[String] {
        &self.redirects
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
