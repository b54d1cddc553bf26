//! Outgoing HTTP request model.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use url::{Url, form_urlencoded};

use super::{Headers, Method};

/// Errors that can occur while building a [`Request`] from a URL.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("URL has no host: {url}")]
    MissingHost { url: String },

    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },
}

/// An HTTP request as seen by the client pipeline.
///
/// Query parameters are kept as an ordered list of pairs: the cache key is
/// derived from them in the order they were added.
///
/// # Examples
///
/// ```
/// use semcache::http::{Method, Request};
///
/// let request = Request::from_url(Method::Get, "http://localhost:8080/search?q=rust&page=2")
///     .unwrap()
///     .header("Accept-Encoding", "gzip");
///
/// assert_eq!(request.host(), "localhost");
/// assert_eq!(request.port(), 8080);
/// assert_eq!(request.path(), "/search");
/// assert_eq!(request.query_string(), "q=rust&page=2");
/// assert_eq!(request.headers().get("accept-encoding"), Some("gzip"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    host: String,
    port: u16,
    path: String,
    query: Vec<(String, String)>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Creates a request with no query parameters, headers, or body.
    pub fn new(method: Method, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            port,
            path: path.into(),
            query: Vec::new(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self::new(Method::Get, host, port, path)
    }

    /// Builds a request from an absolute `http` or `https` URL.
    ///
    /// # Errors
    ///
    /// - [`RequestError::InvalidUrl`]: the string is not a valid URL.
    /// - [`RequestError::UnsupportedScheme`]: the scheme is neither `http` nor `https`.
    /// - [`RequestError::MissingHost`]: the URL has no host component.
    pub fn from_url(method: Method, url: &str) -> Result<Self, RequestError> {
        let parsed = Url::parse(url)?;

        let default_port = match parsed.scheme() {
            "http" => 80,
            "https" => 443,
            other => {
                return Err(RequestError::UnsupportedScheme {
                    scheme: other.to_owned(),
                });
            }
        };

        let host = parsed.host_str().ok_or_else(|| RequestError::MissingHost {
            url: url.to_owned(),
        })?;

        let mut request = Self::new(
            method,
            host,
            parsed.port().unwrap_or(default_port),
            parsed.path(),
        );
        request.query = parsed.query_pairs().into_owned().collect();
        Ok(request)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body from raw bytes.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the target port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query parameters in insertion order.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the query parameters as `key=value` pairs joined by `&`, unencoded,
    /// in insertion order.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request headers for in-place modification.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the request body bytes.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns the origin-form request target (`/path?query`), percent-encoded.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, encoded)
    }

    /// Serializes the request into HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Host` if the caller did not set one.
    /// - `Content-Length` when the body is non-empty.
    /// - `Connection: close`, since the bundled transport uses one connection per request.
    pub fn to_bytes(&self) -> BytesMut {
        let estimated_size = 128 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("{} {} HTTP/1.1\r\n", self.method, self.target()).as_bytes());

        if !self.headers.contains("host") {
            buf.put(format!("Host: {}:{}\r\n", self.host, self.port).as_bytes());
        }
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        if !self.body.is_empty() {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.put(&b"Connection: close\r\n\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_url_defaults_port_by_scheme() {
        let req = Request::from_url(Method::Get, "https://example.com/a").unwrap();
        assert_eq!(req.port(), 443);
        let req = Request::from_url(Method::Get, "http://example.com/a").unwrap();
        assert_eq!(req.port(), 80);
    }

    #[test]
    fn from_url_rejects_other_schemes() {
        let err = Request::from_url(Method::Get, "ftp://example.com/file").unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedScheme { scheme } if scheme == "ftp"));
    }

    #[test]
    fn from_url_rejects_garbage() {
        assert!(matches!(
            Request::from_url(Method::Get, "not a url"),
            Err(RequestError::InvalidUrl(_))
        ));
    }

    #[test]
    fn query_keeps_insertion_order() {
        let req = Request::get("localhost", 80, "/")
            .query("b", "2")
            .query("a", "1")
            .query("b", "3");
        assert_eq!(req.query_string(), "b=2&a=1&b=3");
    }

    #[test]
    fn wire_format() {
        let req = Request::get("localhost", 8080, "/search")
            .query("q", "rust lang")
            .header("If-None-Match", "\"v1\"");
        let raw = String::from_utf8(req.to_bytes().to_vec()).unwrap();
        assert!(raw.starts_with("GET /search?q=rust+lang HTTP/1.1\r\n"));
        assert!(raw.contains("Host: localhost:8080\r\n"));
        assert!(raw.contains("If-None-Match: \"v1\"\r\n"));
        assert!(raw.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn wire_format_with_body() {
        let req = Request::new(Method::Post, "localhost", 80, "/submit").body("hello");
        let raw = String::from_utf8(req.to_bytes().to_vec()).unwrap();
        assert!(raw.contains("Content-Length: 5\r\n"));
        assert!(raw.ends_with("\r\n\r\nhello"));
    }
}
