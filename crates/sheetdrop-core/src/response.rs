//! Outgoing response
//!
//! Status codes are the `http` crate's, so the hyper host passes them through
//! unchanged. Headers are an inline list: an export carries four at most.

use crate::Error;
use bytes::Bytes;
use smallvec::SmallVec;

pub use http::StatusCode;

/// Response headers, in insertion order
pub type Headers = SmallVec<[(String, String); 8]>;

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            body: Bytes::new(),
        }
    }

    /// `text/plain` response; every non-CSV outcome uses this shape
    pub fn plain(status: StatusCode, message: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(status)
            .header("content-type", "text/plain")
            .body(message)
            .build()
    }

    pub fn not_found() -> Self {
        Self::plain(StatusCode::NOT_FOUND, "Not Found")
    }

    /// 405 listing the methods the path does accept
    pub fn method_not_allowed(allow: &str) -> Self {
        let mut res = Self::plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        res.headers.push(("allow".to_string(), allow.to_string()));
        res
    }

    /// Error response. Server-side failures never leak their detail.
    pub fn from_error(err: &Error) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            return Self::plain(status, "Internal Server Error");
        }
        Self::plain(status, err.to_string())
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_string(&self) -> Option<String> {
        std::str::from_utf8(&self.body).ok().map(str::to_string)
    }
}

/// Builder for responses with a body and several headers
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}
