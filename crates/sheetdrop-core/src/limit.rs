//! Request body size limit
//!
//! The bound is enforced once, by the host while it reads the body: a declared
//! `Content-Length` is checked before any bytes are buffered, and a streamed
//! body is cut off as soon as it passes the limit. Either way the host gets an
//! [`Error::BodyTooLarge`] and turns it into [`BodyLimit::rejection`].

use crate::{Error, Response, ResponseBuilder, Result, StatusCode};

/// Default payload bound (1 MiB)
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// Body limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimitConfig {
    /// Maximum body size in bytes
    pub max_size: usize,
}

impl Default for BodyLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY)
    }
}

impl BodyLimitConfig {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Parse size from string (e.g., "10mb", "1gb", "500kb")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();

        let (num_str, multiplier) = if let Some(n) = s.strip_suffix("gb") {
            (n, 1024 * 1024 * 1024)
        } else if let Some(n) = s.strip_suffix("mb") {
            (n, 1024 * 1024)
        } else if let Some(n) = s.strip_suffix("kb") {
            (n, 1024)
        } else if let Some(n) = s.strip_suffix('b') {
            (n, 1)
        } else {
            (s.as_str(), 1)
        };

        let num: usize = num_str.trim().parse().ok()?;
        let max_size = num.checked_mul(multiplier)?;
        (max_size > 0).then(|| Self::new(max_size))
    }
}

/// Format size for display
pub fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

/// Body limit policy shared by every connection
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyLimit {
    config: BodyLimitConfig,
}

impl BodyLimit {
    pub fn new(config: BodyLimitConfig) -> Self {
        Self { config }
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// Reject a declared `Content-Length` over the limit
    pub fn check_declared(&self, length: Option<usize>) -> Result<()> {
        match length {
            Some(length) if length > self.config.max_size => Err(Error::BodyTooLarge {
                limit: self.config.max_size,
                declared: Some(length),
            }),
            _ => Ok(()),
        }
    }

    /// Error for a body that ran past the limit while streaming
    pub fn exceeded(&self) -> Error {
        Error::BodyTooLarge {
            limit: self.config.max_size,
            declared: None,
        }
    }

    /// 413 response with a small JSON explanation
    pub fn rejection(&self, declared: Option<usize>) -> Response {
        let mut body = serde_json::json!({
            "error": "Request body too large",
            "max_size": format_size(self.config.max_size),
        });
        if let Some(size) = declared {
            body["received"] = serde_json::Value::String(format_size(size));
        }

        ResponseBuilder::new(StatusCode::PAYLOAD_TOO_LARGE)
            .header("content-type", "application/json")
            .body(body.to_string())
            .build()
    }
}
