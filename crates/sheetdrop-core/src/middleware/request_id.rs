//! Request ID middleware
//!
//! Keeps a client supplied `x-request-id` or assigns one, and echoes it on the
//! response so a downloaded file can be matched to server logs.

use crate::{Request, Response};
use super::Middleware;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Header carrying the request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// Longer client IDs are replaced rather than trusted
const MAX_ID_LEN: usize = 128;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique ID: 8 hex chars of time-derived noise followed
/// by a monotonically increasing counter.
pub fn generate_request_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    // xorshift64 over the clock
    let mut seed = nanos | 1;
    seed ^= seed << 13;
    seed ^= seed >> 7;
    seed ^= seed << 17;

    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:08x}{:08x}", seed as u32, count)
}

fn acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Request ID middleware
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl Middleware for RequestId {
    fn before(&self, req: &mut Request) -> Option<Response> {
        if !req.header(REQUEST_ID_HEADER).is_some_and(acceptable) {
            req.set_header(REQUEST_ID_HEADER, generate_request_id());
        }
        None
    }

    fn after(&self, req: &Request, res: &mut Response) {
        if let Some(id) = req.header(REQUEST_ID_HEADER) {
            res.headers.push((REQUEST_ID_HEADER.to_string(), id.to_string()));
        }
    }
}
