//! sheetdrop-core: JSON to CSV download conversion
//!
//! Turns a JSON array of rows into a CSV attachment. The HTTP types here are
//! transport-agnostic; `sheetdrop-server` hosts them on hyper.
//!
//! ## Modules
//! - `table` - decoded payload as rows of tagged fields
//! - `encoder` - CSV writer over the `csv` crate
//! - `config` - export options (filename, delimiter, line terminator)
//! - `handlers` - export and health handlers
//! - `limit` - request body size limit
//! - `middleware` - request ID

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod encoder;
pub mod error;
pub mod handlers;
pub mod limit;
pub mod middleware;
pub mod request;
pub mod response;
pub mod table;

// Re-exports
pub use config::{ExportConfig, LineTerminator};
pub use encoder::CsvEncoder;
pub use error::{Error, Result};
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};
pub use table::{Field, Row, Table};

// Middleware re-exports
pub use middleware::{Middleware, MiddlewareChain};

// Handlers re-exports
pub use handlers::{CsvExport, Health, HealthStatus, CSV_CONTENT_TYPE};
pub use limit::{BodyLimit, BodyLimitConfig};
