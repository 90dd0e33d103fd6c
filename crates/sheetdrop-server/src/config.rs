//! Server configuration
//!
//! Read from `SHEETDROP_*` environment variables. Parsing goes through
//! [`ServerConfig::from_kv`] so any key/value source works.

use sheetdrop_core::config::{normalize_filename, parse_delimiter};
use sheetdrop_core::{BodyLimitConfig, Error, ExportConfig, LineTerminator, Result};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const ENV_BIND_ADDR: &str = "SHEETDROP_BIND_ADDR";
pub const ENV_WORKERS: &str = "SHEETDROP_WORKERS";
pub const ENV_EXPORT_PATH: &str = "SHEETDROP_EXPORT_PATH";
pub const ENV_MAX_BODY: &str = "SHEETDROP_MAX_BODY";
pub const ENV_FILENAME: &str = "SHEETDROP_FILENAME";
pub const ENV_DELIMITER: &str = "SHEETDROP_DELIMITER";
pub const ENV_LINE_TERMINATOR: &str = "SHEETDROP_LINE_TERMINATOR";
pub const ENV_ALLOW_OVERRIDES: &str = "SHEETDROP_ALLOW_OVERRIDES";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub workers: usize,
    /// Path accepting `POST` exports
    pub export_path: String,
    pub body_limit: BodyLimitConfig,
    pub export: ExportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            workers: num_cpus::get(),
            export_path: "/export".to_string(),
            body_limit: BodyLimitConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_kv(&vars)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup(kv, ENV_BIND_ADDR) {
            config.bind_addr = addr
                .parse()
                .map_err(|_| invalid(ENV_BIND_ADDR, "expected host:port"))?;
        }

        if let Some(workers) = lookup(kv, ENV_WORKERS) {
            config.workers = match workers.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid(ENV_WORKERS, "expected a positive integer")),
            };
        }

        if let Some(path) = lookup(kv, ENV_EXPORT_PATH) {
            if !path.starts_with('/') || path.contains(char::is_whitespace) {
                return Err(invalid(ENV_EXPORT_PATH, "expected an absolute path"));
            }
            config.export_path = path.to_string();
        }

        if let Some(size) = lookup(kv, ENV_MAX_BODY) {
            config.body_limit = BodyLimitConfig::parse(size)
                .ok_or_else(|| invalid(ENV_MAX_BODY, "expected a size such as 512kb or 2mb"))?;
        }

        if let Some(name) = lookup(kv, ENV_FILENAME) {
            config.export.filename =
                normalize_filename(name).map_err(|e| invalid(ENV_FILENAME, &e.to_string()))?;
        }

        if let Some(delim) = lookup(kv, ENV_DELIMITER) {
            config.export.delimiter =
                parse_delimiter(delim).map_err(|e| invalid(ENV_DELIMITER, &e.to_string()))?;
        }

        if let Some(term) = lookup(kv, ENV_LINE_TERMINATOR) {
            config.export.line_terminator = LineTerminator::parse(term)
                .ok_or_else(|| invalid(ENV_LINE_TERMINATOR, "expected lf or crlf"))?;
        }

        if let Some(flag) = lookup(kv, ENV_ALLOW_OVERRIDES) {
            config.export.allow_overrides = parse_bool(flag)
                .ok_or_else(|| invalid(ENV_ALLOW_OVERRIDES, "expected true or false"))?;
        }

        config
            .export
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }
}

// Delimiters may legitimately be whitespace (tab), so only fully blank values
// count as unset and the value itself is not trimmed.
fn lookup<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key)
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(|v| if key == ENV_DELIMITER { v } else { v.trim() })
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::Config(format!("{} {}", key, reason))
}
