//! CSV export options

use crate::{Error, Result};
use std::collections::HashMap;

/// Default attachment name
pub const DEFAULT_FILENAME: &str = "data.csv";

/// Default field separator
pub const DEFAULT_DELIMITER: u8 = b';';

/// Record terminator written after every row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

impl LineTerminator {
    /// Parse `lf` / `crlf` (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" | "\\n" => Some(LineTerminator::Lf),
            "crlf" | "\\r\\n" => Some(LineTerminator::CrLf),
            _ => None,
        }
    }

    pub(crate) fn to_csv(self) -> csv::Terminator {
        match self {
            LineTerminator::Lf => csv::Terminator::Any(b'\n'),
            LineTerminator::CrLf => csv::Terminator::CRLF,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Attachment filename sent in Content-Disposition
    pub filename: String,
    /// Field separator
    pub delimiter: u8,
    /// Row terminator
    pub line_terminator: LineTerminator,
    /// Honour `filename` / `delimiter` query parameters
    pub allow_overrides: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filename: DEFAULT_FILENAME.to_string(),
            delimiter: DEFAULT_DELIMITER,
            line_terminator: LineTerminator::Lf,
            allow_overrides: true,
        }
    }
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn line_terminator(mut self, terminator: LineTerminator) -> Self {
        self.line_terminator = terminator;
        self
    }

    pub fn allow_overrides(mut self, allow: bool) -> Self {
        self.allow_overrides = allow;
        self
    }

    /// Check filename and delimiter
    pub fn validate(&self) -> Result<()> {
        check_delimiter(self.delimiter)?;
        if normalize_filename(&self.filename)? != self.filename {
            return Err(Error::InvalidOption(format!(
                "filename {:?} must end in .csv",
                self.filename
            )));
        }
        Ok(())
    }

    /// Apply per-request query overrides. Unknown keys are ignored.
    pub fn with_overrides(&self, params: &HashMap<String, String>) -> Result<ExportConfig> {
        let mut config = self.clone();
        if !self.allow_overrides {
            if params.contains_key("filename") || params.contains_key("delimiter") {
                tracing::debug!("export overrides disabled, ignoring query parameters");
            }
            return Ok(config);
        }

        if let Some(name) = params.get("filename") {
            config.filename = normalize_filename(name)?;
        }
        if let Some(delim) = params.get("delimiter") {
            config.delimiter = parse_delimiter(delim)?;
        }
        Ok(config)
    }

    /// Content-Disposition header value. A non-ASCII name is sent as an
    /// RFC 6266 `filename*` parameter after an ASCII-only `filename`, so the
    /// header itself stays visible ASCII.
    pub fn content_disposition(&self) -> String {
        if self.filename.is_ascii() {
            return format!("attachment; filename=\"{}\"", self.filename);
        }

        let fallback: String = self
            .filename
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            percent_encode(&self.filename)
        )
    }
}

// RFC 5987 ext-value: attr-char passes through, every other byte is escaped
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Parse a delimiter option: a single ASCII character, or `tab`
pub fn parse_delimiter(s: &str) -> Result<u8> {
    if s.eq_ignore_ascii_case("tab") || s == "\\t" {
        return Ok(b'\t');
    }

    let bytes = s.as_bytes();
    if bytes.len() != 1 {
        return Err(Error::InvalidOption(format!(
            "delimiter must be a single ASCII character, got {:?}",
            s
        )));
    }
    check_delimiter(bytes[0])?;
    Ok(bytes[0])
}

fn check_delimiter(delimiter: u8) -> Result<()> {
    if !delimiter.is_ascii() || matches!(delimiter, b'"' | b'\r' | b'\n') {
        return Err(Error::InvalidOption(format!(
            "delimiter {:?} is not allowed",
            delimiter as char
        )));
    }
    Ok(())
}

/// Validate an attachment name, appending `.csv` when missing
pub fn normalize_filename(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidOption("filename must not be empty".to_string()));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, '"' | '\\' | '/') || c.is_control())
    {
        return Err(Error::InvalidOption(format!(
            "filename contains forbidden character {:?}",
            bad
        )));
    }

    if name.to_ascii_lowercase().ends_with(".csv") {
        Ok(name.to_string())
    } else {
        Ok(format!("{}.csv", name))
    }
}
