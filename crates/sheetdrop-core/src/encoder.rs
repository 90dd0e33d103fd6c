//! CSV encoding of a [`Table`]
//!
//! Quoting follows RFC 4180 with a configurable separator: a field is quoted
//! only when it contains the delimiter, a double quote or a line break, and
//! embedded quotes are doubled. Rows are written independently, so ragged
//! tables are fine. A row with no fields is written as `""` so that it still
//! occupies a line.

use crate::config::{ExportConfig, LineTerminator};
use crate::table::Table;
use crate::{Error, Result};
use std::io::Write;

/// Writes tables as delimited text
#[derive(Debug, Clone, Copy)]
pub struct CsvEncoder {
    delimiter: u8,
    terminator: LineTerminator,
}

impl CsvEncoder {
    pub fn new(delimiter: u8, terminator: LineTerminator) -> Self {
        Self {
            delimiter,
            terminator,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.delimiter, config.line_terminator)
    }

    /// Encode into a fresh buffer
    pub fn encode(&self, table: &Table) -> Result<Vec<u8>> {
        // rough guess: a dozen bytes per cell
        let cells: usize = table.rows().iter().map(|r| r.len().max(1)).sum();
        self.encode_into(table, Vec::with_capacity(cells * 12))
    }

    /// Encode into any writer, returning it once everything is flushed
    pub fn encode_into<W: Write>(&self, table: &Table, out: W) -> Result<W> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(self.terminator.to_csv())
            .quote_style(csv::QuoteStyle::Necessary)
            .double_quote(true)
            .flexible(true)
            .from_writer(out);

        for row in table.rows() {
            for field in row {
                writer.write_field(field.as_text().as_bytes())?;
            }
            writer.write_record(None::<&[u8]>)?;
        }

        writer.into_inner().map_err(|e| {
            let cause = e.error();
            Error::Io(std::io::Error::new(cause.kind(), cause.to_string()))
        })
    }
}
