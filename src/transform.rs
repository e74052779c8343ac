//! Declarative line transform for delimited master-data records.
//!
//! Each line is parsed as one CSV record (quotes honoured, so a quoted field
//! may contain the input delimiter) and the projected fields are written back
//! with the output delimiter, quoting any field that needs it.

use csv::{ByteRecord, QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use tracing::warn;

use crate::config::TransformConfig;
use crate::error::{PipeError, Result};
use crate::writer::LineTransform;

/// Parses a delimited record, projects columns and writes them back out.
#[derive(Debug)]
pub struct LineMapping {
    reader: ReaderBuilder,
    writer: WriterBuilder,
    columns: Option<Vec<usize>>,
    missing_value: String,
    skip_first_line: bool,
    drop_empty: bool,
    seen_first: bool,
    record: ByteRecord,
}

impl LineMapping {
    pub fn from_config(config: &TransformConfig) -> Result<Self> {
        let input = delimiter_byte("input_delimiter", &config.input_delimiter)?;
        let output = delimiter_byte("output_delimiter", &config.output_delimiter)?;

        // Lines arrive without their terminator; a stray \r inside is data.
        let mut reader = ReaderBuilder::new();
        reader
            .has_headers(false)
            .flexible(true)
            .delimiter(input)
            .terminator(Terminator::Any(b'\n'));

        let mut writer = WriterBuilder::new();
        writer
            .has_headers(false)
            .flexible(true)
            .delimiter(output)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'));

        Ok(Self {
            reader,
            writer,
            columns: config.columns.clone(),
            missing_value: config.missing_value.clone(),
            skip_first_line: config.skip_first_line,
            drop_empty: config.drop_empty,
            seen_first: false,
            record: ByteRecord::new(),
        })
    }

    /// Map one line; `None` drops it.
    pub fn map(&mut self, line: &str) -> Option<String> {
        let first = !self.seen_first;
        self.seen_first = true;
        if first && self.skip_first_line {
            return None;
        }

        let line = line.strip_suffix('\r').unwrap_or(line);
        match self.map_record(line) {
            Ok(mapped) => mapped,
            Err(err) => {
                warn!(error = %err, "Dropping line that could not be mapped");
                None
            }
        }
    }

    fn map_record(&mut self, line: &str) -> csv::Result<Option<String>> {
        let mut reader = self.reader.from_reader(line.as_bytes());
        if !reader.read_byte_record(&mut self.record)? {
            // Empty line
            self.record.clear();
        }

        let projected: Vec<&[u8]> = match &self.columns {
            Some(columns) => columns
                .iter()
                .map(|&i| self.record.get(i).unwrap_or(self.missing_value.as_bytes()))
                .collect(),
            None => self.record.iter().collect(),
        };

        let blank = projected
            .iter()
            .all(|field| field.iter().all(u8::is_ascii_whitespace));
        if self.drop_empty && blank {
            return Ok(None);
        }
        // csv writes a lone empty field as `""`; keep it an empty line.
        if projected.len() <= 1 && projected.iter().all(|field| field.is_empty()) {
            return Ok(Some(String::new()));
        }

        let mut writer = self.writer.from_writer(Vec::with_capacity(line.len() + 8));
        writer.write_record(&projected)?;
        let mut out = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        if out.last() == Some(&b'\n') {
            out.pop();
        }
        Ok(Some(String::from_utf8_lossy(&out).into_owned()))
    }
}

/// The single byte a CSV delimiter must be.
pub fn delimiter_byte(field: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(PipeError::invalid_config(format!(
            "transform.{} must be a single ASCII character, got '{}'",
            field, value
        ))),
    }
}

impl LineTransform for LineMapping {
    fn apply(&mut self, line: &str) -> Option<String> {
        self.map(line)
    }
}
