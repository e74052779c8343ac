//! Placeholder templates for part names and headers.
//!
//! Recognised placeholders: `{filename}`, `{part}`, `{source}`,
//! `{timestamp}` (UTC `YYYYMMDDHHMMSS`) and `{run_id}`. Anything else is left
//! untouched.

use std::borrow::Cow;
use std::path::Path;

use time::OffsetDateTime;
use uuid::Uuid;

/// Values shared by every part of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub filename: String,
    pub source: String,
    pub timestamp: String,
    pub run_id: String,
}

impl TemplateContext {
    /// Context for a run starting now, with a fresh run id.
    pub fn new(source: &str) -> Self {
        Self::at(source, OffsetDateTime::now_utc(), Uuid::new_v4().simple().to_string())
    }

    pub fn at(source: &str, started: OffsetDateTime, run_id: String) -> Self {
        Self {
            filename: String::new(),
            source: source_label(source).into_owned(),
            timestamp: format_timestamp(started),
            run_id,
        }
    }

    /// Same run, scoped to one destination's base filename.
    pub fn for_filename(&self, filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            ..self.clone()
        }
    }

    pub fn render(&self, template: &str, part: u32) -> String {
        template
            .replace("{filename}", &self.filename)
            .replace("{part}", &part.to_string())
            .replace("{source}", &self.source)
            .replace("{timestamp}", &self.timestamp)
            .replace("{run_id}", &self.run_id)
    }
}

/// `YYYYMMDDHHMMSS` in UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// File stem of the input, safe to embed in a key.
fn source_label(source: &str) -> Cow<'_, str> {
    const INVALID: [char; 10] = ['/', '\\', ' ', ':', '*', '?', '"', '<', '>', '|'];

    if source.is_empty() || source == "-" {
        return Cow::Borrowed("stdin");
    }

    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source);

    if stem.chars().any(|c| INVALID.contains(&c)) {
        Cow::Owned(
            stem.chars()
                .map(|c| if INVALID.contains(&c) { '_' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(stem)
    }
}
