//! CSV rendering for GET /export.

use std::borrow::Cow;

use serde_json::Value;

use crate::engine::Document;
use crate::error::Result;
use crate::normalize::normalize_document;

pub const CONTENT_TYPE: &str = "text/csv;charset=utf-8";
pub const CONTENT_DISPOSITION: &str = "attachment; filename=export.csv";

/// Writes documents as CSV rows in a fixed column order.
///
/// The column order is the engine's configured field list. A document missing
/// a column gets an empty cell; columns the list does not name are ignored.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    fields: Vec<String>,
}

impl CsvExporter {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// The header line, newline included.
    pub fn header(&self) -> String {
        let mut line = self
            .fields
            .iter()
            .map(|field| escape_csv(field))
            .collect::<Vec<_>>()
            .join(",");
        line.push('\n');
        line
    }

    /// One already-normalized document as a CSV line, newline included.
    pub fn row(&self, doc: &Document) -> String {
        let mut line = self
            .fields
            .iter()
            .map(|field| match doc.get(field) {
                Some(Value::String(s)) => escape_csv(s).into_owned(),
                Some(Value::Null) | None => String::new(),
                Some(other) => escape_csv(&other.to_string()).into_owned(),
            })
            .collect::<Vec<_>>()
            .join(",");
        line.push('\n');
        line
    }

    /// Header followed by one line per document, normalizing each document as it goes.
    ///
    /// Documents are processed lazily so a response body can stream them.
    pub fn lines(
        self,
        docs: Vec<Document>,
    ) -> impl Iterator<Item = Result<String>> + Send + 'static {
        let header = self.header();
        std::iter::once(Ok(header)).chain(
            docs.into_iter()
                .map(move |doc| normalize_document(doc).map(|doc| self.row(&doc))),
        )
    }

    /// Write every line to `out`. Stops at the first failure, whether normalizing or writing.
    #[cfg(test)]
    fn write_to<W: std::io::Write>(self, docs: Vec<Document>, out: &mut W) -> Result<()> {
        for line in self.lines(docs) {
            out.write_all(line?.as_bytes())?;
        }
        Ok(())
    }
}

/// Quote a value when it holds a quote, comma, or line break; inner quotes are doubled.
pub fn escape_csv(value: &str) -> Cow<'_, str> {
    if value.contains(['"', ',', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
