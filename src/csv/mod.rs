//! Dictionary-row CSV reader.
//!
//! Each record is paired with the header row and yielded as a [`Row`].
//! Iteration ends at end of input or at the first record whose field count
//! differs from the header count.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::debug;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Where the records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Path(PathBuf),
    Text(String),
}

/// Reader configuration. Every call to [`rows`](Self::rows) starts over from
/// the beginning of the source.
///
/// ```
/// use reqkit::csv::DictReader;
///
/// let reader = DictReader::from_text("name,age\nflyer,26\ncompany,10\n");
/// let names: Vec<String> = reader
///     .rows()
///     .unwrap()
///     .map(|row| row.unwrap().get("name").unwrap().to_string())
///     .collect();
/// assert_eq!(names, ["flyer", "company"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictReader {
    source: Source,
    delimiter: char,
    headers: Vec<String>,
}

impl DictReader {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_source(Source::Path(path.into()))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::with_source(Source::Text(text.into()))
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            delimiter: ',',
            headers: Vec::new(),
        }
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Explicit header names. When empty, the first record is the header row.
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Opens the source and returns a fresh iterator over its rows.
    #[tracing::instrument(skip(self))]
    pub fn rows(&self) -> Result<Rows> {
        let reader: Box<dyn BufRead> = match &self.source {
            Source::Path(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open CSV file {:?}", path))?;
                Box::new(BufReader::new(file))
            }
            Source::Text(text) => Box::new(Cursor::new(text.clone().into_bytes())),
        };

        let mut records = Records {
            reader,
            delimiter: self.delimiter,
        };

        let headers = if self.headers.is_empty() {
            records
                .next_record()
                .context("Failed to read CSV header row")?
                .unwrap_or_default()
        } else {
            self.headers.clone()
        };
        debug!("CSV headers: {:?}", headers);

        Ok(Rows {
            records,
            headers,
            done: false,
        })
    }
}

/// Iterator over the rows of a [`DictReader`].
pub struct Rows {
    records: Records,
    headers: Vec<String>,
    done: bool,
}

impl Rows {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.headers.is_empty() {
            return None;
        }

        match self.records.next_record() {
            Ok(Some(fields)) if fields.len() == self.headers.len() => {
                Some(Ok(Row::new(&self.headers, fields)))
            }
            Ok(Some(fields)) => {
                debug!(
                    "Stopping at record with {} fields, expected {}",
                    fields.len(),
                    self.headers.len()
                );
                self.done = true;
                None
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err::<Row, _>(e).context("Failed to read CSV record"))
            }
        }
    }
}

/// One record keyed by header name, in header order. A repeated header name
/// keeps the last value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    fn new(headers: &[String], values: Vec<String>) -> Self {
        let mut row = Row::default();
        for (name, value) in headers.iter().zip(values) {
            match row.fields.iter_mut().find(|(key, _)| key == name) {
                Some(slot) => slot.1 = value,
                None => row.fields.push((name.clone(), value)),
            }
        }
        row
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Splits the input into records. A field that opens with `"` may contain
/// the delimiter, line breaks and doubled quotes; a `"` anywhere else is
/// literal text. Blank lines are skipped.
struct Records {
    reader: Box<dyn BufRead>,
    delimiter: char,
}

impl Records {
    fn next_record(&mut self) -> std::io::Result<Option<Vec<String>>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }

            loop {
                let (fields, unterminated) =
                    split_record(line.trim_end_matches(['\r', '\n']), self.delimiter);
                // A quoted field still open at end of line continues on the next one.
                if unterminated && self.reader.read_line(&mut line)? > 0 {
                    continue;
                }
                return Ok(Some(fields));
            }
        }
    }
}

/// Returns the fields of `record` and whether it ended inside a quoted field.
fn split_record(record: &str, delimiter: char) -> (Vec<String>, bool) {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == delimiter {
            fields.push(std::mem::take(&mut field));
            at_field_start = true;
        } else if c == '"' && at_field_start {
            in_quotes = true;
            at_field_start = false;
        } else {
            field.push(c);
            at_field_start = false;
        }
    }
    fields.push(field);
    (fields, in_quotes)
}
