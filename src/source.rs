//! Record readers: every supported input format as a pull-based stream of [`RawRecord`]s.
//!
//! Readers are thin. A line or entry that does not decode to a JSON object is reported as
//! [`ConvectorError::MalformedRecord`] and the stream carries on; I/O failures are fatal.

use crate::error::{ConvectorError, ConvectorResult};
use crate::gz_jsonl::{open_gz, open_gz_lines};
use crate::ndjson::NdjsonReader;
use crate::record::RawRecord;
use crate::util::open_with_backoff;
use crate::zstd_jsonl::open_zst_lines;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::reader::RowIter;
use parquet::record::{Field, Row};
use serde_json::{Map, Number, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

/// An ordered, finite stream of raw records from one source file.
pub trait RecordSource: Iterator<Item = ConvectorResult<RawRecord>> {
    /// Name used in logs, errors and the `source` output field.
    fn origin(&self) -> &str;

    /// Declared column names (CSV headers, Parquet top-level fields). Empty for JSON formats.
    fn columns(&self) -> &[String] {
        &[]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputFormat {
    /// One JSON object per line (`.jsonl`, `.ndjson`).
    Jsonl,
    /// A JSON document: array of objects or a single object (`.json`).
    Json,
    /// Header row + rows (`.csv`).
    Csv,
    /// zstd-compressed JSON lines (`.zst`).
    ZstJsonl,
    /// gzip-compressed JSON lines (`.jsonl.gz`, `.ndjson.gz`).
    GzJsonl,
    /// gzip-compressed JSON document (`.json.gz`), with the same JSON-lines fallback as `.json`.
    GzJson,
    /// Apache Parquet (`.parquet`).
    Parquet,
}

impl InputFormat {
    /// Pick a format from the file extension (case-insensitive). `.gz` files are typed by
    /// the extension in front of it.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jsonl" | "ndjson" => Some(InputFormat::Jsonl),
            "json" => Some(InputFormat::Json),
            "csv" => Some(InputFormat::Csv),
            "zst" | "zstd" => Some(InputFormat::ZstJsonl),
            "parquet" | "pq" => Some(InputFormat::Parquet),
            "gz" => {
                let inner = Path::new(path.file_stem()?).extension()?.to_str()?.to_ascii_lowercase();
                match inner.as_str() {
                    "jsonl" | "ndjson" => Some(InputFormat::GzJsonl),
                    "json" => Some(InputFormat::GzJson),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputFormat::Jsonl => "jsonl",
            InputFormat::Json => "json",
            InputFormat::Csv => "csv",
            InputFormat::ZstJsonl => "zst",
            InputFormat::GzJsonl => "jsonl.gz",
            InputFormat::GzJson => "json.gz",
            InputFormat::Parquet => "parquet",
        }
    }
}

pub type BoxedSource = Box<dyn RecordSource + Send>;

/// Open `path` as a fresh record stream. Calling it again restarts the source.
pub fn open_source(path: &Path, format: InputFormat, read_buf_bytes: usize) -> ConvectorResult<BoxedSource> {
    let origin = origin_of(path);
    Ok(match format {
        InputFormat::Jsonl => Box::new(LineSource::new(NdjsonReader::open(path, read_buf_bytes)?, origin)),
        InputFormat::ZstJsonl => Box::new(LineSource::new(NdjsonReader::new(open_zst_lines(path, read_buf_bytes)?), origin)),
        InputFormat::GzJsonl => Box::new(LineSource::new(NdjsonReader::new(open_gz_lines(path, read_buf_bytes)?), origin)),
        InputFormat::Csv => Box::new(CsvSource::open(path, origin)?),
        InputFormat::Json => {
            let mut text = Vec::new();
            open_with_backoff(path, 16, 50)?.read_to_end(&mut text)?;
            json_document(text, origin)
        }
        InputFormat::GzJson => {
            let mut text = Vec::new();
            open_gz(path)?.read_to_end(&mut text)?;
            json_document(text, origin)
        }
        InputFormat::Parquet => Box::new(ParquetSource::open(path, origin)?),
    })
}

/// File name of `path`, falling back to the full display form.
pub fn origin_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn object_or_malformed(v: Value, origin: &str, line: u64) -> ConvectorResult<RawRecord> {
    match v {
        Value::Object(map) => Ok(map),
        other => Err(ConvectorError::MalformedRecord {
            origin: origin.to_string(),
            line,
            message: format!("expected a JSON object, found {}", kind_of(&other)),
        }),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ----------------------------- JSON lines ------------------------------------

/// JSON-lines stream over any buffered reader. Blank lines are ignored; a line that is not
/// valid UTF-8 is malformed like any other undecodable line.
pub struct LineSource<R: BufRead> {
    reader: NdjsonReader<R>,
    origin: String,
    line_no: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: NdjsonReader<R>, origin: impl Into<String>) -> Self {
        Self { reader, origin: origin.into(), line_no: 0, buf: Vec::with_capacity(16 * 1024) }
    }

    fn malformed(&self, message: String) -> ConvectorError {
        ConvectorError::MalformedRecord { origin: self.origin.clone(), line: self.line_no, message }
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = ConvectorResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;
            let line = match std::str::from_utf8(&self.buf) {
                Ok(text) => text.trim(),
                Err(e) => return Some(Err(self.malformed(format!("invalid UTF-8: {e}")))),
            };
            if line.is_empty() {
                continue;
            }
            return Some(match serde_json::from_str::<Value>(line) {
                Ok(v) => object_or_malformed(v, &self.origin, self.line_no),
                Err(e) => Err(self.malformed(e.to_string())),
            });
        }
    }
}

impl<R: BufRead> RecordSource for LineSource<R> {
    fn origin(&self) -> &str {
        &self.origin
    }
}

// ----------------------------- JSON document ----------------------------------

/// Entries of a whole-document JSON file; `line` in errors is the 1-based entry index.
pub struct DocumentSource {
    items: std::vec::IntoIter<Value>,
    origin: String,
    index: u64,
}

impl Iterator for DocumentSource {
    type Item = ConvectorResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.items.next()?;
        self.index += 1;
        Some(object_or_malformed(v, &self.origin, self.index))
    }
}

impl RecordSource for DocumentSource {
    fn origin(&self) -> &str {
        &self.origin
    }
}

/// `.json` files are often JSON lines in disguise: parse the whole document first and fall
/// back to line-by-line reading when it is not a single JSON value.
fn json_document(text: Vec<u8>, origin: String) -> BoxedSource {
    match serde_json::from_slice::<Value>(&text) {
        Ok(Value::Array(items)) => Box::new(DocumentSource { items: items.into_iter(), origin, index: 0 }),
        Ok(single) => Box::new(DocumentSource { items: vec![single].into_iter(), origin, index: 0 }),
        Err(_) => {
            tracing::debug!(%origin, "not a single JSON document; reading as JSON lines");
            Box::new(LineSource::new(NdjsonReader::new(Cursor::new(text)), origin))
        }
    }
}

// ----------------------------- CSV ------------------------------------

/// Header-keyed CSV rows; every cell is a string. Short rows simply lack the trailing fields.
pub struct CsvSource {
    rdr: csv::Reader<BufReader<File>>,
    headers: Vec<String>,
    origin: String,
    row: u64,
    record: csv::StringRecord,
}

impl CsvSource {
    pub fn open(path: &Path, origin: String) -> ConvectorResult<Self> {
        let file = open_with_backoff(path, 16, 50)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));
        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        Ok(Self { rdr, headers, origin, row: 1, record: csv::StringRecord::new() })
    }
}

impl Iterator for CsvSource {
    type Item = ConvectorResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.row += 1;
        match self.rdr.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let mut map = Map::with_capacity(self.headers.len());
                for (h, cell) in self.headers.iter().zip(self.record.iter()) {
                    map.insert(h.clone(), Value::String(cell.to_string()));
                }
                Some(Ok(map))
            }
            Err(e) if e.is_io_error() => Some(Err(e.into())),
            Err(e) => Some(Err(ConvectorError::MalformedRecord {
                origin: self.origin.clone(),
                line: self.row,
                message: e.to_string(),
            })),
        }
    }
}

impl RecordSource for CsvSource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn columns(&self) -> &[String] {
        &self.headers
    }
}

// ----------------------------- Parquet ------------------------------------

/// Rows of a Parquet file through the record API, one row group at a time. Nested groups,
/// lists and maps become JSON objects and arrays, so conversation columns keep their shape.
pub struct ParquetSource {
    rows: RowIter<'static>,
    columns: Vec<String>,
    origin: String,
}

impl ParquetSource {
    pub fn open(path: &Path, origin: String) -> ConvectorResult<Self> {
        let reader = SerializedFileReader::new(open_with_backoff(path, 16, 50)?)?;
        let columns = reader
            .metadata()
            .file_metadata()
            .schema()
            .get_fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        Ok(Self { rows: reader.into_iter(), columns, origin })
    }
}

impl Iterator for ParquetSource {
    type Item = ConvectorResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.rows.next()?.map(|row| row_to_record(&row)).map_err(Into::into))
    }
}

impl RecordSource for ParquetSource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }
}

fn row_to_record(row: &Row) -> RawRecord {
    row.get_column_iter().map(|(name, field)| (name.clone(), field_to_json(field))).collect()
}

fn field_to_json(f: &Field) -> Value {
    match f {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(v) => Value::from(*v),
        Field::Short(v) => Value::from(*v),
        Field::Int(v) => Value::from(*v),
        Field::Long(v) => Value::from(*v),
        Field::UByte(v) => Value::from(*v),
        Field::UShort(v) => Value::from(*v),
        Field::UInt(v) => Value::from(*v),
        Field::ULong(v) => Value::from(*v),
        Field::Float(v) => Number::from_f64(f64::from(*v)).map_or(Value::Null, Value::Number),
        Field::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Field::Str(s) => Value::String(s.clone()),
        Field::Bytes(b) => match b.as_utf8() {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::String(f.to_string()),
        },
        Field::Group(row) => Value::Object(row_to_record(row)),
        Field::ListInternal(list) => Value::Array(list.elements().iter().map(field_to_json).collect()),
        Field::MapInternal(map) => Value::Object(
            map.entries()
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Field::Str(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key, field_to_json(v))
                })
                .collect(),
        ),
        // dates, timestamps, decimals, half floats: their display form
        other => Value::String(other.to_string()),
    }
}
