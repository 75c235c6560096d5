#![allow(dead_code)]

use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Fresh scratch directory that outlives the test (inspectable on failure).
pub fn scratch_dir() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// Write one JSON value per line.
pub fn write_jsonl(path: &Path, records: &[Value]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for r in records {
        writeln!(&mut f, "{}", r).unwrap();
    }
}

/// Write raw text lines as-is (for malformed-line fixtures).
pub fn write_raw_lines(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

/// Write a compressed `.zst` file containing the provided JSON lines.
pub fn write_zst_lines(path: &Path, records: &[Value]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for r in records {
        writeln!(&mut enc, "{}", r).unwrap();
    }
    enc.finish().unwrap();
}

/// Write a whole-document `.json` file (array or single object).
pub fn write_json(path: &Path, doc: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(doc).unwrap()).unwrap();
}

/// Write a CSV file from a header and rows.
pub fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut w = csv::Writer::from_path(path).unwrap();
    w.write_record(header).unwrap();
    for r in rows {
        w.write_record(r).unwrap();
    }
    w.flush().unwrap();
}

/// Read a JSONL file into a vector of `serde_json::Value` (skips empty lines).
pub fn read_jsonl_values(path: &Path) -> Vec<Value> {
    read_lines(path).iter().map(|s| serde_json::from_str(s).unwrap()).collect()
}

/// Read a text file line-by-line into strings.
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Parse lines collected by an in-memory sink.
pub fn parse_lines(lines: &[String]) -> Vec<Value> {
    lines.iter().map(|s| serde_json::from_str(s).unwrap()).collect()
}

/// Turn JSON objects into the `Ok(record)` items the in-memory entry point consumes.
pub fn raw_records(values: Vec<Value>) -> Vec<convector::ConvectorResult<convector::RawRecord>> {
    values
        .into_iter()
        .map(|v| match v {
            Value::Object(m) => Ok(m),
            other => panic!("fixture is not an object: {other}"),
        })
        .collect()
}

/// Write `records` as gzip-compressed JSON lines.
pub fn write_gz_lines(path: &Path, records: &[Value]) {
    let text: String = records.iter().map(|r| format!("{r}\n")).collect();
    write_gz(path, &text);
}

/// Write `text` gzip-compressed.
pub fn write_gz(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap();
}

/// Write a single-row-group Parquet file of required UTF-8 columns.
pub fn write_parquet(path: &Path, columns: &[&str], rows: &[Vec<String>]) {
    use parquet::data_type::{ByteArray, ByteArrayType};
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::sync::Arc;

    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let fields: String = columns.iter().map(|c| format!("REQUIRED BYTE_ARRAY {c} (UTF8); ")).collect();
    let schema = Arc::new(parse_message_type(&format!("message rows {{ {fields}}}")).unwrap());
    let mut writer = SerializedFileWriter::new(File::create(path).unwrap(), schema, Default::default()).unwrap();
    let mut rg = writer.next_row_group().unwrap();
    let mut idx = 0;
    while let Some(mut col) = rg.next_column().unwrap() {
        let values: Vec<ByteArray> = rows.iter().map(|r| ByteArray::from(r[idx].as_str())).collect();
        col.typed::<ByteArrayType>().write_batch(&values, None, None).unwrap();
        col.close().unwrap();
        idx += 1;
    }
    rg.close().unwrap();
    writer.close().unwrap();
}
