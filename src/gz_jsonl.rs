use crate::util::open_with_backoff;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Decompressing reader over a `.gz` file. Concatenated gzip members are read as one stream.
pub type GzReader = MultiGzDecoder<BufReader<File>>;

pub fn open_gz(path: &Path) -> io::Result<GzReader> {
    let file = open_with_backoff(path, 16, 50)?;
    Ok(MultiGzDecoder::new(BufReader::new(file)))
}

/// Open a `.jsonl.gz` file for line-by-line reading.
pub fn open_gz_lines(path: &Path, read_buf_bytes: usize) -> io::Result<BufReader<GzReader>> {
    Ok(BufReader::with_capacity(read_buf_bytes.max(16 * 1024), open_gz(path)?))
}
