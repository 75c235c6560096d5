use crate::util::open_with_backoff;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use zstd::stream::read::Decoder;

/// Buffered line source over a zstd-compressed JSONL file.
pub type ZstLines = BufReader<Decoder<'static, BufReader<File>>>;

/// Open a `.zst` JSONL file for line-by-line reading.
///
/// We request `window_log_max(31)` up front to avoid "Frame requires too much memory"
/// on very large frames (long-window dumps are common for corpus exports).
pub fn open_zst_lines(path: &Path, read_buf_bytes: usize) -> io::Result<ZstLines> {
    let file = open_with_backoff(path, 16, 50)?;
    let mut decoder = Decoder::new(file)?;
    decoder.window_log_max(31)?;
    Ok(BufReader::with_capacity(read_buf_bytes.max(16 * 1024), decoder))
}
