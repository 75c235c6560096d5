use crate::util::{append_with_backoff, create_with_backoff, open_with_backoff};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Minimal NDJSON reader with buffering and line-terminator trimming.
/// Generic over the buffered source so plain files, decompressors and in-memory documents share it.
pub struct NdjsonReader<R: BufRead> {
    rdr: R,
}

impl NdjsonReader<BufReader<File>> {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path, 16, 50)?;
        Ok(Self { rdr: BufReader::with_capacity(buf_bytes.max(8 * 1024), f) })
    }
}

impl<R: BufRead> NdjsonReader<R> {
    pub fn new(rdr: R) -> Self {
        Self { rdr }
    }

    /// Read the next raw line into `buf`. Returns the number of bytes read (0 on EOF).
    /// Strips trailing `\r?\n`. Bytes are not UTF-8 checked; decoding is up to the caller.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        buf.clear();
        let n = self.rdr.read_until(b'\n', buf)?;
        if n == 0 { return Ok(0); }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') { buf.pop(); }
        }
        Ok(n)
    }
}

/// Buffered NDJSON writer with robust file creation. Counts what it writes.
pub struct NdjsonWriter {
    w: Option<BufWriter<File>>,
    lines: u64,
    bytes: u64,
}

impl NdjsonWriter {
    /// Create (truncate) `path`.
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path, 16, 50)?;
        Ok(Self::with_file(f, buf_bytes))
    }

    /// Open `path` for appending, creating it when missing.
    pub fn append(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = append_with_backoff(path, 16, 50)?;
        Ok(Self::with_file(f, buf_bytes))
    }

    fn with_file(f: File, buf_bytes: usize) -> Self {
        Self {
            w: Some(BufWriter::with_capacity(buf_bytes.max(8 * 1024), f)),
            lines: 0,
            bytes: 0,
        }
    }

    /// Write `s` followed by `\n`.
    #[inline]
    pub fn write_line(&mut self, s: &str) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            w.write_all(s.as_bytes())?;
            w.write_all(b"\n")?;
            self.lines += 1;
            self.bytes += s.len() as u64 + 1;
        }
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(mut self) -> io::Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush()?;
        }
        Ok(())
    }
}
