//! Output side: where serialized records go.

use crate::ndjson::NdjsonWriter;
use ahash::AHashSet;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Receives one serialized output record per call, in emission order.
pub trait RecordSink {
    fn emit(&mut self, line: &str) -> io::Result<()>;
}

impl RecordSink for Vec<String> {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

impl RecordSink for NdjsonWriter {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        self.write_line(line)
    }
}

/// Paths already opened during this run: later sources writing to the same file append to it.
#[derive(Debug, Default)]
pub struct OpenedPaths(Mutex<AHashSet<PathBuf>>);

impl OpenedPaths {
    /// Record `path`; true when this is its first open in the run.
    fn first_open(&self, path: &Path) -> bool {
        self.0.lock().insert(path.to_path_buf())
    }
}

/// NDJSON file sink that only touches the filesystem once the first record arrives,
/// so sources that emit nothing leave no file behind.
pub struct FileSink<'a> {
    path: PathBuf,
    append: bool,
    buf_bytes: usize,
    opened: &'a OpenedPaths,
    writer: Option<NdjsonWriter>,
}

impl<'a> FileSink<'a> {
    pub fn new(path: PathBuf, append: bool, buf_bytes: usize, opened: &'a OpenedPaths) -> Self {
        Self { path, append, buf_bytes, opened, writer: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut NdjsonWriter> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let first = self.opened.first_open(&self.path);
            let w = if self.append || !first {
                NdjsonWriter::append(&self.path, self.buf_bytes)?
            } else {
                NdjsonWriter::create(&self.path, self.buf_bytes)?
            };
            tracing::debug!(path = %self.path.display(), append = self.append || !first, "opened output");
            self.writer = Some(w);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "output writer unavailable"))
    }

    /// Flush and close. Returns the output path when anything was written.
    pub fn finish(self) -> io::Result<Option<PathBuf>> {
        match self.writer {
            Some(w) => {
                let (lines, bytes) = (w.lines(), w.bytes());
                w.finish()?;
                tracing::debug!(path = %self.path.display(), lines, bytes, "closed output");
                Ok(Some(self.path))
            }
            None => Ok(None),
        }
    }
}

impl RecordSink for FileSink<'_> {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        self.writer()?.write_line(line)
    }
}
