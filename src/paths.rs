use crate::error::{ConvectorError, ConvectorResult};
use crate::source::{origin_of, InputFormat};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One input file scheduled for processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceJob {
    pub path: PathBuf,
    pub format: InputFormat,
}

impl SourceJob {
    pub fn new(path: impl Into<PathBuf>) -> ConvectorResult<Self> {
        let path = path.into();
        let format = InputFormat::from_path(&path).ok_or_else(|| {
            ConvectorError::configuration(format!("unsupported file type: {}", path.display()))
        })?;
        Ok(Self { path, format })
    }

    /// File name, used as the `source` value of emitted records.
    pub fn origin(&self) -> String {
        origin_of(&self.path)
    }

    /// File name without its extension(s): `chats.jsonl.zst` -> `chats`.
    pub fn stem(&self) -> String {
        let name = self.origin();
        match name.find('.') {
            Some(0) | None => name,
            Some(i) => name[..i].to_string(),
        }
    }
}

/// A file is a single source; a directory is walked recursively and every supported file,
/// sorted by path, becomes a source. Unsupported files inside a directory are skipped.
pub fn discover_sources(input: &Path) -> ConvectorResult<Vec<SourceJob>> {
    if input.is_file() {
        return Ok(vec![SourceJob::new(input)?]);
    }
    if !input.is_dir() {
        return Err(ConvectorError::configuration(format!("input path '{}' does not exist", input.display())));
    }

    let mut jobs = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).sort_by_file_name() {
        let ent = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !ent.file_type().is_file() {
            continue;
        }
        match InputFormat::from_path(ent.path()) {
            Some(format) => jobs.push(SourceJob { path: ent.path().to_path_buf(), format }),
            None => tracing::debug!(path = %ent.path().display(), "skipping unsupported file"),
        }
    }
    jobs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(jobs)
}

/// `output_file` (resolved under `output_dir` when relative) when set, else
/// `<output_dir>/<stem>_tr.jsonl`.
pub fn output_path_for(job: &SourceJob, output_dir: &Path, output_file: Option<&Path>) -> PathBuf {
    match output_file {
        Some(f) if f.is_absolute() => f.to_path_buf(),
        Some(f) => output_dir.join(f),
        None => output_dir.join(format!("{}_tr.jsonl", job.stem())),
    }
}
