use crate::aliases::AliasTables;
use crate::conversation::IdStrategy;
use crate::error::{ConvectorError, ConvectorResult};
use crate::limits::{LimitScope, Limits};
use crate::mapper::FieldOverrides;
use crate::schema::SchemaKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// User-facing options with sensible defaults and builder chaining.
///
/// Also deserializable from a JSON profile; unknown keys are ignored and missing keys keep
/// their defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConvectorOptions {
    // field-role overrides
    #[serde(flatten)]
    pub overrides: FieldOverrides,
    #[serde(alias = "is_conversation")]
    pub conversational: bool,

    // record selection and shape
    pub filters: Vec<String>,
    #[serde(alias = "output_schema")]
    pub schema: SchemaKind,
    #[serde(alias = "labels", alias = "additional_fields")]
    pub retained_fields: Vec<String>,

    // limits
    #[serde(alias = "lines")]
    pub max_rows: Option<u64>,
    #[serde(alias = "bytes")]
    pub max_bytes: Option<u64>,
    pub limit_scope: LimitScope,
    /// Draw the row cap's worth of records at random from each source instead of the leading ones.
    #[serde(alias = "random_selection")]
    pub random: bool,
    #[serde(alias = "seed")]
    pub random_seed: Option<u64>,

    pub id_strategy: IdStrategy,
    pub sample_size: usize, // leading records used to resolve field roles
    pub aliases: AliasTables,

    // output
    pub output_dir: PathBuf,
    pub output_file: Option<PathBuf>, // one file for every source of the run
    pub append: bool,

    pub progress: bool,
    pub progress_label: Option<String>,
    /// Sources processed in parallel. Per-source outputs only; conversational sources that
    /// need ordinal ids are processed one after another so numbering follows source order.
    pub file_concurrency: usize,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for ConvectorOptions {
    fn default() -> Self {
        Self {
            overrides: FieldOverrides::default(),
            conversational: false,
            filters: Vec::new(),
            schema: SchemaKind::Default,
            retained_fields: Vec::new(),
            max_rows: None,
            max_bytes: None,
            limit_scope: LimitScope::Global,
            random: false,
            random_seed: None,
            id_strategy: IdStrategy::Ordinal,
            sample_size: 8,
            aliases: AliasTables::default(),
            output_dir: PathBuf::from("silo"),
            output_file: None,
            append: false,
            progress: true,
            progress_label: None,
            file_concurrency: 1,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl ConvectorOptions {
    /// Load a JSON profile. Relative output paths stay relative to the working directory.
    pub fn from_profile_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading profile {}", path.display()))?;
        let opts: Self =
            serde_json::from_str(&text).with_context(|| format!("parsing profile {}", path.display()))?;
        Ok(opts.normalized())
    }

    fn normalized(mut self) -> Self {
        self.sample_size = self.sample_size.max(1);
        self.file_concurrency = self.file_concurrency.max(1);
        self.read_buffer_bytes = self.read_buffer_bytes.max(8 * 1024);
        self.write_buffer_bytes = self.write_buffer_bytes.max(8 * 1024);
        self
    }

    /// Option combinations that cannot run.
    pub fn validate(&self) -> ConvectorResult<()> {
        if self.random && self.max_rows.is_none() {
            return Err(ConvectorError::configuration("random selection needs a row limit"));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits::new(self.max_rows, self.max_bytes)
    }

    pub fn with_overrides(mut self, overrides: FieldOverrides) -> Self {
        self.overrides = overrides;
        self
    }
    pub fn with_instruction_field(mut self, field: impl Into<String>) -> Self {
        self.overrides.instruction = Some(field.into());
        self
    }
    pub fn with_input_field(mut self, field: impl Into<String>) -> Self {
        self.overrides.input = Some(field.into());
        self
    }
    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.overrides.output = Some(field.into());
        self
    }
    pub fn with_conversation_field(mut self, field: impl Into<String>) -> Self {
        self.overrides.conversation = Some(field.into());
        self
    }
    pub fn with_conversation_id_field(mut self, field: impl Into<String>) -> Self {
        self.overrides.conversation_id = Some(field.into());
        self
    }
    pub fn with_conversational(mut self, yes: bool) -> Self {
        self.conversational = yes;
        self
    }
    pub fn with_filter(mut self, spec: impl Into<String>) -> Self {
        self.filters.push(spec.into());
        self
    }
    pub fn with_filters<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.extend(specs.into_iter().map(Into::into));
        self
    }
    pub fn with_schema(mut self, schema: SchemaKind) -> Self {
        self.schema = schema;
        self
    }
    pub fn with_retained_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retained_fields = fields.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_max_rows(mut self, rows: u64) -> Self {
        self.max_rows = Some(rows);
        self
    }
    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }
    pub fn with_limit_scope(mut self, scope: LimitScope) -> Self {
        self.limit_scope = scope;
        self
    }
    pub fn with_random(mut self, yes: bool) -> Self {
        self.random = yes;
        self
    }
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }
    pub fn with_sample_size(mut self, n: usize) -> Self {
        self.sample_size = n.max(1);
        self
    }
    pub fn with_aliases(mut self, aliases: AliasTables) -> Self {
        self.aliases = aliases;
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_output_file(mut self, file: impl AsRef<Path>) -> Self {
        self.output_file = Some(file.as_ref().to_path_buf());
        self
    }
    pub fn with_append(mut self, yes: bool) -> Self {
        self.append = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n.max(1);
        self
    }

    // IO buffers tuning
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
}
