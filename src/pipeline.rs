use crate::concurrency::for_each_limited;
use crate::config::ConvectorOptions;
use crate::conversation::{ConversationFlattener, ConversationIds, IdStrategy};
use crate::error::ConvectorResult;
use crate::filters::CompiledFilter;
use crate::limits::{LimitGovernor, LimitScope, Limits};
use crate::mapper::{FieldMapper, FieldOverrides, FieldRoleMap, RecordShape, Route};
use crate::paths::{discover_sources, output_path_for, SourceJob};
use crate::progress::make_record_progress;
use crate::record::{value_text, CanonicalRecord, Conversation, FieldRole, FlatTriple, RawRecord};
use crate::schema::{SchemaEmitter, SchemaKind};
use crate::selection::{choose_positions, Selected};
use crate::sink::{FileSink, OpenedPaths, RecordSink};
use crate::source::open_source;
use crate::summary::{RunSummary, SourceSummary};
use crate::util::init_tracing_once;
use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar};
use parking_lot::Mutex;
use serde_json::Map;
use std::path::Path;

/// State shared by every source of one invocation.
pub struct RunContext {
    scope: LimitScope,
    limits: Limits,
    global: Mutex<LimitGovernor>,
    ids: ConversationIds,
    opened: OpenedPaths,
}

impl RunContext {
    pub fn new(opts: &ConvectorOptions) -> Self {
        let limits = opts.limits();
        Self {
            scope: opts.limit_scope,
            limits,
            global: Mutex::new(LimitGovernor::new(limits)),
            ids: ConversationIds::new(opts.id_strategy),
            opened: OpenedPaths::default(),
        }
    }

    pub fn ids(&self) -> &ConversationIds {
        &self.ids
    }

    /// True once a run-wide cap is reached; later sources are not started.
    pub fn exhausted(&self) -> bool {
        self.scope == LimitScope::Global && !self.global.lock().should_continue()
    }

    fn governor(&self) -> Governor<'_> {
        match self.scope {
            LimitScope::Global => Governor::Shared(&self.global),
            LimitScope::PerSource => Governor::Own(LimitGovernor::new(self.limits)),
        }
    }
}

enum Governor<'a> {
    Shared(&'a Mutex<LimitGovernor>),
    Own(LimitGovernor),
}

impl Governor<'_> {
    fn should_continue(&self) -> bool {
        match self {
            Governor::Shared(g) => g.lock().should_continue(),
            Governor::Own(g) => g.should_continue(),
        }
    }

    fn admit(&mut self, line_bytes: u64) -> bool {
        match self {
            Governor::Shared(g) => g.lock().admit(line_bytes),
            Governor::Own(g) => g.admit(line_bytes),
        }
    }
}

/// Everything resolved for one source before its first record is streamed:
/// the field map, the compiled filter and the output projection.
pub struct CanonicalizationPipeline<'a> {
    origin: String,
    map: FieldRoleMap,
    filter: CompiledFilter,
    emitter: SchemaEmitter,
    flattener: ConversationFlattener<'a>,
}

impl<'a> CanonicalizationPipeline<'a> {
    /// Resolve field roles against `shape` and compile the filter. Any error here is
    /// configuration-class and must abort the run.
    pub fn plan(origin: &str, shape: &RecordShape, opts: &'a ConvectorOptions) -> ConvectorResult<Self> {
        let map = FieldMapper::new(&opts.aliases, opts.conversational).resolve(
            shape,
            &opts.overrides,
            &opts.retained_fields,
            origin,
        )?;
        let filter = CompiledFilter::compile(&opts.filters, &map)?;
        tracing::info!(
            source = %origin,
            route = ?map.route(),
            instruction = ?map.field(FieldRole::Instruction),
            input = ?map.field(FieldRole::Input),
            output = ?map.field(FieldRole::Output),
            conversation = ?map.field(FieldRole::Conversation),
            conversation_id = ?map.field(FieldRole::ConversationId),
            predicates = filter.predicates().len(),
            "resolved field roles"
        );
        Ok(Self {
            origin: origin.to_string(),
            emitter: SchemaEmitter::new(opts.schema, &opts.retained_fields, origin),
            flattener: ConversationFlattener::new(&opts.aliases),
            map,
            filter,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn field_map(&self) -> &FieldRoleMap {
        &self.map
    }

    /// Raw record -> canonical record. `None` for conversations with no usable turns.
    pub fn canonicalize(
        &self,
        raw: &RawRecord,
        ids: &ConversationIds,
        summary: &mut SourceSummary,
    ) -> Option<CanonicalRecord> {
        let mut retained = Map::new();
        for name in self.map.retained() {
            if let Some(v) = raw.get(name) {
                retained.insert(name.clone(), v.clone());
            }
        }
        let raw_field = |role: FieldRole| self.map.field(role).and_then(|f| raw.get(f));

        if !self.map.is_conversational() {
            let text = |role: FieldRole| raw_field(role).map(value_text).unwrap_or_default();
            let triple = FlatTriple {
                instruction: text(FieldRole::Instruction),
                input: text(FieldRole::Input),
                output: text(FieldRole::Output),
            };
            return Some(CanonicalRecord::flat(triple, retained));
        }

        let flat = raw_field(FieldRole::Conversation).map(|v| self.flattener.flatten(v)).unwrap_or_default();
        summary.dropped_turns += flat.dropped_turns;
        if flat.turns.is_empty() {
            summary.empty_conversations += 1;
            tracing::debug!(source = %self.origin, record = summary.records_read, "dropping conversation without usable turns");
            return None;
        }
        let conversation_id = ids.assign(raw_field(FieldRole::ConversationId), &flat.turns);
        Some(CanonicalRecord::conversation(Conversation { conversation_id, turns: flat.turns }, retained))
    }

    /// Stream `records` into `sink` until they run out or a limit is reached.
    /// Malformed records are counted and skipped; I/O failures abort.
    pub fn process<I, S>(
        &self,
        records: I,
        sink: &mut S,
        ctx: &RunContext,
        pb: Option<&ProgressBar>,
    ) -> Result<SourceSummary>
    where
        I: IntoIterator<Item = ConvectorResult<RawRecord>>,
        S: RecordSink + ?Sized,
    {
        let mut summary = SourceSummary::new(&self.origin, self.map.route());
        let mut governor = ctx.governor();

        let mut records = records.into_iter();
        loop {
            // checked before pulling so the reader never advances past the cap
            if !governor.should_continue() {
                summary.limit_reached = true;
                break;
            }
            let Some(item) = records.next() else {
                break;
            };
            let raw = match item {
                Ok(raw) => raw,
                Err(e) if e.is_recoverable() => {
                    summary.malformed += 1;
                    tracing::warn!(error = %e, "skipping malformed record");
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("reading {}", self.origin)),
            };
            summary.records_read += 1;

            let Some(rec) = self.canonicalize(&raw, &ctx.ids, &mut summary) else {
                continue;
            };
            if !self.filter.matches(&rec) {
                summary.filtered += 1;
                continue;
            }

            let line = self
                .emitter
                .project(&rec)
                .to_line()
                .with_context(|| format!("serializing record {} of {}", summary.records_read, self.origin))?;
            let line_bytes = line.len() as u64 + 1;
            if !governor.admit(line_bytes) {
                summary.limit_reached = true;
                break;
            }
            sink.emit(&line).with_context(|| format!("writing output for {}", self.origin))?;
            summary.emitted += 1;
            summary.bytes += line_bytes;
            if let Some(pb) = pb {
                pb.inc(1);
            }
        }

        if !governor.should_continue() {
            summary.limit_reached = true;
        }
        Ok(summary)
    }
}

struct PlannedSource<'a> {
    index: usize,
    job: &'a SourceJob,
    /// `None` for sources that yielded no records to sample.
    pipeline: Option<CanonicalizationPipeline<'a>>,
}

#[derive(Clone, Default)]
pub struct Convector {
    pub(crate) opts: ConvectorOptions,
}

impl Convector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(opts: ConvectorOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &ConvectorOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn overrides(mut self, o: FieldOverrides) -> Self { self.opts = self.opts.with_overrides(o); self }
    pub fn instruction_field(mut self, f: impl Into<String>) -> Self { self.opts = self.opts.with_instruction_field(f); self }
    pub fn input_field(mut self, f: impl Into<String>) -> Self { self.opts = self.opts.with_input_field(f); self }
    pub fn output_field(mut self, f: impl Into<String>) -> Self { self.opts = self.opts.with_output_field(f); self }
    pub fn conversation_field(mut self, f: impl Into<String>) -> Self { self.opts = self.opts.with_conversation_field(f); self }
    pub fn conversation_id_field(mut self, f: impl Into<String>) -> Self { self.opts = self.opts.with_conversation_id_field(f); self }
    pub fn conversational(mut self, yes: bool) -> Self { self.opts = self.opts.with_conversational(yes); self }
    pub fn filter(mut self, spec: impl Into<String>) -> Self { self.opts = self.opts.with_filter(spec); self }
    pub fn filters<I, S>(mut self, specs: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_filters(specs); self }
    pub fn schema(mut self, schema: SchemaKind) -> Self { self.opts = self.opts.with_schema(schema); self }
    pub fn retain_fields<I, S>(mut self, fields: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_retained_fields(fields); self }
    pub fn max_rows(mut self, rows: u64) -> Self { self.opts = self.opts.with_max_rows(rows); self }
    pub fn max_bytes(mut self, bytes: u64) -> Self { self.opts = self.opts.with_max_bytes(bytes); self }
    pub fn limit_scope(mut self, scope: LimitScope) -> Self { self.opts = self.opts.with_limit_scope(scope); self }
    pub fn random(mut self, yes: bool) -> Self { self.opts = self.opts.with_random(yes); self }
    pub fn random_seed(mut self, seed: u64) -> Self { self.opts = self.opts.with_random_seed(seed); self }
    pub fn id_strategy(mut self, s: IdStrategy) -> Self { self.opts = self.opts.with_id_strategy(s); self }
    pub fn sample_size(mut self, n: usize) -> Self { self.opts = self.opts.with_sample_size(n); self }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_dir(dir); self }
    pub fn output_file(mut self, file: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_file(file); self }
    pub fn append(mut self, yes: bool) -> Self { self.opts = self.opts.with_append(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn file_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_file_concurrency(n); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    // -------- Operations --------

    /// Canonicalize a file, or every supported file under a directory.
    pub fn transform(&self, input: impl AsRef<Path>) -> Result<RunSummary> {
        init_tracing_once();
        let input = input.as_ref();
        let jobs = discover_sources(input).with_context(|| format!("discovering sources under {}", input.display()))?;
        if jobs.is_empty() {
            tracing::warn!(path = %input.display(), "no supported input files found");
        } else {
            tracing::info!("Planned {} source(s) for processing.", jobs.len());
        }
        self.transform_sources(&jobs)
    }

    /// Plan every source first, then stream them. A configuration error in any source aborts
    /// before anything is written.
    pub fn transform_sources(&self, jobs: &[SourceJob]) -> Result<RunSummary> {
        init_tracing_once();
        self.opts.validate()?;
        let mut planned = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            let shape = self.sample_shape(job).with_context(|| format!("sampling {}", job.path.display()))?;
            let pipeline = if shape.is_empty() {
                tracing::info!(path = %job.path.display(), "source has no records; skipping");
                None
            } else {
                Some(
                    CanonicalizationPipeline::plan(&job.origin(), &shape, &self.opts)
                        .with_context(|| format!("resolving fields of {}", job.path.display()))?,
                )
            };
            planned.push(PlannedSource { index, job, pipeline });
        }

        let ctx = RunContext::new(&self.opts);
        let mp = self.opts.progress.then(MultiProgress::new);
        let ordinal_ids = self.opts.id_strategy == IdStrategy::Ordinal
            && planned
                .iter()
                .any(|p| p.pipeline.as_ref().is_some_and(|pl| pl.field_map().is_conversational()));
        let parallel = self.opts.output_file.is_none() && self.opts.file_concurrency > 1 && !ordinal_ids;
        if self.opts.file_concurrency > 1 && !parallel {
            tracing::info!(ordinal_ids, "processing sources sequentially");
        }
        let limit = if parallel { self.opts.file_concurrency } else { 1 };
        let done: Mutex<Vec<(usize, SourceSummary)>> = Mutex::new(Vec::with_capacity(planned.len()));
        let not_started: Mutex<Vec<(usize, String)>> = Mutex::new(Vec::new());

        for_each_limited(&planned, limit, |p| {
            if ctx.exhausted() {
                not_started.lock().push((p.index, p.job.origin()));
                return Ok(());
            }
            let summary = match &p.pipeline {
                Some(pipeline) => self
                    .stream_source(p.job, pipeline, &ctx, mp.as_ref())
                    .with_context(|| format!("processing {}", p.job.path.display()))?,
                None => SourceSummary::new(p.job.origin(), Route::Flat),
            };
            done.lock().push((p.index, summary));
            Ok(())
        })?;

        let mut done = done.into_inner();
        done.sort_by_key(|(i, _)| *i);
        let mut not_started = not_started.into_inner();
        not_started.sort_by_key(|(i, _)| *i);

        let sources: Vec<SourceSummary> = done.into_iter().map(|(_, s)| s).collect();
        let run = RunSummary {
            limit_reached: sources.iter().any(|s| s.limit_reached) || !not_started.is_empty(),
            sources_not_started: not_started.into_iter().map(|(_, o)| o).collect(),
            sources,
        };
        run.log();
        Ok(run)
    }

    /// Canonicalize an in-memory record stream into `sink`. The first `sample_size` records
    /// (plus `columns`) resolve the field roles.
    pub fn transform_records<I, S>(
        &self,
        origin: &str,
        columns: &[String],
        records: I,
        sink: &mut S,
    ) -> Result<SourceSummary>
    where
        I: IntoIterator<Item = ConvectorResult<RawRecord>>,
        S: RecordSink + ?Sized,
    {
        self.opts.validate()?;
        let mut rest = records.into_iter();
        let head: Vec<ConvectorResult<RawRecord>> = rest.by_ref().take(self.opts.sample_size.max(1)).collect();
        let shape = RecordShape::from_samples(head.iter().filter_map(|r| r.as_ref().ok()), columns);
        let pipeline = CanonicalizationPipeline::plan(origin, &shape, &self.opts)?;
        let ctx = RunContext::new(&self.opts);
        let records = head.into_iter().chain(rest);
        match self.random_amount() {
            Some(amount) => {
                let all: Vec<ConvectorResult<RawRecord>> = records.collect();
                let total = all.iter().filter(|r| r.is_ok()).count();
                let picks = choose_positions(total, amount, self.opts.random_seed);
                pipeline.process(Selected::new(all.into_iter(), picks), sink, &ctx, None)
            }
            None => pipeline.process(records, sink, &ctx, None),
        }
    }

    /// Records to draw per source when random selection is on.
    fn random_amount(&self) -> Option<usize> {
        let rows = self.opts.max_rows.filter(|_| self.opts.random)?;
        Some(usize::try_from(rows).unwrap_or(usize::MAX))
    }

    /// Counting pass over `job` for random selection.
    fn random_picks(&self, job: &SourceJob, amount: usize) -> Result<Vec<usize>> {
        let mut total = 0usize;
        for item in open_source(&job.path, job.format, self.opts.read_buffer_bytes)? {
            match item {
                Ok(_) => total += 1,
                Err(e) if e.is_recoverable() => {}
                Err(e) => return Err(e).with_context(|| format!("counting records of {}", job.path.display())),
            }
        }
        let picks = choose_positions(total, amount, self.opts.random_seed);
        tracing::info!(source = %job.origin(), picked = picks.len(), total, "random selection");
        Ok(picks)
    }

    fn sample_shape(&self, job: &SourceJob) -> Result<RecordShape> {
        let mut src = open_source(&job.path, job.format, self.opts.read_buffer_bytes)?;
        let columns = src.columns().to_vec();
        let mut samples = Vec::with_capacity(self.opts.sample_size);
        while samples.len() < self.opts.sample_size {
            match src.next() {
                Some(Ok(raw)) => samples.push(raw),
                Some(Err(e)) if e.is_recoverable() => continue,
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        Ok(RecordShape::from_samples(&samples, &columns))
    }

    fn stream_source(
        &self,
        job: &SourceJob,
        pipeline: &CanonicalizationPipeline<'_>,
        ctx: &RunContext,
        mp: Option<&MultiProgress>,
    ) -> Result<SourceSummary> {
        let out_path = output_path_for(job, &self.opts.output_dir, self.opts.output_file.as_deref());
        let mut sink = FileSink::new(out_path, self.opts.append, self.opts.write_buffer_bytes, &ctx.opened);
        let picks = match self.random_amount() {
            Some(amount) => Some(self.random_picks(job, amount)?),
            None => None,
        };
        let source = open_source(&job.path, job.format, self.opts.read_buffer_bytes)?;
        let records: Box<dyn Iterator<Item = ConvectorResult<RawRecord>>> = match picks {
            Some(picks) => Box::new(Selected::new(source, picks)),
            None => Box::new(source),
        };

        let pb = mp.map(|mp| {
            let label = self.opts.progress_label.as_deref().unwrap_or(pipeline.origin());
            make_record_progress(Some(mp), label, ctx.limits.max_rows)
        });
        let mut summary = pipeline.process(records, &mut sink, ctx, pb.as_ref())?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let out_display = sink.path().display().to_string();
        summary.output = sink.finish().with_context(|| format!("finalizing {out_display}"))?;
        tracing::debug!(source = %summary.origin, output = ?summary.output, emitted = summary.emitted, "source finished");
        Ok(summary)
    }
}
