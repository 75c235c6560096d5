//! `convector` command line: canonicalize a dataset file or directory into JSONL.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use convector::{init_tracing_once_with, Convector, ConvectorOptions, IdStrategy, LimitScope, SchemaKind};

/// Convert heterogeneous instruction/conversation datasets into a canonical JSONL schema.
#[derive(Parser, Debug)]
#[command(name = "convector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file or directory (jsonl, ndjson, json, csv, zst, jsonl.gz, json.gz, parquet)
    path: PathBuf,

    /// Treat records as multi-turn conversations
    #[arg(long)]
    conversation: bool,

    /// Raw field holding the instruction
    #[arg(long)]
    instruction: Option<String>,

    /// Raw field holding the input
    #[arg(long)]
    input: Option<String>,

    /// Raw field holding the output
    #[arg(long)]
    output: Option<String>,

    /// Raw field holding the turn list
    #[arg(long)]
    conversation_field: Option<String>,

    /// Raw field holding the conversation identifier
    #[arg(long)]
    conversation_id_field: Option<String>,

    /// Extra raw fields to keep, comma separated
    #[arg(long, value_delimiter = ',')]
    add: Vec<String>,

    /// Filter predicate, e.g. `id,<,10500` or `score>=3` (repeatable, all must hold)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Output schema: default | chat_completion
    #[arg(long)]
    schema: Option<String>,

    /// Stop after this many output records
    #[arg(long)]
    lines: Option<u64>,

    /// Stop once this many output bytes have been written
    #[arg(long)]
    bytes: Option<u64>,

    /// Pick the `--lines` records at random instead of the leading ones
    #[arg(long)]
    random: bool,

    /// Seed for `--random`, for reproducible picks
    #[arg(long)]
    seed: Option<u64>,

    /// Whether limits span the run or restart per source: global | per_source
    #[arg(long)]
    limit_scope: Option<String>,

    /// Ids for conversations without one: ordinal | content_hash
    #[arg(long)]
    id_strategy: Option<String>,

    /// Write every source into this one file
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Directory for per-source output files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Append to existing output files instead of truncating them
    #[arg(long)]
    append: bool,

    /// JSON profile with default options; flags override it
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Sources processed in parallel (per-source outputs only)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn parse_limit_scope(s: &str) -> Result<LimitScope> {
    match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "global" => Ok(LimitScope::Global),
        "per_source" => Ok(LimitScope::PerSource),
        other => bail!("unknown limit scope '{other}' (expected global or per_source)"),
    }
}

fn parse_id_strategy(s: &str) -> Result<IdStrategy> {
    match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "ordinal" => Ok(IdStrategy::Ordinal),
        "content_hash" => Ok(IdStrategy::ContentHash),
        other => bail!("unknown id strategy '{other}' (expected ordinal or content_hash)"),
    }
}

fn options_from(args: &Args) -> Result<ConvectorOptions> {
    let mut opts = match &args.profile {
        Some(p) => ConvectorOptions::from_profile_file(p)?,
        None => ConvectorOptions::default(),
    };

    if args.conversation {
        opts = opts.with_conversational(true);
    }
    if let Some(f) = &args.instruction {
        opts = opts.with_instruction_field(f);
    }
    if let Some(f) = &args.input {
        opts = opts.with_input_field(f);
    }
    if let Some(f) = &args.output {
        opts = opts.with_output_field(f);
    }
    if let Some(f) = &args.conversation_field {
        opts = opts.with_conversation_field(f);
    }
    if let Some(f) = &args.conversation_id_field {
        opts = opts.with_conversation_id_field(f);
    }
    if !args.add.is_empty() {
        let fields: Vec<String> = args.add.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        opts = opts.with_retained_fields(fields);
    }
    opts = opts.with_filters(args.filters.iter().cloned());
    if let Some(s) = &args.schema {
        opts = opts.with_schema(s.parse::<SchemaKind>()?);
    }
    if let Some(n) = args.lines {
        opts = opts.with_max_rows(n);
    }
    if let Some(n) = args.bytes {
        opts = opts.with_max_bytes(n);
    }
    if args.random {
        opts = opts.with_random(true);
    }
    if let Some(seed) = args.seed {
        opts = opts.with_random_seed(seed);
    }
    if let Some(s) = &args.limit_scope {
        opts = opts.with_limit_scope(parse_limit_scope(s)?);
    }
    if let Some(s) = &args.id_strategy {
        opts = opts.with_id_strategy(parse_id_strategy(s)?);
    }
    if let Some(d) = &args.output_dir {
        opts = opts.with_output_dir(d);
    }
    if let Some(f) = &args.output_file {
        opts = opts.with_output_file(f);
    }
    if args.append {
        opts = opts.with_append(true);
    }
    if let Some(n) = args.concurrency {
        opts = opts.with_file_concurrency(n);
    }
    if args.no_progress {
        opts = opts.with_progress(false);
    }
    Ok(opts)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing_once_with(if args.verbose { "debug" } else { "info" });

    let opts = options_from(&args)?;
    let run = Convector::from_options(opts).transform(&args.path)?;

    for s in &run.sources {
        if let Some(out) = &s.output {
            let abs = std::fs::canonicalize(out).unwrap_or_else(|_| out.clone());
            println!("Delivered to file://{} ({} lines, {} bytes)", abs.display(), s.emitted, s.bytes);
        }
    }
    println!(
        "{} records written, {} filtered, {} skipped ({} turns dropped)",
        run.total_emitted(),
        run.total_filtered(),
        run.total_skipped(),
        run.total_dropped_turns()
    );
    if run.limit_reached {
        println!("Stopped early: output limit reached.");
    }
    Ok(())
}
