mod aliases;
mod concurrency;
mod config;
mod conversation;
mod error;
mod filters;
mod gz_jsonl;
mod limits;
mod mapper;
mod ndjson;
mod paths;
mod pipeline;
mod progress;
mod query;
mod record;
mod schema;
mod selection;
mod sink;
mod source;
mod summary;
mod util;
mod zstd_jsonl;

pub use crate::config::ConvectorOptions;
pub use crate::error::{ConvectorError, ConvectorResult};
pub use crate::pipeline::{CanonicalizationPipeline, Convector, RunContext};
pub use crate::summary::{RunSummary, SourceSummary};

// Engine components, usable on their own.
pub use crate::aliases::AliasTables;
pub use crate::conversation::{ConversationFlattener, ConversationIds, Flattened, IdStrategy};
pub use crate::filters::CompiledFilter;
pub use crate::limits::{LimitGovernor, LimitScope, Limits};
pub use crate::mapper::{FieldMapper, FieldOverrides, FieldRoleMap, RecordShape, Route, RESERVED_OUTPUT_KEYS};
pub use crate::query::{parse_predicate, Operator, Predicate};
pub use crate::record::{
    CanonicalBody, CanonicalRecord, Conversation, FieldRef, FieldRole, FlatTriple, RawRecord, Turn, TurnRole,
    CANONICAL_FIELDS,
};
pub use crate::schema::{project, OutputRecord, SchemaEmitter, SchemaKind};

// I/O adapters.
pub use crate::ndjson::{NdjsonReader, NdjsonWriter};
pub use crate::paths::{discover_sources, output_path_for, SourceJob};
pub use crate::sink::{FileSink, OpenedPaths, RecordSink};
pub use crate::source::{open_source, BoxedSource, InputFormat, ParquetSource, RecordSource};

pub use crate::util::{init_tracing_once, init_tracing_once_with};
