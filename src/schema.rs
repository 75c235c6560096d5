//! Output schema projection: canonical record -> `default` or `chat_completion` object.

use crate::error::ConvectorError;
use crate::record::{CanonicalBody, CanonicalRecord, TurnRole};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SchemaKind {
    /// `{instruction, input, output, source, ...retained}`
    #[default]
    Default,
    /// `{messages: [{role, content}, ...], source, ...retained}`
    ChatCompletion,
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Default => "default",
            SchemaKind::ChatCompletion => "chat_completion",
        }
    }
}

impl FromStr for SchemaKind {
    type Err = ConvectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(SchemaKind::Default),
            "chat_completion" | "chat-completion" => Ok(SchemaKind::ChatCompletion),
            _ => Err(ConvectorError::SchemaProjection { schema: s.to_string() }),
        }
    }
}

impl TryFrom<String> for SchemaKind {
    type Error = ConvectorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema-projected record, ready for the writer. Key order is emission order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutputRecord(Map<String, Value>);

impl OutputRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Compact single-line JSON, as written to NDJSON outputs.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

/// Projects canonical records of one source. `source` is passed through untouched.
#[derive(Clone, Debug)]
pub struct SchemaEmitter {
    kind: SchemaKind,
    retained: Vec<String>,
    source: String,
}

impl SchemaEmitter {
    pub fn new(kind: SchemaKind, retained: &[String], source: impl Into<String>) -> Self {
        Self { kind, retained: retained.to_vec(), source: source.into() }
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn project(&self, rec: &CanonicalRecord) -> OutputRecord {
        let mut out = Map::new();
        match self.kind {
            SchemaKind::Default => {
                out.insert("instruction".into(), Value::String(rec.instruction().to_string()));
                out.insert("input".into(), Value::String(rec.input().to_string()));
                out.insert("output".into(), Value::String(rec.output().to_string()));
            }
            SchemaKind::ChatCompletion => {
                let messages: Vec<Value> = match &rec.body {
                    CanonicalBody::Conversation(c) => c
                        .turns
                        .iter()
                        .map(|t| json!({ "role": t.role.as_str(), "content": t.content }))
                        .collect(),
                    CanonicalBody::Flat(t) => vec![
                        json!({ "role": TurnRole::System.as_str(), "content": t.instruction }),
                        json!({ "role": TurnRole::User.as_str(), "content": t.input }),
                        json!({ "role": TurnRole::Assistant.as_str(), "content": t.output }),
                    ],
                };
                out.insert("messages".into(), Value::Array(messages));
            }
        }
        out.insert("source".into(), Value::String(self.source.clone()));

        for name in &self.retained {
            let v = match (name.as_str(), rec.conversation_id()) {
                ("conversation_id", Some(id)) => Value::String(id.to_string()),
                _ => rec.retained.get(name).cloned().unwrap_or_else(|| Value::String(String::new())),
            };
            out.insert(name.clone(), v);
        }
        OutputRecord(out)
    }
}

/// One-shot projection without building an emitter.
pub fn project(rec: &CanonicalRecord, kind: SchemaKind, retained: &[String], source: &str) -> OutputRecord {
    SchemaEmitter::new(kind, retained, source).project(rec)
}
