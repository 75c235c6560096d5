//! Record model: raw source rows, the canonical intermediate form and the turn types.
//!
//! Raw rows are `serde_json` maps: `Value` is the closed scalar | list | map sum type that every
//! resolution step pattern-matches on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One row/entry as produced by a reader. Key order follows the source.
pub type RawRecord = Map<String, Value>;

/// Canonical field names that filters and retained lists may reference besides retained fields.
pub const CANONICAL_FIELDS: [&str; 4] = ["instruction", "input", "output", "conversation_id"];

/// Role a raw field can play for a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Instruction,
    Input,
    Output,
    Conversation,
    ConversationId,
}

impl FieldRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldRole::Instruction => "instruction",
            FieldRole::Input => "input",
            FieldRole::Output => "output",
            FieldRole::Conversation => "conversation",
            FieldRole::ConversationId => "conversation_id",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a single turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub conversation_id: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Content of the first turn spoken by `role`, if any.
    pub fn first(&self, role: TurnRole) -> Option<&str> {
        self.turns.iter().find(|t| t.role == role).map(|t| t.content.as_str())
    }
}

/// Flat instruction/input/output triple. Unresolved roles hold the empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlatTriple {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanonicalBody {
    Flat(FlatTriple),
    Conversation(Conversation),
}

/// Borrowed view of a canonical or retained field, used by the filter engine.
#[derive(Clone, Copy, Debug)]
pub enum FieldRef<'a> {
    Text(&'a str),
    Value(&'a Value),
}

/// Format-agnostic record between field-role resolution and schema projection.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalRecord {
    pub body: CanonicalBody,
    pub retained: Map<String, Value>,
}

impl CanonicalRecord {
    pub fn flat(triple: FlatTriple, retained: Map<String, Value>) -> Self {
        Self { body: CanonicalBody::Flat(triple), retained }
    }

    pub fn conversation(conversation: Conversation, retained: Map<String, Value>) -> Self {
        Self { body: CanonicalBody::Conversation(conversation), retained }
    }

    /// Flat instruction, or the first system turn of a conversation.
    pub fn instruction(&self) -> &str {
        match &self.body {
            CanonicalBody::Flat(t) => &t.instruction,
            CanonicalBody::Conversation(c) => c.first(TurnRole::System).unwrap_or(""),
        }
    }

    /// Flat input, or the first user turn of a conversation.
    pub fn input(&self) -> &str {
        match &self.body {
            CanonicalBody::Flat(t) => &t.input,
            CanonicalBody::Conversation(c) => c.first(TurnRole::User).unwrap_or(""),
        }
    }

    /// Flat output, or the first assistant turn of a conversation.
    pub fn output(&self) -> &str {
        match &self.body {
            CanonicalBody::Flat(t) => &t.output,
            CanonicalBody::Conversation(c) => c.first(TurnRole::Assistant).unwrap_or(""),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match &self.body {
            CanonicalBody::Flat(_) => None,
            CanonicalBody::Conversation(c) => Some(&c.conversation_id),
        }
    }

    /// Look up a canonical name first, then a retained field.
    pub fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "instruction" => Some(FieldRef::Text(self.instruction())),
            "input" => Some(FieldRef::Text(self.input())),
            "output" => Some(FieldRef::Text(self.output())),
            "conversation_id" => self
                .conversation_id()
                .map(FieldRef::Text)
                .or_else(|| self.retained.get(name).map(FieldRef::Value)),
            other => self.retained.get(other).map(FieldRef::Value),
        }
    }
}

/// Render a raw value as role text: strings verbatim, null as "", anything else as compact JSON.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[inline]
pub fn is_scalar(v: &Value) -> bool {
    !matches!(v, Value::Array(_) | Value::Object(_))
}
