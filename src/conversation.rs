//! Conversation flattening: nested turn lists -> ordered canonical turns, plus run-scoped
//! conversation-id assignment.

use crate::aliases::{first_present, AliasTables};
use crate::mapper::embedded_list;
use crate::record::{is_scalar, value_text, Turn, TurnRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Turns recovered from one conversation field, and how many entries had to be dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flattened {
    pub turns: Vec<Turn>,
    pub dropped_turns: u64,
}

pub struct ConversationFlattener<'a> {
    aliases: &'a AliasTables,
}

impl<'a> ConversationFlattener<'a> {
    pub fn new(aliases: &'a AliasTables) -> Self {
        Self { aliases }
    }

    /// Expand a raw conversation field in source order. Never reorders turns.
    ///
    /// - list of mappings: role via the role-key aliases, content via the content-key aliases;
    ///   entries missing either, with an unknown role token, or that are scalars are dropped
    /// - list of strings only: alternating user / assistant turns
    /// - string holding a JSON list: decoded first
    pub fn flatten(&self, field: &Value) -> Flattened {
        let decoded;
        let items = match field {
            Value::Array(items) => items,
            other => match embedded_list(other) {
                Some(v) => {
                    decoded = v;
                    match decoded.as_array() {
                        Some(items) => items,
                        None => return Flattened::default(),
                    }
                }
                None => return Flattened::default(),
            },
        };

        if !items.is_empty() && items.iter().all(Value::is_string) {
            let turns = items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let role = if i % 2 == 0 { TurnRole::User } else { TurnRole::Assistant };
                    Turn::new(role, value_text(v))
                })
                .collect();
            return Flattened { turns, dropped_turns: 0 };
        }

        let mut out = Flattened { turns: Vec::with_capacity(items.len()), dropped_turns: 0 };
        for item in items {
            match self.turn_from(item) {
                Some(turn) => out.turns.push(turn),
                None => out.dropped_turns += 1,
            }
        }
        out
    }

    fn turn_from(&self, item: &Value) -> Option<Turn> {
        let obj = item.as_object()?;
        let role_key = first_present(obj, &self.aliases.turn_role_keys, Value::is_string)?;
        let role = self.aliases.turn_role(obj.get(role_key)?.as_str()?)?;
        let content_key = first_present(obj, &self.aliases.turn_content_keys, |v| is_scalar(v) && !v.is_null())?;
        Some(Turn::new(role, value_text(obj.get(content_key)?)))
    }
}

/// Strategy for conversations whose source carries no identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// `conv-000001`, `conv-000002`, ... in input order for the run.
    #[default]
    Ordinal,
    /// SHA-256 prefix of the turn sequence; identical conversations share an id.
    ContentHash,
}

/// Run-scoped conversation-id generator. One instance per invocation; shared by every source.
pub struct ConversationIds {
    strategy: IdStrategy,
    issued: AtomicU64,
}

impl ConversationIds {
    pub fn new(strategy: IdStrategy) -> Self {
        Self { strategy, issued: AtomicU64::new(0) }
    }

    /// Reuse the source identifier when present and non-empty, otherwise generate one.
    pub fn assign(&self, source_id: Option<&Value>, turns: &[Turn]) -> String {
        if let Some(v) = source_id {
            let s = value_text(v);
            if !s.trim().is_empty() {
                return s;
            }
        }
        match self.strategy {
            IdStrategy::Ordinal => {
                let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
                format!("conv-{n:06}")
            }
            IdStrategy::ContentHash => content_hash(turns),
        }
    }

    /// Number of ids generated so far (source-provided ids are not counted).
    pub fn generated(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

/// First 8 bytes of SHA-256 over `role \0 content \xff` per turn, as hex. Stable across
/// builds and machines.
fn content_hash(turns: &[Turn]) -> String {
    let mut hasher = Sha256::new();
    for t in turns {
        hasher.update(t.role.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(t.content.as_bytes());
        hasher.update([0xffu8]);
    }
    hex::encode(&hasher.finalize()[..8])
}
