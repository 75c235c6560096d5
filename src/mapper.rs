//! Field-role resolution for one source: explicit overrides first, then alias heuristics, then
//! structural detection of a turn list. Runs once per source; the resulting map is immutable.

use crate::aliases::{first_present, AliasTables};
use crate::error::{ConvectorError, ConvectorResult};
use crate::record::{is_scalar, FieldRole, RawRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that the output schemas own; retained fields may not shadow them.
pub const RESERVED_OUTPUT_KEYS: [&str; 5] = ["instruction", "input", "output", "source", "messages"];

/// User-supplied raw field names per role. `None` means "let the heuristics decide".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOverrides {
    pub instruction: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub conversation: Option<String>,
    pub conversation_id: Option<String>,
}

impl FieldOverrides {
    pub fn get(&self, role: FieldRole) -> Option<&str> {
        match role {
            FieldRole::Instruction => self.instruction.as_deref(),
            FieldRole::Input => self.input.as_deref(),
            FieldRole::Output => self.output.as_deref(),
            FieldRole::Conversation => self.conversation.as_deref(),
            FieldRole::ConversationId => self.conversation_id.as_deref(),
        }
    }

    fn any_flat(&self) -> bool {
        self.instruction.is_some() || self.input.is_some() || self.output.is_some()
    }
}

/// How records of a source are canonicalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Flat,
    Conversation,
}

/// Resolved raw field per role, plus the retained field names. Built once per source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRoleMap {
    route: Route,
    instruction: Option<String>,
    input: Option<String>,
    output: Option<String>,
    conversation: Option<String>,
    conversation_id: Option<String>,
    retained: Vec<String>,
}

impl FieldRoleMap {
    pub fn route(&self) -> Route {
        self.route
    }

    pub fn is_conversational(&self) -> bool {
        self.route == Route::Conversation
    }

    /// Raw field supplying `role`, if one was resolved.
    pub fn field(&self, role: FieldRole) -> Option<&str> {
        match role {
            FieldRole::Instruction => self.instruction.as_deref(),
            FieldRole::Input => self.input.as_deref(),
            FieldRole::Output => self.output.as_deref(),
            FieldRole::Conversation => self.conversation.as_deref(),
            FieldRole::ConversationId => self.conversation_id.as_deref(),
        }
    }

    pub fn retained(&self) -> &[String] {
        &self.retained
    }
}

/// Merged view of a few sample records and the reader's declared columns:
/// field name -> first substantive value observed. A slot holding null, `""`, `[]` or `{}`
/// is replaced by a later non-empty value, so one empty record cannot hide a field's shape.
#[derive(Clone, Debug, Default)]
pub struct RecordShape {
    fields: Map<String, Value>,
}

impl RecordShape {
    pub fn from_samples<'a, I>(samples: I, columns: &[String]) -> Self
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut fields = Map::new();
        for c in columns {
            fields.entry(c.clone()).or_insert(Value::Null);
        }
        for rec in samples {
            for (k, v) in rec {
                match fields.get_mut(k) {
                    Some(slot) if is_vacant(slot) && !is_vacant(v) => *slot = v.clone(),
                    Some(_) => {}
                    None => {
                        fields.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Self { fields }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn is_vacant(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Decode a string cell that holds a JSON list (CSV exports of nested conversations).
pub(crate) fn embedded_list(v: &Value) -> Option<Value> {
    match v {
        Value::String(s) if s.trim_start().starts_with('[') => {
            serde_json::from_str::<Value>(s).ok().filter(|p| p.is_array())
        }
        _ => None,
    }
}

pub struct FieldMapper<'a> {
    aliases: &'a AliasTables,
    conversational: bool,
}

impl<'a> FieldMapper<'a> {
    /// `conversational` forces the conversation route (the user's conversational-mode toggle).
    pub fn new(aliases: &'a AliasTables, conversational: bool) -> Self {
        Self { aliases, conversational }
    }

    /// Resolve from a single representative record.
    pub fn resolve_sample(&self, sample: &RawRecord, overrides: &FieldOverrides) -> ConvectorResult<FieldRoleMap> {
        let shape = RecordShape::from_samples([sample], &[]);
        self.resolve(&shape, overrides, &[], "sample record")
    }

    pub fn resolve(
        &self,
        shape: &RecordShape,
        overrides: &FieldOverrides,
        retained: &[String],
        origin: &str,
    ) -> ConvectorResult<FieldRoleMap> {
        let checked = |role: FieldRole| -> ConvectorResult<Option<String>> {
            match overrides.get(role) {
                Some(field) if shape.contains(field) => Ok(Some(field.to_string())),
                Some(field) => Err(ConvectorError::UnknownOverrideField {
                    role,
                    field: field.to_string(),
                    origin: origin.to_string(),
                }),
                None => Ok(None),
            }
        };
        let instruction_o = checked(FieldRole::Instruction)?;
        let input_o = checked(FieldRole::Input)?;
        let output_o = checked(FieldRole::Output)?;
        let conversation_o = checked(FieldRole::Conversation)?;
        let conversation_id_o = checked(FieldRole::ConversationId)?;

        for name in retained {
            if RESERVED_OUTPUT_KEYS.contains(&name.as_str()) {
                return Err(ConvectorError::configuration(format!(
                    "retained field '{name}' collides with an output schema key"
                )));
            }
        }

        let fields = shape.fields();
        let scalar_alias = |role: FieldRole| first_present(fields, self.aliases.for_role(role), is_scalar).cloned();

        let route = if conversation_o.is_some() || self.conversational {
            Route::Conversation
        } else if overrides.any_flat() {
            Route::Flat
        } else if scalar_alias(FieldRole::Input).is_some() || scalar_alias(FieldRole::Output).is_some() {
            Route::Flat
        } else if self.find_turn_field(shape).is_some() {
            Route::Conversation
        } else {
            Route::Flat
        };

        let mut map = FieldRoleMap {
            route,
            instruction: None,
            input: None,
            output: None,
            conversation: None,
            conversation_id: None,
            retained: retained.to_vec(),
        };

        match route {
            Route::Flat => {
                map.instruction = instruction_o.or_else(|| scalar_alias(FieldRole::Instruction));
                map.input = input_o.or_else(|| scalar_alias(FieldRole::Input));
                map.output = output_o.or_else(|| scalar_alias(FieldRole::Output));
            }
            Route::Conversation => {
                if overrides.any_flat() {
                    tracing::warn!(%origin, "flat role overrides are ignored for conversational sources");
                }
                let conversation = conversation_o
                    .or_else(|| self.find_turn_field(shape))
                    .or_else(|| self.find_string_list_field(shape))
                    .ok_or_else(|| {
                        ConvectorError::configuration(format!(
                            "conversational mode requested but {origin} has no turn list field"
                        ))
                    })?;
                map.conversation_id = conversation_id_o.or_else(|| {
                    first_present(fields, &self.aliases.conversation_id, is_scalar)
                        .filter(|k| **k != conversation)
                        .cloned()
                });
                map.conversation = Some(conversation);
            }
        }

        for name in retained {
            if !shape.contains(name) && name != "conversation_id" {
                tracing::warn!(%origin, field = %name, "retained field not present in sampled records; it will be emitted as \"\"");
            }
        }

        Ok(map)
    }

    /// First field holding a list of turn-shaped mappings (directly or as an embedded JSON string).
    fn find_turn_field(&self, shape: &RecordShape) -> Option<String> {
        shape
            .fields()
            .iter()
            .find(|(_, v)| match embedded_list(v) {
                Some(parsed) => self.aliases.looks_like_turns(&parsed),
                None => self.aliases.looks_like_turns(v),
            })
            .map(|(k, _)| k.clone())
    }

    /// Plain-list conversations: a non-empty list made only of strings.
    fn find_string_list_field(&self, shape: &RecordShape) -> Option<String> {
        shape
            .fields()
            .iter()
            .find(|(_, v)| match v {
                Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_string),
                _ => false,
            })
            .map(|(k, _)| k.clone())
    }
}
