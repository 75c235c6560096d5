//! Naming-heuristic tables: ordered alias lists per role, per turn-role token and per turn key.
//! Priority is list order; the tables are plain data and can be replaced through configuration.

use crate::record::{FieldRole, TurnRole};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const INSTRUCTION_ALIASES: &[&str] = &[
    "system_prompt", "instruction", "system", "instructions", "system_message",
];
const INPUT_ALIASES: &[&str] = &[
    "user_message", "input", "question", "prompt", "user_query", "query", "user", "human", "Q",
    "user_input", "context",
];
const OUTPUT_ALIASES: &[&str] = &[
    "bot_message", "output", "answer", "response", "bot_reply", "completion", "bot", "assistant",
    "A", "reply", "target",
];
const CONVERSATION_ID_ALIASES: &[&str] = &[
    "conversation_id", "conversationId", "conv_id", "dialog_id", "dialogue_id", "thread_id",
    "session_id", "chat_id",
];

const TURN_ROLE_KEYS: &[&str] = &["role", "from", "speaker", "author", "sender"];
const TURN_CONTENT_KEYS: &[&str] = &["content", "text", "message", "value", "utterance", "body"];

const SYSTEM_TOKENS: &[&str] = &["system", "system_prompt", "sys", "instruction"];
const USER_TOKENS: &[&str] = &["user", "human", "prompter", "customer", "client", "question"];
const ASSISTANT_TOKENS: &[&str] = &["assistant", "bot", "gpt", "model", "ai", "chatbot", "agent", "answer"];

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTables {
    pub instruction: Vec<String>,
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub conversation_id: Vec<String>,
    pub turn_role_keys: Vec<String>,
    pub turn_content_keys: Vec<String>,
    pub system_roles: Vec<String>,
    pub user_roles: Vec<String>,
    pub assistant_roles: Vec<String>,
}

impl Default for AliasTables {
    fn default() -> Self {
        Self {
            instruction: owned(INSTRUCTION_ALIASES),
            input: owned(INPUT_ALIASES),
            output: owned(OUTPUT_ALIASES),
            conversation_id: owned(CONVERSATION_ID_ALIASES),
            turn_role_keys: owned(TURN_ROLE_KEYS),
            turn_content_keys: owned(TURN_CONTENT_KEYS),
            system_roles: owned(SYSTEM_TOKENS),
            user_roles: owned(USER_TOKENS),
            assistant_roles: owned(ASSISTANT_TOKENS),
        }
    }
}

impl AliasTables {
    /// Alias list for a field role. Conversation fields are found structurally, so that list is empty.
    pub fn for_role(&self, role: FieldRole) -> &[String] {
        match role {
            FieldRole::Instruction => &self.instruction,
            FieldRole::Input => &self.input,
            FieldRole::Output => &self.output,
            FieldRole::ConversationId => &self.conversation_id,
            FieldRole::Conversation => &[],
        }
    }

    /// Map a turn's role token (e.g. "human", "gpt") to a canonical speaker.
    pub fn turn_role(&self, token: &str) -> Option<TurnRole> {
        let t = token.trim();
        let hit = |list: &[String]| list.iter().any(|a| a.eq_ignore_ascii_case(t));
        if hit(&self.system_roles) {
            Some(TurnRole::System)
        } else if hit(&self.user_roles) {
            Some(TurnRole::User)
        } else if hit(&self.assistant_roles) {
            Some(TurnRole::Assistant)
        } else {
            None
        }
    }

    /// True when `v` is a mapping carrying both a role-like and a content-like key.
    pub fn is_turn_object(&self, v: &Value) -> bool {
        match v.as_object() {
            Some(obj) => {
                first_present(obj, &self.turn_role_keys, |_| true).is_some()
                    && first_present(obj, &self.turn_content_keys, |_| true).is_some()
            }
            None => false,
        }
    }

    /// A list with at least one turn-shaped mapping.
    pub fn looks_like_turns(&self, v: &Value) -> bool {
        match v {
            Value::Array(items) => items.iter().any(|it| self.is_turn_object(it)),
            _ => false,
        }
    }
}

/// First alias (in priority order) present in `map` whose value passes `accept`.
/// An exact key match beats an ASCII case-insensitive one for the same alias.
pub fn first_present<'m>(
    map: &'m Map<String, Value>,
    aliases: &[String],
    accept: impl Fn(&Value) -> bool,
) -> Option<&'m String> {
    for alias in aliases {
        if let Some((k, v)) = map.get_key_value(alias.as_str()) {
            if accept(v) {
                return Some(k);
            }
        }
        if let Some((k, _)) = map
            .iter()
            .find(|(k, v)| k.as_str() != alias && k.eq_ignore_ascii_case(alias) && accept(v))
        {
            return Some(k);
        }
    }
    None
}
