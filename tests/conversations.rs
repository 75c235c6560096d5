#[path = "common/mod.rs"]
mod common;

use common::*;
use convector::{
    AliasTables, CanonicalRecord, Conversation, ConversationFlattener, ConversationIds, Convector, IdStrategy,
    SchemaKind, Turn, TurnRole,
};
use serde_json::{json, Map};

fn sua() -> serde_json::Value {
    json!({"messages": [
        {"role": "system", "content": "S"},
        {"role": "user", "content": "U"},
        {"role": "assistant", "content": "A"}
    ]})
}

/// S/U/A through the default schema lands on instruction/input/output.
#[test]
fn conversation_to_default_schema() {
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .progress(false)
        .transform_records("chat", &[], raw_records(vec![sua()]), &mut out)
        .unwrap();

    let v = parse_lines(&out);
    assert_eq!(v.len(), 1);
    assert_eq!(v[0]["instruction"], json!("S"));
    assert_eq!(v[0]["input"], json!("U"));
    assert_eq!(v[0]["output"], json!("A"));
    assert_eq!(v[0]["source"], json!("chat"));
}

/// S/U/A through the chat schema keeps every turn, in order, with canonical role names.
#[test]
fn conversation_to_chat_schema() {
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .schema(SchemaKind::ChatCompletion)
        .progress(false)
        .transform_records("chat", &[], raw_records(vec![sua()]), &mut out)
        .unwrap();

    let v = parse_lines(&out);
    assert_eq!(
        v[0]["messages"],
        json!([
            {"role": "system", "content": "S"},
            {"role": "user", "content": "U"},
            {"role": "assistant", "content": "A"}
        ])
    );
    assert!(v[0].get("instruction").is_none());
}

/// Multi-turn conversations are not truncated by the chat projection.
#[test]
fn chat_schema_keeps_later_turns() {
    let rec = json!({"conversations": [
        {"from": "human", "value": "q1"},
        {"from": "gpt", "value": "a1"},
        {"from": "human", "value": "q2"},
        {"from": "gpt", "value": "a2"}
    ]});
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .schema(SchemaKind::ChatCompletion)
        .progress(false)
        .transform_records("sharegpt", &[], raw_records(vec![rec]), &mut out)
        .unwrap();

    let msgs = parse_lines(&out)[0]["messages"].as_array().unwrap().clone();
    let roles: Vec<&str> = msgs.iter().map(|m| m["role"].as_str().unwrap()).collect();
    let texts: Vec<&str> = msgs.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(roles, ["user", "assistant", "user", "assistant"]);
    assert_eq!(texts, ["q1", "a1", "q2", "a2"]);
}

/// Two conversations without a source id get distinct generated ids, in input order.
#[test]
fn generated_ids_are_distinct_and_ordered() {
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .retain_fields(["conversation_id"])
        .progress(false)
        .transform_records("chat", &[], raw_records(vec![sua(), sua()]), &mut out)
        .unwrap();

    let v = parse_lines(&out);
    assert_eq!(v[0]["conversation_id"], json!("conv-000001"));
    assert_eq!(v[1]["conversation_id"], json!("conv-000002"));
}

/// A source-provided identifier is reused as the conversation id.
#[test]
fn source_ids_are_kept() {
    let rec = json!({"thread_id": 42, "turns": [{"role": "user", "content": "hi"}]});
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .retain_fields(["conversation_id"])
        .progress(false)
        .transform_records("t", &[], raw_records(vec![rec]), &mut out)
        .unwrap();
    assert_eq!(parse_lines(&out)[0]["conversation_id"], json!("42"));
}

/// Content hashing gives identical conversations the same id and different ones different ids.
/// The value is pinned: it must not change between builds or machines.
#[test]
fn content_hash_ids() {
    let ids = ConversationIds::new(IdStrategy::ContentHash);
    let a = vec![Turn::new(TurnRole::User, "hi"), Turn::new(TurnRole::Assistant, "hello")];
    let b = vec![Turn::new(TurnRole::User, "hi"), Turn::new(TurnRole::Assistant, "bye")];
    let ha = ids.assign(None, &a);
    assert_eq!(ha, "8ca06c5586928a02");
    assert_eq!(ha, ids.assign(None, &a));
    assert_ne!(ha, ids.assign(None, &b));
    assert_eq!(ids.generated(), 0, "hash ids do not consume the ordinal counter");
}

/// Unparseable turns are dropped and counted; the rest of the conversation survives.
#[test]
fn bad_turns_are_dropped_and_counted() {
    let rec = json!({"messages": [
        {"role": "user", "content": "u"},
        "stray scalar",
        {"role": "narrator", "content": "unknown role"},
        {"role": "assistant"},
        {"role": "assistant", "content": "a"}
    ]});
    let mut out: Vec<String> = Vec::new();
    let summary = Convector::new()
        .progress(false)
        .transform_records("m", &[], raw_records(vec![rec]), &mut out)
        .unwrap();

    assert_eq!(summary.dropped_turns, 3);
    assert_eq!(summary.emitted, 1);
    let v = parse_lines(&out);
    assert_eq!(v[0]["input"], json!("u"));
    assert_eq!(v[0]["output"], json!("a"));
}

/// A conversation with no usable turns is not emitted; it is counted as skipped.
#[test]
fn empty_conversations_are_skipped() {
    let records = vec![
        json!({"messages": [{"role": "user", "content": "kept"}]}),
        json!({"messages": []}),
        json!({"messages": [{"role": "oracle", "content": "nope"}]}),
    ];
    let mut out: Vec<String> = Vec::new();
    let summary = Convector::new()
        .progress(false)
        .transform_records("m", &[], raw_records(records), &mut out)
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(summary.empty_conversations, 2);
    assert_eq!(summary.skipped(), 2);
}

/// A plain list of strings alternates user and assistant.
#[test]
fn string_lists_alternate_speakers() {
    let aliases = AliasTables::default();
    let flat = ConversationFlattener::new(&aliases).flatten(&json!(["hello", "hi there", "bye"]));
    let roles: Vec<TurnRole> = flat.turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, [TurnRole::User, TurnRole::Assistant, TurnRole::User]);
    assert_eq!(flat.dropped_turns, 0);
}

/// The conversational toggle picks up a list-of-strings field.
#[test]
fn toggle_with_string_list() {
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .conversational(true)
        .progress(false)
        .transform_records("dialog", &[], raw_records(vec![json!({"lines": ["ping", "pong"]})]), &mut out)
        .unwrap();
    let v = parse_lines(&out);
    assert_eq!(v[0]["input"], json!("ping"));
    assert_eq!(v[0]["output"], json!("pong"));
}

/// CSV cells holding a JSON-encoded turn list are decoded before flattening.
#[test]
fn csv_embedded_conversation() {
    let base = scratch_dir();
    let input = base.join("chats.csv");
    let turns = json!([{"role": "user", "content": "from csv"}, {"role": "assistant", "content": "ok"}]).to_string();
    write_csv(&input, &["id", "dialogue"], &[vec!["7".into(), turns]]);
    let out_dir = base.join("out");

    let run = Convector::new()
        .output_dir(&out_dir)
        .retain_fields(["id"])
        .progress(false)
        .transform(&input)
        .unwrap();

    assert_eq!(run.total_emitted(), 1);
    let v = read_jsonl_values(&out_dir.join("chats_tr.jsonl"));
    assert_eq!(v[0]["input"], json!("from csv"));
    assert_eq!(v[0]["output"], json!("ok"));
    assert_eq!(v[0]["id"], json!("7"));
}

/// Canonical accessors on a hand-built conversation.
#[test]
fn canonical_record_views() {
    let conv = Conversation {
        conversation_id: "c1".into(),
        turns: vec![Turn::new(TurnRole::User, "u1"), Turn::new(TurnRole::User, "u2")],
    };
    let rec = CanonicalRecord::conversation(conv, Map::new());
    assert_eq!(rec.instruction(), "");
    assert_eq!(rec.input(), "u1");
    assert_eq!(rec.output(), "");
    assert_eq!(rec.conversation_id(), Some("c1"));
}

/// Ordinal ids follow source order even when parallel processing is requested.
#[test]
fn ordinal_ids_follow_source_order_under_concurrency() {
    let base = scratch_dir();
    let data = base.join("data");
    for name in ["a", "b", "c"] {
        write_jsonl(&data.join(format!("{name}.jsonl")), &[sua(), sua()]);
    }
    let out_dir = base.join("out");

    Convector::new()
        .retain_fields(["conversation_id"])
        .file_concurrency(4)
        .output_dir(&out_dir)
        .progress(false)
        .transform(&data)
        .unwrap();

    let ids: Vec<String> = ["a", "b", "c"]
        .iter()
        .flat_map(|n| read_jsonl_values(&out_dir.join(format!("{n}_tr.jsonl"))))
        .map(|v| v["conversation_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["conv-000001", "conv-000002", "conv-000003", "conv-000004", "conv-000005", "conv-000006"]);
}
