#[path = "common/mod.rs"]
mod common;

use common::*;
use convector::{
    parse_predicate, AliasTables, CanonicalRecord, CompiledFilter, Convector, ConvectorError, FieldMapper,
    FieldOverrides, FlatTriple, Operator, RecordShape,
};
use serde_json::{json, Map, Value};

fn run_with_filters(filters: &[&str], retained: &[&str], records: Vec<Value>) -> anyhow::Result<Vec<Value>> {
    let mut out: Vec<String> = Vec::new();
    Convector::new()
        .filters(filters.iter().copied())
        .retain_fields(retained.iter().copied())
        .progress(false)
        .transform_records("mem", &[], raw_records(records), &mut out)?;
    Ok(parse_lines(&out))
}

/// `id,<,10500` over ids 10499, 10500, 10501 keeps only 10499.
#[test]
fn numeric_less_than() {
    let records = vec![
        json!({"id": 10499, "input": "a", "output": "x"}),
        json!({"id": 10500, "input": "b", "output": "y"}),
        json!({"id": 10501, "input": "c", "output": "z"}),
    ];
    let v = run_with_filters(&["id,<,10500"], &["id"], records).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0]["id"], json!(10499));
    assert_eq!(v[0]["input"], json!("a"));
}

/// Inline predicates combine with AND; numbers stored as strings still compare numerically.
#[test]
fn inline_predicates_and_together() {
    let records = vec![
        json!({"input": "1", "output": "o", "score": "5", "lang": "en"}),
        json!({"input": "2", "output": "o", "score": "2", "lang": "en"}),
        json!({"input": "3", "output": "o", "score": 10, "lang": "de"}),
        json!({"input": "4", "output": "o", "score": 3, "lang": "en"}),
    ];
    let v = run_with_filters(&["score >= 3", "lang=en"], &["score", "lang"], records).unwrap();
    let inputs: Vec<&str> = v.iter().map(|r| r["input"].as_str().unwrap()).collect();
    assert_eq!(inputs, ["1", "4"]);
}

/// Canonical fields can be filtered without being retained.
#[test]
fn filter_on_canonical_field() {
    let records = vec![
        json!({"question": "keep", "answer": "yes"}),
        json!({"question": "drop", "answer": "no"}),
    ];
    let v = run_with_filters(&["output!=no"], &[], records).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0]["input"], json!("keep"));
}

/// A missing field compares as the empty string.
#[test]
fn missing_field_is_empty_string() {
    let records = vec![
        json!({"input": "tagged", "output": "o", "tag": "t"}),
        json!({"input": "untagged", "output": "o"}),
    ];
    let v = run_with_filters(&["tag="], &["tag"], records).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0]["input"], json!("untagged"));
    assert_eq!(v[0]["tag"], json!(""));
}

/// A numeric comparison against a non-numeric record value drops the record without failing.
#[test]
fn non_numeric_record_value_fails_predicate() {
    let records = vec![
        json!({"input": "a", "output": "o", "score": "high"}),
        json!({"input": "b", "output": "o", "score": 9}),
    ];
    let v = run_with_filters(&["score,>,1"], &["score"], records).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0]["input"], json!("b"));
}

/// Unknown fields are configuration errors naming the known ones.
#[test]
fn unknown_filter_field_is_fatal() {
    let err = run_with_filters(&["rating>3"], &[], vec![json!({"input": "a", "output": "b"})]).unwrap_err();
    match err.downcast_ref::<ConvectorError>() {
        Some(ConvectorError::Configuration { message }) => {
            assert!(message.contains("rating"), "{message}");
            assert!(message.contains("instruction"), "{message}");
        }
        other => panic!("expected Configuration, got {other:?}"),
    }
}

/// Unknown operators are rejected at parse time.
#[test]
fn unknown_operator_is_fatal() {
    for spec in ["score,=>,3", "score<>3", "score,~,3"] {
        let err = parse_predicate(spec).unwrap_err();
        assert!(matches!(err, ConvectorError::Configuration { .. }), "{spec}: {err:?}");
    }
}

/// Ordering operators need a numeric literal.
#[test]
fn ordering_on_text_literal_is_a_type_error() {
    let err = parse_predicate("lang,<,abc").unwrap_err();
    match err {
        ConvectorError::FilterType { predicate, value } => {
            assert_eq!(predicate, "lang,<,abc");
            assert_eq!(value, "abc");
        }
        other => panic!("expected FilterType, got {other:?}"),
    }
}

/// Comma form keeps commas inside the value.
#[test]
fn comma_form_value_may_contain_commas() {
    let p = parse_predicate("output,=,a, b,c").unwrap();
    assert_eq!(p.field, "output");
    assert_eq!(p.op, Operator::Eq);
    assert_eq!(p.value, "a, b,c");
    assert_eq!(p.number, None);

    let p = parse_predicate("  score  <=  2.5 ").unwrap();
    assert_eq!((p.field.as_str(), p.op, p.number), ("score", Operator::Le, Some(2.5)));
}

/// Filtering an already-filtered stream with the same predicates drops nothing further.
#[test]
fn filtering_is_idempotent() {
    let aliases = AliasTables::default();
    let sample = json!({"input": "i", "output": "o", "n": 1});
    let shape = RecordShape::from_samples([sample.as_object().unwrap()], &[]);
    let retained = vec!["n".to_string()];
    let map = FieldMapper::new(&aliases, false)
        .resolve(&shape, &FieldOverrides::default(), &retained, "mem")
        .unwrap();
    let filter = CompiledFilter::compile(&["n,>=,3", "n!=7"], &map).unwrap();

    let records: Vec<CanonicalRecord> = (0..10)
        .map(|n| {
            let mut kept = Map::new();
            kept.insert("n".into(), json!(n));
            CanonicalRecord::flat(FlatTriple::default(), kept)
        })
        .collect();

    let once: Vec<&CanonicalRecord> = records.iter().filter(|r| filter.matches(r)).collect();
    let twice: Vec<&CanonicalRecord> = once.iter().copied().filter(|r| filter.matches(r)).collect();
    assert_eq!(once.len(), 6);
    assert_eq!(once, twice);
}
