#[path = "common/mod.rs"]
mod common;

use common::*;
use convector::{Convector, LimitGovernor, LimitScope, Limits, NdjsonWriter};
use serde_json::{json, Value};

fn numbered(n: usize) -> Vec<Value> {
    (1..=n).map(|i| json!({"input": format!("q{i}"), "output": format!("a{i}")})).collect()
}

/// Row limit 333 over 1000 qualifying records: exactly the first 333, in order, and the
/// 334th record is never read.
#[test]
fn row_limit_is_exact_and_ordered() {
    let base = scratch_dir();
    let input = base.join("big.jsonl");
    write_jsonl(&input, &numbered(1000));
    let out_dir = base.join("out");

    let run = Convector::new().max_rows(333).output_dir(&out_dir).progress(false).transform(&input).unwrap();

    let v = read_jsonl_values(&out_dir.join("big_tr.jsonl"));
    assert_eq!(v.len(), 333);
    for (i, rec) in v.iter().enumerate() {
        assert_eq!(rec["input"], json!(format!("q{}", i + 1)));
    }
    let s = &run.sources[0];
    assert_eq!(s.emitted, 333);
    assert_eq!(s.records_read, 333);
    assert!(s.limit_reached);
    assert!(run.limit_reached);
}

/// The record whose bytes cross the cap is written and is the last one.
#[test]
fn byte_limit_includes_crossing_record() {
    let mut probe: Vec<String> = Vec::new();
    Convector::new()
        .progress(false)
        .transform_records("mem", &[], raw_records(numbered(1)), &mut probe)
        .unwrap();
    let line_bytes = probe[0].len() as u64 + 1;

    let mut out: Vec<String> = Vec::new();
    let summary = Convector::new()
        .max_bytes(2 * line_bytes + 1)
        .progress(false)
        .transform_records("mem", &[], raw_records(numbered(9)), &mut out)
        .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(summary.bytes, 3 * line_bytes);
    assert!(summary.limit_reached);
}

/// Bytes count the serialized line plus its newline, matching the file on disk.
#[test]
fn byte_accounting_matches_file_size() {
    let base = scratch_dir();
    let input = base.join("u.jsonl");
    write_jsonl(&input, &[json!({"input": "héllo ✓", "output": "wörld"}), json!({"input": "b", "output": "c"})]);
    let out_dir = base.join("out");

    let run = Convector::new().output_dir(&out_dir).progress(false).transform(&input).unwrap();
    let on_disk = std::fs::metadata(out_dir.join("u_tr.jsonl")).unwrap().len();
    assert_eq!(run.total_bytes(), on_disk);
    assert!(!run.limit_reached);
}

/// The writer's own counters agree with the file it produced.
#[test]
fn writer_counts_lines_and_bytes() {
    let path = scratch_dir().join("w.jsonl");
    let mut w = NdjsonWriter::create(&path, 0).unwrap();
    w.write_line(r#"{"input":"é"}"#).unwrap();
    w.write_line("{}").unwrap();
    assert_eq!(w.lines(), 2);
    let bytes = w.bytes();
    w.finish().unwrap();
    assert_eq!(bytes, std::fs::metadata(&path).unwrap().len());
}

/// Global scope: the cap spans the run, later sources are not started.
#[test]
fn global_scope_spans_sources() {
    let base = scratch_dir();
    let data = base.join("data");
    write_jsonl(&data.join("a.jsonl"), &numbered(5));
    write_jsonl(&data.join("b.jsonl"), &numbered(5));
    let out_dir = base.join("out");

    let run = Convector::new()
        .max_rows(3)
        .limit_scope(LimitScope::Global)
        .output_dir(&out_dir)
        .progress(false)
        .transform(&data)
        .unwrap();

    assert_eq!(run.total_emitted(), 3);
    assert_eq!(read_jsonl_values(&out_dir.join("a_tr.jsonl")).len(), 3);
    assert!(!out_dir.join("b_tr.jsonl").exists());
    assert_eq!(run.sources_not_started, ["b.jsonl"]);
}

/// Per-source scope: every source gets its own budget.
#[test]
fn per_source_scope_restarts_counters() {
    let base = scratch_dir();
    let data = base.join("data");
    write_jsonl(&data.join("a.jsonl"), &numbered(5));
    write_jsonl(&data.join("b.jsonl"), &numbered(5));
    let out_dir = base.join("out");

    let run = Convector::new()
        .max_rows(3)
        .limit_scope(LimitScope::PerSource)
        .output_dir(&out_dir)
        .progress(false)
        .transform(&data)
        .unwrap();

    assert_eq!(run.total_emitted(), 6);
    assert_eq!(read_jsonl_values(&out_dir.join("a_tr.jsonl")).len(), 3);
    assert_eq!(read_jsonl_values(&out_dir.join("b_tr.jsonl")).len(), 3);
    assert!(run.sources_not_started.is_empty());
}

/// Parallel sources share one global budget without overshooting it.
#[test]
fn global_scope_holds_under_concurrency() {
    let base = scratch_dir();
    let data = base.join("data");
    for name in ["a", "b", "c", "d"] {
        write_jsonl(&data.join(format!("{name}.jsonl")), &numbered(50));
    }
    let out_dir = base.join("out");

    let run = Convector::new()
        .max_rows(60)
        .file_concurrency(4)
        .output_dir(&out_dir)
        .progress(false)
        .transform(&data)
        .unwrap();

    assert_eq!(run.total_emitted(), 60);
    let on_disk: usize = ["a", "b", "c", "d"]
        .iter()
        .map(|n| out_dir.join(format!("{n}_tr.jsonl")))
        .filter(|p| p.exists())
        .map(|p| read_lines(&p).len())
        .sum();
    assert_eq!(on_disk, 60);
}

/// Governor arithmetic: either cap stops admission; unbounded never does.
#[test]
fn governor_admission() {
    let mut g = LimitGovernor::new(Limits::new(Some(2), None));
    assert!(g.admit(10));
    assert!(g.admit(10));
    assert!(!g.admit(10));
    assert_eq!((g.rows(), g.bytes()), (2, 20));

    let mut g = LimitGovernor::new(Limits::new(None, Some(15)));
    assert!(g.admit(10));
    assert!(g.admit(10));
    assert!(!g.should_continue());
    assert!(!g.admit(1));

    let mut g = LimitGovernor::new(Limits::default());
    assert!(g.limits().is_unbounded());
    for _ in 0..1000 {
        assert!(g.admit(1_000_000));
    }
}

/// Random selection draws the row cap's worth of records from the whole file, keeps file
/// order, and repeats itself for a fixed seed.
#[test]
fn seeded_random_selection() {
    let base = scratch_dir();
    let input = base.join("pool.jsonl");
    write_jsonl(&input, &numbered(200));

    let pick = |out: &str| {
        let out_dir = base.join(out);
        let run = Convector::new()
            .max_rows(10)
            .random(true)
            .random_seed(7)
            .output_dir(&out_dir)
            .progress(false)
            .transform(&input)
            .unwrap();
        assert_eq!(run.sources[0].records_read, 10);
        read_jsonl_values(&out_dir.join("pool_tr.jsonl"))
            .iter()
            .map(|v| v["input"].as_str().unwrap()[1..].parse::<u32>().unwrap())
            .collect::<Vec<u32>>()
    };

    let first = pick("out1");
    assert_eq!(first.len(), 10);
    assert!(first.windows(2).all(|w| w[0] < w[1]), "file order, no repeats: {first:?}");
    assert!(first.iter().all(|n| (1..=200).contains(n)));
    assert_eq!(first, pick("out2"));
}

/// Asking for more records than a source holds selects all of them.
#[test]
fn random_selection_smaller_source() {
    let mut out: Vec<String> = Vec::new();
    let summary = Convector::new()
        .max_rows(50)
        .random(true)
        .progress(false)
        .transform_records("mem", &[], raw_records(numbered(4)), &mut out)
        .unwrap();
    assert_eq!(summary.emitted, 4);
    assert_eq!(parse_lines(&out)[3]["input"], json!("q4"));
}

/// Random selection is defined by a row cap; without one the run is rejected up front.
#[test]
fn random_selection_needs_row_limit() {
    let base = scratch_dir();
    let input = base.join("pool.jsonl");
    write_jsonl(&input, &numbered(3));
    let out_dir = base.join("out");

    let res = Convector::new().random(true).max_bytes(1000).output_dir(&out_dir).progress(false).transform(&input);
    assert!(res.is_err());
    assert!(!out_dir.exists());
}
