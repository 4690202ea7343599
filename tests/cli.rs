//! Runs the `lex` binary against temporary corpora.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn lex(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lex"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run lex")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn write_corpus(dir: &Path, lines: &[&str]) -> String {
    let path = dir.join("corpus.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path.to_string_lossy().into_owned()
}

const CORPUS: &[&str] = &[
    r#"{"id":"tx-lease","title":"Texas Residential Lease Act","content":"A landlord must make diligent efforts to repair conditions affecting health or safety.","jurisdiction":"texas","authority_level":"primary","document_type":"statute","practice_areas":["real_estate"],"authority_score":0.9,"recency_timestamp":1700000000}"#,
    r#"{"id":"oh-lease","title":"Ohio Landlord Duties","content":"A landlord shall keep the premises in a fit and habitable condition.","jurisdiction":"ohio","authority_level":"primary","document_type":"statute","practice_areas":["real_estate"],"authority_score":0.8,"recency_timestamp":1690000000}"#,
    r#"{"id":"tx-noncompete","title":"Covenants Not to Compete","content":"A covenant not to compete is enforceable if ancillary to an otherwise enforceable agreement.","jurisdiction":"texas","authority_level":"primary","document_type":"statute","practice_areas":["employment"],"authority_score":0.85,"recency_timestamp":1710000000}"#,
];

#[test]
fn test_search_returns_ranked_json() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path(), CORPUS);
    let output = lex(&[
        "search",
        &corpus,
        "landlord repair duties",
        "--tier",
        "exploration",
        "--filter",
        "jurisdiction=texas",
    ]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["tier"], "exploration");
    assert_eq!(json["index"], "documents");
    let results = json["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r["jurisdiction"] == "texas"));
    assert_eq!(results[0]["id"], "tx-lease");
    assert!(results[0]["per_space"]["content"].is_number());
}

#[test]
fn test_search_with_no_matches_is_success() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path(), CORPUS);
    let output = lex(&["search", &corpus, "landlord", "--filter", "jurisdiction=alaska"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
    assert!(json.get("error").is_none());
}

#[test]
fn test_search_error_payload() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path(), CORPUS);
    let output = lex(&["search", &corpus, "landlord", "--weight", "sentiment=1.0"]);
    assert!(!output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["error"]["kind"], "query_composition_error");
    assert_eq!(json["error"]["retryable"], false);
}

#[test]
fn test_deep_dive_includes_provenance() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path(), CORPUS);
    let output = lex(&["search", &corpus, "covenant not to compete", "--tier", "deep-dive"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["index"], "chunks");
    let first = &json["results"][0];
    assert_eq!(first["entity_type"], "chunk");
    assert_eq!(first["provenance"]["parent_id"], "tx-noncompete");
}

#[test]
fn test_validate_reports_invalid_records() {
    let dir = TempDir::new().unwrap();
    let mut lines = CORPUS.to_vec();
    lines.push(r#"{"id":"broken","title":"No Jurisdiction","content":"text"}"#);
    let corpus = write_corpus(dir.path(), &lines);

    let output = lex(&["validate", &corpus]);
    assert!(!output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["records"], 4);
    assert_eq!(json["valid"], 3);
    assert_eq!(json["failures"][0]["line"], 4);
    assert_eq!(json["failures"][0]["kind"], "validation_error");

    let valid = write_corpus(dir.path(), CORPUS);
    assert!(lex(&["validate", &valid]).status.success());
}

#[test]
fn test_chunk_prints_spans() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statute.txt");
    std::fs::write(&path, "y".repeat(4500)).unwrap();

    let output = lex(&["chunk", path.to_str().unwrap()]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    let starts: Vec<u64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["start"].as_u64().unwrap())
        .collect();
    assert_eq!(starts, vec![0, 1800, 3600]);

    let output = lex(&["chunk", path.to_str().unwrap(), "--chunk-size", "100", "--overlap", "100"]);
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error"]["kind"], "chunking_config_error");
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("lexspace.toml");
    std::fs::write(&config, "[chunking]\nchunk_size = 1000\noverlap = 100\n").unwrap();
    let path = dir.path().join("statute.txt");
    std::fs::write(&path, "z".repeat(2500)).unwrap();

    let output = lex(&["--config", config.to_str().unwrap(), "chunk", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output).as_array().unwrap().len(), 3);
}
