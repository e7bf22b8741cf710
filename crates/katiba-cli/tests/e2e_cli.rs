//! End-to-end tests for the `katiba` binary.
//!
//! Each test runs the binary as a subprocess against the fixture corpus, with
//! indexes in an isolated temp directory and no user config or credentials.
//! The config pins the hash embedder so results do not depend on which
//! embedding backends the binary was built with.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let fixture =
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/articles.json");
        std::fs::copy(&fixture, dir.path().join("articles.json")).expect("copy corpus");
        std::fs::write(
            dir.path().join("katiba.toml"),
            "[search]\nembedder = \"hash\"\n",
        )
        .expect("write config");
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    /// `katiba` rooted in the workspace with the fixture corpus and data dir.
    fn katiba(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("katiba"));
        cmd.current_dir(self.path());
        cmd.env("KATIBA_CONFIG", self.path().join("katiba.toml"));
        cmd.env("KATIBA_LOG", "error");
        for var in [
            "KATIBA_FORMAT",
            "KATIBA_DATA_DIR",
            "KATIBA_CORPUS",
            "LLM_API_KEY",
            "LLM_MODEL_NAME",
            "LLM_BASE_URL",
        ] {
            cmd.env_remove(var);
        }
        cmd.arg("--corpus")
            .arg(self.path().join("articles.json"))
            .arg("--data-dir")
            .arg(self.data_dir());
        cmd
    }
}

/// Answer one chat-completions request with `content`.
fn fake_llm(content: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}/v1", listener.local_addr().expect("addr"));
    let body = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
    .to_string();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let n = stream.read(&mut chunk).expect("read");
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().expect("length"))
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length || n == 0 {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let reply = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(reply.as_bytes()).expect("write");
    });
    url
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

#[test]
fn search_prints_articles_with_chapter() {
    let ws = Workspace::new();
    let output = ws
        .katiba()
        .args(["--format", "text", "search", "Who holds sovereign power?"])
        .output()
        .expect("run");
    assert!(
        output.status.success(),
        "search failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
    assert!(text.contains("chapter"), "no chapter in output: {text}");
    assert!(text.starts_with("1  article 1 "), "unexpected first row: {text}");
}

#[test]
fn search_json_envelope() {
    let ws = Workspace::new();
    let output = ws
        .katiba()
        .args(["search", "Who holds sovereign power?", "-n", "3", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["query"], "Who holds sovereign power?");
    assert_eq!(json["mode"], "hybrid");
    assert_eq!(json["count"], 3);
    let results = json["results"].as_array().expect("results array");
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["number"], 1);
    assert!(results[0]["chapter"].is_string());
    assert!(results[0]["score"].as_f64().expect("score") > 0.0);
}

#[test]
fn search_single_index_modes() {
    let ws = Workspace::new();
    for (flag, mode, rank_field) in [
        ("--lexical", "lexical", "lexical_rank"),
        ("--semantic", "semantic", "semantic_rank"),
    ] {
        let output = ws
            .katiba()
            .args(["--format", "json", "search", "sovereign power", flag])
            .output()
            .expect("run");
        assert!(output.status.success(), "{flag} failed");
        let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
        assert_eq!(json["mode"], mode);
        assert_eq!(json["results"][0][rank_field], 1);
    }
}

#[test]
fn search_full_includes_clauses() {
    let ws = Workspace::new();
    ws.katiba()
        .args(["--format", "text", "search", "sovereign power", "--full", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All sovereign power belongs to the people"));
}

#[test]
fn empty_query_is_rejected() {
    let ws = Workspace::new();
    ws.katiba()
        .args(["--format", "text", "search", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty_query"));
    assert!(!ws.data_dir().exists(), "empty query must not build indexes");
}

#[test]
fn missing_query_argument_is_a_usage_error() {
    let ws = Workspace::new();
    ws.katiba()
        .arg("search")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn conflicting_modes_are_a_usage_error() {
    let ws = Workspace::new();
    ws.katiba()
        .args(["search", "land", "--lexical", "--semantic"])
        .assert()
        .code(2);
}

#[test]
fn missing_corpus_reports_corpus_error() {
    let ws = Workspace::new();
    std::fs::remove_file(ws.path().join("articles.json")).expect("remove corpus");
    ws.katiba()
        .args(["--format", "text", "search", "land"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn corrupt_index_reports_index_unavailable_as_json() {
    let ws = Workspace::new();
    let lexical = ws.data_dir().join("lexical_index");
    std::fs::create_dir_all(&lexical).expect("mkdir");
    std::fs::write(lexical.join("index.sqlite3"), b"definitely not sqlite").expect("write");

    let output = ws
        .katiba()
        .args(["--format", "json", "search", "land", "--lexical"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(json["error"]["error_code"], "E2001");
    assert!(json["error"]["suggestion"].is_string());
}

// ---------------------------------------------------------------------------
// index
// ---------------------------------------------------------------------------

#[test]
fn index_builds_both_locations() {
    let ws = Workspace::new();
    let output = ws
        .katiba()
        .args(["--format", "json", "index"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["articles"], 7);
    assert_eq!(json["lexical"]["populated"], true);
    assert_eq!(json["semantic"]["meta"]["kind"], "semantic");
    assert!(ws.data_dir().join("lexical_index/index.sqlite3").is_file());
    assert!(ws.data_dir().join("semantic_index/index.sqlite3").is_file());
}

#[test]
fn index_rebuild_replaces_corrupt_index() {
    let ws = Workspace::new();
    let semantic = ws.data_dir().join("semantic_index");
    std::fs::create_dir_all(&semantic).expect("mkdir");
    std::fs::write(semantic.join("index.sqlite3"), b"garbage").expect("write");

    ws.katiba()
        .args(["--format", "text", "index", "--rebuild"])
        .assert()
        .success()
        .stdout(predicate::str::contains("semantic\t").and(predicate::str::contains("7 articles")));
}

// ---------------------------------------------------------------------------
// ask
// ---------------------------------------------------------------------------

#[test]
fn ask_without_credentials_fails() {
    let ws = Workspace::new();
    ws.katiba()
        .args(["--format", "text", "ask", "Who holds sovereign power?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E5001").and(predicate::str::contains("LLM_")));
}

#[test]
fn ask_prints_answer_notice_and_context() {
    let ws = Workspace::new();
    let url = fake_llm("Sovereign power belongs to the people of Kenya.");
    ws.katiba()
        .env("LLM_API_KEY", "test-key")
        .env("LLM_MODEL_NAME", "test-model")
        .env("LLM_BASE_URL", url)
        .args(["--format", "text", "ask", "Who holds sovereign power?", "-n", "2"])
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with("Sovereign power belongs to the people of Kenya.")
                .and(predicate::str::contains("AI-generated content"))
                .and(predicate::str::contains("Context:"))
                .and(predicate::str::contains("Sovereignty of the people")),
        );
}

// ---------------------------------------------------------------------------
// completions
// ---------------------------------------------------------------------------

#[test]
fn completions_bash() {
    let ws = Workspace::new();
    ws.katiba()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("katiba"));
}
