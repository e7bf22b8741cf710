//! Shared helpers for katiba-search integration tests.

use katiba_core::corpus::Corpus;
use std::path::{Path, PathBuf};

pub fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("articles.json")
}

pub fn fixture_corpus() -> Corpus {
    Corpus::load(&fixture_path()).expect("load fixture corpus")
}

pub fn numbers(articles: &[katiba_core::Article]) -> Vec<u32> {
    articles.iter().map(|a| a.number).collect()
}
