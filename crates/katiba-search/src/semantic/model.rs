//! Model files for the local sentence-transformer and the pooling applied to
//! its token vectors.
//!
//! A model directory holds `model.onnx` and `tokenizer.json`. Missing files
//! are downloaded from a Hugging Face style mirror into `<name>.tmp` and
//! renamed into place, so an interrupted download never leaves a truncated
//! model behind.

use super::embed::normalize;
use anyhow::{Context, bail};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MODEL_FILENAME: &str = "model.onnx";
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// (path inside the model repository, local file name)
const MODEL_FILES: [(&str, &str); 2] = [
    ("onnx/model.onnx", MODEL_FILENAME),
    ("tokenizer.json", TOKENIZER_FILENAME),
];

/// Paths of the files the local embedder loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join(MODEL_FILENAME),
            tokenizer: dir.join(TOKENIZER_FILENAME),
        }
    }

    #[must_use]
    pub fn are_present(&self) -> bool {
        self.model.is_file() && self.tokenizer.is_file()
    }
}

/// Download URL of `remote_path` in model repository `repo`.
#[must_use]
pub fn file_url(mirror: &str, repo: &str, remote_path: &str) -> String {
    format!(
        "{}/{repo}/resolve/main/{remote_path}",
        mirror.trim_end_matches('/')
    )
}

/// Download whichever model files are missing from `dir`.
///
/// # Errors
///
/// Fails if `dir` cannot be created, a download fails, or a file cannot be
/// written.
pub fn fetch_missing(
    agent: &ureq::Agent,
    mirror: &str,
    repo: &str,
    dir: &Path,
) -> anyhow::Result<ModelFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("create model directory {}", dir.display()))?;

    for (remote, local) in MODEL_FILES {
        let path = dir.join(local);
        if path.is_file() {
            continue;
        }
        let url = file_url(mirror, repo, remote);
        info!(%url, path = %path.display(), "downloading model file");

        let tmp = dir.join(format!("{local}.tmp"));
        let result = download(agent, &url, &tmp).and_then(|()| {
            fs::rename(&tmp, &path)
                .with_context(|| format!("move {} into place", tmp.display()))
        });
        if let Err(err) = result {
            match fs::remove_file(&tmp) {
                Err(cleanup) if cleanup.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        path = %tmp.display(),
                        error = %cleanup,
                        "could not remove partial download"
                    );
                }
                _ => {}
            }
            return Err(err);
        }
    }
    Ok(ModelFiles::in_dir(dir))
}

fn download(agent: &ureq::Agent, url: &str, to: &Path) -> anyhow::Result<()> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("download {url}"))?;
    let mut file = fs::File::create(to)
        .with_context(|| format!("create {}", to.display()))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("write {}", to.display()))?;
    file.sync_all()
        .with_context(|| format!("sync {}", to.display()))?;
    Ok(())
}

/// Mean of each input's unmasked token vectors, L2-normalized.
///
/// `hidden` is a row-major `[masks.len(), seq_len, dims]` tensor and
/// `masks[i]` is the attention mask of input `i`.
///
/// # Errors
///
/// Fails when the tensor or a mask does not have the stated shape.
pub fn mean_pool(
    hidden: &[f32],
    seq_len: usize,
    dims: usize,
    masks: &[&[u32]],
) -> anyhow::Result<Vec<Vec<f32>>> {
    let expected = masks.len() * seq_len * dims;
    if hidden.len() != expected {
        bail!(
            "model output has {} values, expected {expected} ({} x {seq_len} x {dims})",
            hidden.len(),
            masks.len()
        );
    }

    masks
        .iter()
        .enumerate()
        .map(|(item, mask)| {
            if mask.len() != seq_len {
                bail!("attention mask {item} has {} tokens, expected {seq_len}", mask.len());
            }
            let mut pooled = vec![0.0_f32; dims];
            let mut tokens = 0.0_f32;
            for (position, _) in mask.iter().enumerate().filter(|(_, m)| **m != 0) {
                let start = (item * seq_len + position) * dims;
                for (acc, value) in pooled.iter_mut().zip(&hidden[start..start + dims]) {
                    *acc += value;
                }
                tokens += 1.0;
            }
            if tokens > 0.0 {
                for value in &mut pooled {
                    *value /= tokens;
                }
            }
            normalize(&mut pooled);
            Ok(pooled)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn padding_tokens_do_not_count() {
        // Two inputs, three positions, two dims. The second input is padded.
        let hidden = [
            1.0, 0.0, 3.0, 0.0, 2.0, 0.0, //
            0.0, 4.0, 9.0, 9.0, 9.0, 9.0,
        ];
        let pooled = mean_pool(&hidden, 3, 2, &[&[1, 1, 1], &[1, 0, 0]]).expect("pool");
        assert_close(&pooled[0], &[1.0, 0.0]);
        assert_close(&pooled[1], &[0.0, 1.0]);
    }

    #[test]
    fn pooled_vectors_are_unit_length() {
        let hidden = [3.0, 4.0, 3.0, 4.0];
        let pooled = mean_pool(&hidden, 2, 2, &[&[1, 1]]).expect("pool");
        assert_close(&pooled[0], &[0.6, 0.8]);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let err = mean_pool(&[1.0, 2.0, 3.0], 2, 2, &[&[1, 1]]).expect_err("bad shape");
        assert!(err.to_string().contains("expected 4"));

        let err = mean_pool(&[1.0, 2.0, 3.0, 4.0], 2, 2, &[&[1]]).expect_err("bad mask");
        assert!(err.to_string().contains("attention mask 0"));
    }

    #[test]
    fn urls_follow_mirror_layout() {
        let url = file_url(
            "https://huggingface.co/",
            "sentence-transformers/multi-qa-MiniLM-L6-cos-v1",
            "onnx/model.onnx",
        );
        assert_eq!(
            url,
            "https://huggingface.co/sentence-transformers/multi-qa-MiniLM-L6-cos-v1\
             /resolve/main/onnx/model.onnx"
        );
    }

    #[test]
    fn present_files_are_not_downloaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MODEL_FILENAME), b"onnx").expect("write");
        fs::write(dir.path().join(TOKENIZER_FILENAME), b"{}").expect("write");

        // Nothing listens on the discard port; any request would fail.
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(200))
            .build();
        let files = fetch_missing(&agent, "http://127.0.0.1:9", "org/model", dir.path())
            .expect("no download needed");
        assert!(files.are_present());
    }

    #[test]
    fn missing_files_are_fetched_from_mirror() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let mirror = format!("http://{}", listener.local_addr().expect("addr"));
        let server = thread::spawn(move || {
            let mut paths = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut buf = [0_u8; 2048];
                let n = stream.read(&mut buf).expect("read");
                let head = String::from_utf8_lossy(&buf[..n]).into_owned();
                let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                let body = if path.ends_with(".onnx") { "weights" } else { "{}" };
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).expect("write");
                paths.push(path);
            }
            paths
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let model_dir = dir.path().join("models").join("org--model");
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        let files = fetch_missing(&agent, &mirror, "org/model", &model_dir).expect("fetch");

        let paths = server.join().expect("server");
        assert_eq!(
            paths,
            vec![
                "/org/model/resolve/main/onnx/model.onnx",
                "/org/model/resolve/main/tokenizer.json"
            ]
        );
        assert_eq!(fs::read_to_string(&files.model).expect("model"), "weights");
        assert!(files.tokenizer.is_file());
        assert!(!model_dir.join("model.onnx.tmp").exists());
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(200))
            .build();
        fetch_missing(&agent, "http://127.0.0.1:9", "org/model", dir.path())
            .expect_err("unreachable mirror");
        assert!(!ModelFiles::in_dir(dir.path()).model.exists());
        assert!(!dir.path().join("model.onnx.tmp").exists());
    }
}
