#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

use repo_chat::config::Config;
use repo_chat::embedding::Embedder;
use repo_chat::error::{EmbeddingError, GenerationError};
use repo_chat::llm::{ChatMessage, ChatModel};
use repo_chat::service::ChatService;

const DIMS: usize = 64;

/// Bag-of-words embedder: each lower-cased word is hashed into a bucket.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS + 1];
    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v[DIMS] = 0.01;
    v
}

/// Echoes the retrieved excerpts back as the answer.
pub struct EchoChatModel;

#[async_trait]
impl ChatModel for EchoChatModel {
    fn model_name(&self) -> &str {
        "echo-test"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let user = messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if let Some(rest) = user.split("Follow-up question: ").nth(1) {
            return Ok(rest.lines().next().unwrap_or_default().to_string());
        }
        if user.contains("New summary:") {
            return Ok("The user asked about the repository.".to_string());
        }
        let excerpts = user.split("\nQuestion:").next().unwrap_or_default();
        Ok(format!("Based on the code: {}", excerpts))
    }
}

pub fn test_service(data_dir: &Path) -> Arc<ChatService> {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    Arc::new(ChatService::new(
        config,
        Arc::new(HashEmbedder),
        Arc::new(EchoChatModel),
    ))
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

/// Create a committed git repository under `parent/name` with `files`.
pub fn git_repo(parent: &TempDir, name: &str, files: &[(&str, &str)]) -> String {
    let dir = parent.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    for (path, content) in files {
        let full = dir.join(path);
        if let Some(p) = full.parent() {
            fs::create_dir_all(p).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    git(&dir, &["init", "-q"]);
    git(&dir, &["add", "."]);
    git(&dir, &["commit", "-q", "-m", "init"]);
    dir.to_string_lossy().into_owned()
}

/// A small project with a README and three Python modules.
pub fn invoice_repo(parent: &TempDir) -> String {
    git_repo(
        parent,
        "invoices",
        &[
            (
                "README.md",
                "# Invoices\n\nreadme_only_marker explains the project.\n",
            ),
            (
                "billing/totals.py",
                "def compute_invoice_total(lines):\n    \"\"\"Sum line amounts including tax.\"\"\"\n    return sum(l.amount * (1 + l.tax) for l in lines)\n",
            ),
            (
                "billing/customers.py",
                "class Customer:\n    def __init__(self, name, email):\n        self.name = name\n        self.email = email\n",
            ),
            (
                "app.py",
                "from billing.totals import compute_invoice_total\n\n\ndef main():\n    print(compute_invoice_total([]))\n",
            ),
        ],
    )
}

/// A second, unrelated project.
pub fn weather_repo(parent: &TempDir) -> String {
    git_repo(
        parent,
        "weather",
        &[
            (
                "forecast.py",
                "def predict_rainfall(station):\n    return station.humidity * 0.3\n",
            ),
            (
                "static/site.css",
                "body {\n  color: #222;\n}\n",
            ),
        ],
    )
}
