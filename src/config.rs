use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::retry::RetryPolicy;
use crate::search::SearchStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root for cloned repositories (`repos/`) and vector indexes (`index/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl StorageConfig {
    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
        }
    }
}

fn default_strategy() -> String {
    "mmr".to_string()
}
fn default_k() -> usize {
    8
}
fn default_fetch_k() -> usize {
    20
}
fn default_mmr_lambda() -> f32 {
    0.5
}

impl RetrievalConfig {
    pub fn search_strategy(&self) -> SearchStrategy {
        match self.strategy.as_str() {
            "similarity" => SearchStrategy::Similarity,
            _ => SearchStrategy::Mmr {
                lambda: self.mmr_lambda,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector size. When set it is sent as `dimensions` and every returned
    /// vector must have exactly this length.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Raw turns kept verbatim before older ones are folded into the summary.
    #[serde(default = "default_max_recent_turns")]
    pub max_recent_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_recent_turns: default_max_recent_turns(),
        }
    }
}

fn default_max_recent_turns() -> usize {
    4
}

/// Parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    match config.retrieval.strategy.as_str() {
        "mmr" | "similarity" => {}
        other => bail!(
            "Unknown retrieval strategy: '{}'. Must be mmr or similarity.",
            other
        ),
    }
    if config.retrieval.k == 0 {
        bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.k {
        bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&config.retrieval.mmr_lambda) {
        bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    // Validate llm
    if config.llm.provider != "openai" {
        bail!(
            "Unknown llm provider: '{}'. Must be openai.",
            config.llm.provider
        );
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.memory.max_recent_turns == 0 {
        bail!("memory.max_recent_turns must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.retrieval.fetch_k, 20);
        assert_eq!(config.embedding.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.embedding.retry.max_retries, 5);
        assert_eq!(
            config.retrieval.search_strategy(),
            SearchStrategy::Mmr { lambda: 0.5 }
        );
    }

    #[test]
    fn test_sections_override_defaults() {
        let file = write_config(
            r#"
[storage]
data_dir = "/var/lib/repo-chat"

[retrieval]
strategy = "similarity"
k = 4
fetch_k = 10

[embedding]
provider = "disabled"

[llm.retry]
max_retries = 1
initial_backoff_ms = 10
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.storage.repos_dir(),
            PathBuf::from("/var/lib/repo-chat/repos")
        );
        assert_eq!(config.retrieval.search_strategy(), SearchStrategy::Similarity);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.llm.retry.max_retries, 1);
        assert_eq!(config.llm.retry.initial_backoff_ms, 10);
        assert_eq!(config.llm.retry.max_backoff_ms, 32_000);
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let file = write_config("[retrieval]\nstrategy = \"random\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown retrieval strategy"));
    }

    #[test]
    fn test_rejects_fetch_k_below_k() {
        let file = write_config("[retrieval]\nk = 10\nfetch_k = 5\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_unknown_embedding_provider() {
        let file = write_config("[embedding]\nprovider = \"word2vec\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
