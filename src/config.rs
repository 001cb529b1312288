use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, RmpError};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    #[default]
    Pinecone,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    pub api_key: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    pub index_host: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub controller_url: Option<String>,
    /// Reviews loaded into the in-memory backend at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            api_key: None,
            index_name: default_index_name(),
            index_host: None,
            namespace: default_namespace(),
            controller_url: None,
            seed_file: None,
        }
    }
}

fn default_index_name() -> String {
    "rag".to_string()
}

fn default_namespace() -> String {
    "ns1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Fewer matches than this skips the completion and replies with
    /// `no_data_reply`. Zero always defers to the model.
    #[serde(default)]
    pub min_matches: usize,
    #[serde(default = "default_no_data_reply")]
    pub no_data_reply: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_matches: 0,
            no_data_reply: default_no_data_reply(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

fn default_no_data_reply() -> String {
    "I couldn't find any professors matching that request. Try naming a subject or course."
        .to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn convention_defaults() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            RmpError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| RmpError::Config(e.to_string()))
    }

    /// Loads `path` when given, otherwise the convention defaults, then
    /// fills secrets from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::convention_defaults(),
        };
        Ok(config.resolve_env())
    }

    pub fn resolve_env(self) -> Self {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.openai.api_key.is_none() {
            self.openai.api_key = lookup("OPENAI_API_KEY");
        }
        if self.index.api_key.is_none() {
            self.index.api_key = lookup("PINECONE_API_KEY");
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(RmpError::Config("retrieval.top_k must be >= 1".to_string()));
        }
        if self.retrieval.min_matches > self.retrieval.top_k {
            return Err(RmpError::Config(format!(
                "retrieval.min_matches ({}) cannot exceed retrieval.top_k ({})",
                self.retrieval.min_matches, self.retrieval.top_k
            )));
        }
        if is_blank(self.openai.api_key.as_deref()) {
            return Err(RmpError::Config(
                "openai.api_key is required (or set OPENAI_API_KEY)".to_string(),
            ));
        }
        match self.index.backend {
            IndexBackend::Pinecone => {
                if is_blank(self.index.api_key.as_deref()) {
                    return Err(RmpError::Config(
                        "index.api_key is required for the pinecone backend (or set PINECONE_API_KEY)"
                            .to_string(),
                    ));
                }
                if is_blank(self.index.index_host.as_deref())
                    && self.index.index_name.trim().is_empty()
                {
                    return Err(RmpError::Config(
                        "index.index_host or index.index_name is required".to_string(),
                    ));
                }
            }
            IndexBackend::Memory => {}
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_uses_conventions() {
        let config: Config = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.min_matches, 0);
        assert_eq!(config.index.backend, IndexBackend::Pinecone);
        assert_eq!(config.index.index_name, "rag");
        assert_eq!(config.index.namespace, "ns1");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn env_fills_missing_secrets_only() {
        let mut config = Config::convention_defaults();
        config.openai.api_key = Some("from-file".to_string());
        let config = config.resolve_with(|name| match name {
            "OPENAI_API_KEY" => Some("from-env".to_string()),
            "PINECONE_API_KEY" => Some("pc-env".to_string()),
            _ => None,
        });
        assert_eq!(config.openai.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.index.api_key.as_deref(), Some("pc-env"));
    }

    #[test]
    fn validate_reports_missing_keys() {
        let config = Config::convention_defaults();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("openai.api_key"));

        let mut config = Config::convention_defaults();
        config.openai.api_key = Some("k".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("index.api_key"));

        config.index.backend = IndexBackend::Memory;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_min_matches_above_top_k() {
        let mut config = Config::convention_defaults();
        config.openai.api_key = Some("k".to_string());
        config.index.backend = IndexBackend::Memory;
        config.retrieval.min_matches = 4;
        assert!(matches!(config.validate(), Err(RmpError::Config(_))));
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            json!({
                "index": {"backend": "memory", "seed_file": "reviews.json"},
                "retrieval": {"min_matches": 1}
            })
            .to_string(),
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.index.backend, IndexBackend::Memory);
        assert_eq!(config.index.seed_file, Some(PathBuf::from("reviews.json")));
        assert_eq!(config.retrieval.min_matches, 1);

        let missing = Config::from_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, RmpError::Config(_)));
    }
}
