// ============================================================================
// Server configuration: environment (.env) with command-line overrides
// ============================================================================

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::str::FromStr;
use std::time::Duration;

use recall_core::generator::DEFAULT_CHAT_MODEL;
use recall_core::memory::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL};
use recall_core::RecallConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Webhook service that turns live transcripts into searchable memories
#[derive(Parser, Debug, Default)]
#[command(name = "recall-server", version, about = "Buffer transcripts into memories and answer recall questions")]
pub struct Cli {
    /// Address to listen on (default: RECALL_BIND or 0.0.0.0:8000)
    #[arg(long)]
    pub bind: Option<String>,

    /// Qdrant URL (default: QDRANT_URL)
    #[arg(long)]
    pub qdrant_url: Option<String>,

    /// Keep memories in process even if QDRANT_URL is set
    #[arg(long)]
    pub in_memory: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub api_key: String,
    pub api_base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// `None` selects the in-process vector store
    pub qdrant_url: Option<String>,
    pub recall: RecallConfig,
}

impl ServerConfig {
    pub fn from_env(cli: &Cli) -> Result<Self> {
        Self::from_lookup(cli, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(cli: &Cli, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("OPENAI_API_KEY")
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set (add it to .env)"))?;

        let qdrant_url = if cli.in_memory {
            None
        } else {
            cli.qdrant_url.clone().or_else(|| var("QDRANT_URL"))
        };

        let mut recall = RecallConfig::default();
        if let Some(ms) = parse_var::<u64>(&var, "RECALL_QUESTION_WINDOW_MS")? {
            recall.question_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&var, "RECALL_STALE_AFTER_MS")? {
            recall.stale_after = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_var::<f32>(&var, "RECALL_SIMILARITY_THRESHOLD")? {
            recall.similarity_threshold = threshold;
        }
        if let Some(secs) = parse_var::<u64>(&var, "RECALL_EVICT_AFTER_SECS")? {
            recall.evict_after = Duration::from_secs(secs);
        }

        Ok(Self {
            bind: cli
                .bind
                .clone()
                .or_else(|| var("RECALL_BIND"))
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            api_key,
            api_base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            embedding_model: var("RECALL_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: var("RECALL_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            qdrant_url,
            recall,
        })
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match var(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("Invalid value for {}: '{}'", key, raw),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(&Cli::default(), lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert!(config.qdrant_url.is_none());
        assert_eq!(config.recall.question_window, Duration::from_millis(2000));
        assert_eq!(config.recall.stale_after, Duration::from_millis(5000));
    }

    #[test]
    fn test_missing_api_key() {
        let err = ServerConfig::from_lookup(&Cli::default(), lookup(&[("OPENAI_API_KEY", "  ")])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let cli = Cli {
            bind: Some("127.0.0.1:9100".to_string()),
            qdrant_url: Some("http://qdrant:6334".to_string()),
            in_memory: false,
        };
        let config = ServerConfig::from_lookup(
            &cli,
            lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("RECALL_BIND", "0.0.0.0:1"),
                ("QDRANT_URL", "http://localhost:6334"),
            ]),
        )
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:9100");
        assert_eq!(config.qdrant_url.as_deref(), Some("http://qdrant:6334"));
    }

    #[test]
    fn test_in_memory_ignores_qdrant_url() {
        let cli = Cli {
            in_memory: true,
            ..Cli::default()
        };
        let config = ServerConfig::from_lookup(
            &cli,
            lookup(&[("OPENAI_API_KEY", "sk-test"), ("QDRANT_URL", "http://localhost:6334")]),
        )
        .unwrap();
        assert!(config.qdrant_url.is_none());
    }

    #[test]
    fn test_timing_overrides() {
        let config = ServerConfig::from_lookup(
            &Cli::default(),
            lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("RECALL_QUESTION_WINDOW_MS", "1500"),
                ("RECALL_SIMILARITY_THRESHOLD", "0.35"),
            ]),
        )
        .unwrap();
        assert_eq!(config.recall.question_window, Duration::from_millis(1500));
        assert_eq!(config.recall.similarity_threshold, 0.35);

        let err = ServerConfig::from_lookup(
            &Cli::default(),
            lookup(&[("OPENAI_API_KEY", "sk-test"), ("RECALL_STALE_AFTER_MS", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("RECALL_STALE_AFTER_MS"));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["recall-server", "--bind", "127.0.0.1:7000", "--in-memory"]);
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:7000"));
        assert!(cli.in_memory);
    }
}
