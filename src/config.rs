//! Watch configuration: CLI arguments merged over an optional YAML file

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tunnelmesh_signal::DebounceConfig;
use uuid::Uuid;

/// Arguments of the `watch` command
#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Agent ID used in logs (auto-generated if not specified)
    #[arg(long, env = "TUNNELMESH_AGENT_ID")]
    pub agent_id: Option<String>,

    /// Backoff before the first change is reported, in milliseconds
    #[arg(long, env = "TUNNELMESH_INITIAL_BACKOFF_MS")]
    pub initial_backoff_ms: Option<u64>,

    /// Upper bound for the backoff between reports, in milliseconds
    #[arg(long, env = "TUNNELMESH_MAX_BACKOFF_MS")]
    pub max_backoff_ms: Option<u64>,

    /// Configuration file (YAML)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

/// Configuration file format
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub debounce: DebounceSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentSection {
    /// Agent ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DebounceSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

/// Resolved configuration of the `watch` command
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub agent_id: String,
    pub debounce: DebounceConfig,
}

/// Parse a YAML configuration document
pub fn parse_config(contents: &str) -> Result<ConfigFile> {
    serde_yaml::from_str(contents).context("Invalid YAML configuration")
}

/// Load configuration from YAML file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge CLI args with config file, giving precedence to CLI args
pub fn build_watch_config(args: WatchArgs) -> Result<WatchConfig> {
    let file = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            load_config_file(path)?
        }
        None => ConfigFile::default(),
    };

    resolve(args, file)
}

fn resolve(args: WatchArgs, file: ConfigFile) -> Result<WatchConfig> {
    let defaults = DebounceConfig::default();

    let initial_backoff = args
        .initial_backoff_ms
        .or(file.debounce.initial_backoff_ms)
        .map(Duration::from_millis)
        .unwrap_or(defaults.initial_backoff);

    let max_backoff = args
        .max_backoff_ms
        .or(file.debounce.max_backoff_ms)
        .map(Duration::from_millis)
        .unwrap_or(defaults.max_backoff);

    let debounce = DebounceConfig::new(initial_backoff, max_backoff);
    if let Err(e) = debounce.validate() {
        bail!("Invalid backoff settings: {}", e);
    }

    let agent_id = args.agent_id.or(file.agent.id).unwrap_or_else(|| {
        let id = format!("agent-{}", Uuid::new_v4());
        info!("Auto-generated agent ID: {}", id);
        id
    });

    Ok(WatchConfig { agent_id, debounce })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
agent:
  id: agent-east-1
debounce:
  initial_backoff_ms: 250
  max_backoff_ms: 8000
"#;

    #[test]
    fn test_parse_full_config() {
        let file = parse_config(SAMPLE).unwrap();

        assert_eq!(file.agent.id.as_deref(), Some("agent-east-1"));
        assert_eq!(file.debounce.initial_backoff_ms, Some(250));
        assert_eq!(file.debounce.max_backoff_ms, Some(8000));
    }

    #[test]
    fn test_parse_partial_config() {
        let file = parse_config("debounce:\n  max_backoff_ms: 500\n").unwrap();

        assert!(file.agent.id.is_none());
        assert!(file.debounce.initial_backoff_ms.is_none());
        assert_eq!(file.debounce.max_backoff_ms, Some(500));
    }

    #[test]
    fn test_parse_invalid_config() {
        assert!(parse_config("debounce: [1, 2").is_err());
        assert!(parse_config("debounce:\n  max_backoff_ms: soon\n").is_err());
    }

    #[test]
    fn test_file_values_used() {
        let config = resolve(WatchArgs::default(), parse_config(SAMPLE).unwrap()).unwrap();

        assert_eq!(config.agent_id, "agent-east-1");
        assert_eq!(config.debounce.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.debounce.max_backoff, Duration::from_secs(8));
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = WatchArgs {
            agent_id: Some("cli-agent".to_string()),
            initial_backoff_ms: Some(100),
            ..Default::default()
        };

        let config = resolve(args, parse_config(SAMPLE).unwrap()).unwrap();

        assert_eq!(config.agent_id, "cli-agent");
        assert_eq!(config.debounce.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.debounce.max_backoff, Duration::from_secs(8));
    }

    #[test]
    fn test_defaults_and_generated_agent_id() {
        let config = resolve(WatchArgs::default(), ConfigFile::default()).unwrap();

        assert!(config.agent_id.starts_with("agent-"));
        assert_eq!(config.debounce, DebounceConfig::default());
    }

    #[test]
    fn test_invalid_backoff_rejected() {
        let inverted = WatchArgs {
            initial_backoff_ms: Some(5000),
            max_backoff_ms: Some(100),
            ..Default::default()
        };
        let err = resolve(inverted, ConfigFile::default()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid backoff settings"));

        let zero = WatchArgs {
            initial_backoff_ms: Some(0),
            ..Default::default()
        };
        assert!(resolve(zero, ConfigFile::default()).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let args = WatchArgs {
            config: Some(PathBuf::from("/nonexistent/tunnelmesh.yaml")),
            ..Default::default()
        };

        let err = build_watch_config(args).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
