use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use directories::ProjectDirs;
use tracing_subscriber::{EnvFilter, fmt};

use smartmacro_core::vision::{AnalyzerConfig, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// `db_override` comes from `--db` / `DATABASE_PATH`; otherwise the
    /// platform data directory is used.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        if let Some(db_path) = db_override {
            return Ok(Config { db_path });
        }

        let proj_dirs = ProjectDirs::from("", "", "smartmacro")
            .context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("nutrition.db"),
        })
    }
}

/// Vision service settings shared by `analyze` and `serve`.
#[derive(Args, Debug, Clone)]
pub struct VisionArgs {
    /// API key for the vision service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Vision model name
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
    /// Response token budget
    #[arg(long, env = "MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,
    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

impl VisionArgs {
    pub fn analyzer_config(&self) -> Result<AnalyzerConfig> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            bail!("No API key configured. Set OPENAI_API_KEY or pass --api-key");
        };
        if self.max_tokens == 0 {
            bail!("--max-tokens must be greater than 0");
        }

        let mut config = AnalyzerConfig::new(api_key);
        config.model.clone_from(&self.model);
        config.max_tokens = self.max_tokens;
        config.base_url.clone_from(&self.base_url);
        config.timeout = Duration::from_secs(self.timeout.max(1));
        Ok(config)
    }
}

/// Log to stderr. `RUST_LOG` wins, then `LOG_LEVEL`, then `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("LOG_LEVEL").map(|level| EnvFilter::new(level.to_lowercase())))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vision_args(api_key: Option<&str>) -> VisionArgs {
        VisionArgs {
            api_key: api_key.map(str::to_string),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: 60,
        }
    }

    #[test]
    fn test_config_db_override() {
        let config = Config::load(Some(PathBuf::from("/tmp/custom.db"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn test_analyzer_config_requires_key() {
        assert!(vision_args(None).analyzer_config().is_err());
        assert!(vision_args(Some("   ")).analyzer_config().is_err());
    }

    #[test]
    fn test_analyzer_config_maps_args() {
        let mut args = vision_args(Some("sk-test"));
        args.model = "gpt-4o-mini".to_string();
        args.max_tokens = 300;
        args.timeout = 0;
        let config = args.analyzer_config().unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!((config.temperature - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_analyzer_config_zero_tokens() {
        let mut args = vision_args(Some("sk-test"));
        args.max_tokens = 0;
        assert!(args.analyzer_config().is_err());
    }
}
