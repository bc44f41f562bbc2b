//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.graph-agent.toml` files.

use crate::backend::{Catalog, ClientConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".graph-agent.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Search backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Index names of the three collections.
    #[serde(default)]
    pub indices: IndicesConfig,

    /// LLM settings for `ask`.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Search backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Verify TLS certificates. Off by default for self-signed clusters.
    #[serde(default)]
    pub verify_tls: bool,

    /// Path prefix of the join-capable search endpoint.
    #[serde(default = "default_join_prefix")]
    pub join_prefix: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: default_password(),
            verify_tls: false,
            join_prefix: default_join_prefix(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_username() -> String {
    "sirenadmin".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_join_prefix() -> String {
    "/siren".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicesConfig {
    #[serde(default = "default_company")]
    pub company: String,

    #[serde(default = "default_investment")]
    pub investment: String,

    #[serde(default = "default_investor")]
    pub investor: String,
}

impl Default for IndicesConfig {
    fn default() -> Self {
        Self {
            company: default_company(),
            investment: default_investment(),
            investor: default_investor(),
        }
    }
}

fn default_company() -> String {
    "company".to_string()
}

fn default_investment() -> String {
    "investment".to_string()
}

fn default_investor() -> String {
    "investor".to_string()
}

/// How `ask` answers a prompt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Plan with the LLM tool loop.
    #[default]
    Llm,
    /// Answer from a fixed join, without an LLM.
    Local,
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatMode::Llm => write!(f, "llm"),
            ChatMode::Local => write!(f, "local"),
        }
    }
}

/// LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub mode: ChatMode,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Usually supplied through `OPENAI_API_KEY` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Assistant turns before giving up.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Characters of each tool result sent back to the model.
    #[serde(default = "default_tool_result_limit")]
    pub tool_result_limit: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_steps: default_max_steps(),
            tool_result_limit: default_tool_result_limit(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_steps() -> usize {
    8
}

fn default_tool_result_limit() -> usize {
    15000
}

fn default_timeout() -> u64 {
    120
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.graph-agent.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line or through the environment
    /// override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.es_url {
            self.backend.url = url.clone();
        }
        if let Some(ref user) = args.es_user {
            self.backend.username = user.clone();
        }
        if let Some(ref pass) = args.es_pass {
            self.backend.password = pass.clone();
        }
        if let Some(verify) = args.es_verify {
            self.backend.verify_tls = verify;
        }

        if let Some(mode) = args.mode {
            self.llm.mode = mode;
        }
        if args.api_key.is_some() {
            self.llm.api_key = args.api_key.clone();
        }

        if let crate::cli::Command::Ask(ref ask) = args.command {
            if let Some(ref model) = ask.model {
                self.llm.model = model.clone();
            }
            if let Some(ref base_url) = ask.base_url {
                self.llm.base_url = base_url.clone();
            }
            if let Some(steps) = ask.max_steps {
                self.llm.max_steps = steps;
            }
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.backend.url.clone(),
            username: Some(self.backend.username.clone()).filter(|u| !u.is_empty()),
            password: Some(self.backend.password.clone()).filter(|p| !p.is_empty()),
            verify_tls: self.backend.verify_tls,
        }
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            company: self.indices.company.clone(),
            investment: self.indices.investment.clone(),
            investor: self.indices.investor.clone(),
            join_prefix: self.backend.join_prefix.clone(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
