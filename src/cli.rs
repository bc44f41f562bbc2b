//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::ChatMode;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// graph-agent - investigative tasks over a search engine with federated joins
///
/// Runs named analytical tasks (investors of a company, co-investments,
/// geographic and temporal proximity, ...) as filter and join queries, or
/// lets an LLM plan them from a free-form question.
///
/// Examples:
///   graph-agent health
///   graph-agent run entity_investors --params '{"company_label": "Acme"}'
///   graph-agent query join company investment --on companies,id
///   graph-agent ask "Which investors do Acme and Globex share?"
///   graph-agent init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .graph-agent.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Search backend URL
    #[arg(long, value_name = "URL", env = "ES_URL", global = true)]
    pub es_url: Option<String>,

    /// Search backend user
    #[arg(long, value_name = "USER", env = "ES_USER", global = true)]
    pub es_user: Option<String>,

    /// Search backend password
    #[arg(long, value_name = "PASS", env = "ES_PASS", hide_env_values = true, global = true)]
    pub es_pass: Option<String>,

    /// Verify the backend's TLS certificate
    #[arg(
        long,
        value_name = "BOOL",
        env = "ES_VERIFY",
        value_parser = clap::builder::BoolishValueParser::new(),
        global = true
    )]
    pub es_verify: Option<bool>,

    /// Answer mode for `ask` (llm, local)
    #[arg(long, env = "CHAT_MODE", ignore_case = true, global = true)]
    pub mode: Option<ChatMode>,

    /// API key for the chat endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Output format (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT", global = true)]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check the search backend
    Health,

    /// List the backend's indices
    Indices,

    /// Show the field mapping of an index
    Mapping {
        /// Index name
        index: String,
    },

    /// Run a raw lookup or join
    Query {
        #[command(subcommand)]
        op: QueryOp,
    },

    /// Run a named task
    Run(RunArgs),

    /// List registered handlers and their tasks
    Tasks,

    /// Answer a free-form question
    Ask(AskArgs),

    /// Generate a default .graph-agent.toml configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum QueryOp {
    /// Search one index
    Lookup {
        /// Index to search
        index: String,

        /// Query DSL as JSON (default: match_all)
        #[arg(long, value_name = "JSON")]
        query: Option<String>,

        #[arg(long, default_value = "50")]
        size: usize,
    },

    /// Join a parent index to a child index
    Join {
        parent_index: String,

        child_index: String,

        /// Join keys: child_key,parent_key
        #[arg(long, value_name = "CHILD,PARENT", value_delimiter = ',', required = true)]
        on: Vec<String>,

        /// Query DSL on the child index as JSON (default: match_all)
        #[arg(long, value_name = "JSON")]
        query: Option<String>,

        #[arg(long, default_value = "50")]
        size: usize,

        /// Join algorithm hint passed to the backend
        #[arg(long, value_name = "TYPE")]
        join_type: Option<String>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Task name (see `graph-agent tasks`)
    pub task: String,

    /// Task parameters as a JSON object
    #[arg(short, long, default_value = "{}", value_name = "JSON")]
    pub params: String,
}

impl RunArgs {
    pub fn params_value(&self) -> Result<Value, String> {
        parse_json_object(&self.params, "--params")
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AskArgs {
    /// The question
    pub prompt: String,

    /// Chat model name
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, value_name = "URL", env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Assistant turns before giving up
    #[arg(long, value_name = "N")]
    pub max_steps: Option<usize>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// Markdown summary with tables
    Markdown,
}

fn parse_json_object(text: &str, flag: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(format!("{} must be a JSON object", flag)),
        Err(e) => Err(format!("{} is not valid JSON: {}", flag, e)),
    }
}

/// Parse an optional `--query` value, defaulting to `match_all`.
pub fn query_value(query: Option<&str>) -> Result<Value, String> {
    match query {
        Some(text) => parse_json_object(text, "--query"),
        None => Ok(serde_json::json!({ "match_all": {} })),
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.es_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Backend URL must start with 'http://' or 'https://'".to_string());
            }
        }

        match self.command {
            Command::Run(ref run) => {
                run.params_value()?;
            }
            Command::Query { ref op } => match op {
                QueryOp::Lookup { query, size, .. } => {
                    query_value(query.as_deref())?;
                    if *size == 0 {
                        return Err("Size must be at least 1".to_string());
                    }
                }
                QueryOp::Join {
                    on, query, size, ..
                } => {
                    if on.len() != 2 {
                        return Err("--on takes exactly two keys: child_key,parent_key".to_string());
                    }
                    query_value(query.as_deref())?;
                    if *size == 0 {
                        return Err("Size must be at least 1".to_string());
                    }
                }
            },
            Command::Ask(ref ask) => {
                if ask.prompt.trim().is_empty() {
                    return Err("Prompt must not be empty".to_string());
                }
                if ask.max_steps == Some(0) {
                    return Err("Max steps must be at least 1".to_string());
                }
                if let Some(ref url) = ask.base_url {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err("LLM base URL must start with 'http://' or 'https://'".to_string());
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
impl Args {
    pub fn for_command(command: Command) -> Self {
        Args {
            command,
            config: None,
            es_url: None,
            es_user: None,
            es_pass: None,
            es_verify: None,
            mode: None,
            api_key: None,
            format: OutputFormat::Json,
            verbose: false,
            quiet: false,
        }
    }
}
