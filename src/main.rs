//! graph-agent - investigative tasks over a search engine with federated joins
//!
//! A CLI that routes named tasks to query-composing handlers, runs raw
//! lookups and joins, and lets an LLM plan multi-step investigations with
//! those as tools.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (backend unreachable, config, LLM failure, etc.)
//!   2 - The task answered with an error envelope

mod agent;
mod backend;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod tasks;

use agent::{AgentConfig, GraphAgent, OpenAiChat, ToolExecutor};
use anyhow::{Context, Result};
use backend::{Catalog, SearchBackend, SearchClient};
use cli::{Args, Command, OutputFormat, QueryOp};
use config::{ChatMode, Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tasks::{Coordinator, Envelope};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig { force } = args.command {
        return handle_init_config(force);
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, config.general.verbose);

    info!("graph-agent v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args.command);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .graph-agent.toml.
fn handle_init_config(force: bool) -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() && !force {
        eprintln!(
            "⚠️  {} already exists. Pass --force to overwrite it or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your backend, rename indices, or pick a model.");
    Ok(())
}

/// Initialize logging on stderr. `RUST_LOG` wins over the verbosity flags.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = if config_verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one subcommand. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let client = SearchClient::new(config.client_config())?;
    info!("Search backend: {}", client.base_url());
    let backend: Arc<dyn SearchBackend> = Arc::new(client);
    let catalog = config.catalog();
    let format = args.format;

    match args.command {
        Command::Health => {
            let status = health_report(backend.as_ref(), &config).await;
            print_raw(format, "Health", &status)?;
            Ok(0)
        }
        Command::Indices => {
            let indices = backend::list_indices(backend.as_ref()).await?;
            print_raw(format, "Indices", &indices)?;
            Ok(0)
        }
        Command::Mapping { ref index } => {
            let mapping = backend::mapping(backend.as_ref(), index).await?;
            print_raw(format, &format!("Mapping of {}", index), &mapping)?;
            Ok(0)
        }
        Command::Query { ref op } => {
            let (task, params) = query_params(op).map_err(anyhow::Error::msg)?;
            let coordinator = Coordinator::with_default_handlers(backend, catalog);
            let envelope = coordinator.dispatch(task, &params).await?;
            print_envelope(format, task, &envelope)
        }
        Command::Run(ref run) => {
            let params = run.params_value().map_err(anyhow::Error::msg)?;
            let coordinator = Coordinator::with_default_handlers(backend, catalog);
            let envelope = coordinator
                .dispatch(&run.task, &params)
                .await
                .with_context(|| format!("Task {} failed", run.task))?;
            print_envelope(format, &run.task, &envelope)
        }
        Command::Tasks => {
            let coordinator = Coordinator::with_default_handlers(backend, catalog);
            let listing = coordinator.list_tasks();
            match format {
                OutputFormat::Json => println!("{}", report::generate_json(&listing)?),
                OutputFormat::Markdown => print!("{}", report::generate_markdown_tasks(&listing)),
            }
            Ok(0)
        }
        Command::Ask(ref ask) => {
            let answer = handle_ask(&ask.prompt, backend, catalog, &config, args.quiet).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    report::generate_json(&json!({ "answer": answer, "mode": config.llm.mode }))?
                ),
                OutputFormat::Markdown => print!(
                    "{}",
                    report::generate_markdown_answer(&answer, &config.llm.mode.to_string())
                ),
            }
            Ok(0)
        }
        Command::InitConfig { .. } => Ok(0),
    }
}

/// Map a raw `query` subcommand onto the graph tasks.
fn query_params(op: &QueryOp) -> Result<(&'static str, Value), String> {
    match op {
        QueryOp::Lookup { index, query, size } => Ok((
            "graph_lookup",
            json!({
                "parent_index": index,
                "es_query": cli::query_value(query.as_deref())?,
                "size": size,
            }),
        )),
        QueryOp::Join {
            parent_index,
            child_index,
            on,
            query,
            size,
            join_type,
        } => Ok((
            "graph_join",
            json!({
                "parent_index": parent_index,
                "child_index": child_index,
                "on": on,
                "es_query": cli::query_value(query.as_deref())?,
                "size": size,
                "join_type": join_type,
            }),
        )),
    }
}

/// Backend reachability plus the effective connection settings.
async fn health_report(backend: &dyn SearchBackend, config: &Config) -> Value {
    let es = match backend::health(backend).await {
        Ok(info) => info,
        Err(e) => {
            warn!("Health check of {} failed: {}", e.path(), e);
            json!({ "error": e.to_string() })
        }
    };
    json!({
        "mode": config.llm.mode,
        "es_url": config.backend.url,
        "verify_tls": config.backend.verify_tls,
        "es": es,
        "llm_configured": config.llm.api_key.is_some(),
    })
}

async fn handle_ask(
    prompt: &str,
    backend: Arc<dyn SearchBackend>,
    catalog: Catalog,
    config: &Config,
    quiet: bool,
) -> Result<String> {
    if config.llm.mode == ChatMode::Local {
        info!("Answering in local mode");
        return Ok(agent::local_summary(backend.as_ref(), &catalog).await?);
    }

    let agent_config = AgentConfig::from(&config.llm);
    let model = Arc::new(OpenAiChat::new(&agent_config)?);
    let coordinator = Coordinator::with_default_handlers(backend.clone(), catalog);
    let agent = GraphAgent::new(agent_config, model, ToolExecutor::new(backend, coordinator));

    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid spinner template")?,
        );
        pb.set_message(format!("Asking {}...", config.llm.model));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let answer = agent.ask(prompt).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    Ok(answer?)
}

fn print_raw(format: OutputFormat, title: &str, value: &Value) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", report::generate_json(value)?),
        OutputFormat::Markdown => print!("{}", report::generate_markdown_raw(title, value)?),
    }
    Ok(())
}

fn print_envelope(format: OutputFormat, task: &str, envelope: &Envelope) -> Result<i32> {
    match format {
        OutputFormat::Json => println!("{}", report::generate_json(envelope)?),
        OutputFormat::Markdown => print!("{}", report::generate_markdown_envelope(task, envelope)),
    }
    Ok(if envelope.is_error() { 2 } else { 0 })
}

/// Load configuration from file or use defaults. Runs before logging is up.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_for_join() {
        let op = QueryOp::Join {
            parent_index: "company".to_string(),
            child_index: "investment".to_string(),
            on: vec!["companies".to_string(), "id".to_string()],
            query: Some(r#"{"term": {"raised_currency_code": "USD"}}"#.to_string()),
            size: 20,
            join_type: None,
        };
        let (task, params) = query_params(&op).unwrap();
        assert_eq!(task, "graph_join");
        assert_eq!(params["on"], json!(["companies", "id"]));
        assert_eq!(params["es_query"]["term"]["raised_currency_code"], "USD");
        assert_eq!(params["join_type"], Value::Null);
    }

    #[tokio::test]
    async fn test_health_report_survives_backend_failure() {
        let status = health_report(&backend::fake::DownBackend, &Config::default()).await;
        assert!(status["es"]["error"].as_str().unwrap().contains("backend unavailable"));
        assert_eq!(status["mode"], "llm");
        assert_eq!(status["verify_tls"], false);
    }

    #[tokio::test]
    async fn test_health_reflects_global_llm_settings() {
        use clap::Parser;

        let args = Args::try_parse_from([
            "graph-agent",
            "--mode",
            "local",
            "--api-key",
            "sk-env",
            "health",
        ])
        .unwrap();
        let mut config = Config::default();
        config.merge_with_args(&args);

        let status = health_report(&backend::fake::DownBackend, &config).await;
        assert_eq!(status["mode"], "local");
        assert_eq!(status["llm_configured"], true);
    }
}
