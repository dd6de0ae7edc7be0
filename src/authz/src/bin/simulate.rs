//! MiniCloud authorization simulator
//!
//! Evaluates a request against a registry snapshot, or validates a policy
//! document, without touching any live service.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use minicloud_authz::{
    AuthzRequest, EngineConfig, InMemoryRegistry, PolicyDocument, PolicyEngine, RegistrySnapshot,
    Simulator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// MiniCloud authorization simulator CLI
#[derive(Parser)]
#[command(name = "authz-simulate")]
#[command(about = "Simulate MiniCloud authorization decisions")]
#[command(version)]
struct Cli {
    /// Path to engine configuration file
    #[arg(short, long, global = true, env = "MINICLOUD_AUTHZ_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a request against a registry snapshot
    Evaluate {
        /// Registry snapshot (JSON)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Acting user
        #[arg(short, long)]
        user: String,

        /// Action, e.g. storage:GetObject
        #[arg(short, long)]
        action: String,

        /// Resource, e.g. bucket:raw/file.txt
        #[arg(short, long)]
        resource: String,

        /// Project the request is scoped to
        #[arg(short, long)]
        project: Option<String>,

        /// Context entries as key=value (repeatable)
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },

    /// Validate a policy document as the registry would on write
    Validate {
        /// Policy document (JSON)
        policy: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    match cli.command {
        Command::Evaluate {
            snapshot,
            user,
            action,
            resource,
            project,
            context,
        } => {
            let snapshot = RegistrySnapshot::from_file(&snapshot)
                .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;
            let registry = Arc::new(InMemoryRegistry::from_snapshot(snapshot));
            let engine = PolicyEngine::from_config(&config, registry)
                .context("Failed to build policy engine")?;
            let simulator = Simulator::new(Arc::new(engine));

            let mut request = AuthzRequest::new(user, action, resource);
            request.project = project;
            for entry in &context {
                let (key, value) = parse_context_entry(entry)?;
                request.context.insert(key, value);
            }

            let decision = simulator
                .simulate(&request)
                .await
                .context("Simulation failed")?;

            info!("{}", decision.explanation());
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }

        Command::Validate { policy } => {
            let contents = std::fs::read_to_string(&policy)
                .with_context(|| format!("Failed to read {}", policy.display()))?;
            let document = PolicyDocument::from_json(&contents)
                .with_context(|| format!("{} is not a valid policy document", policy.display()))?;

            println!(
                "{}: valid (version {}, {} statements)",
                policy.display(),
                document.version(),
                document.statements().len()
            );
        }
    }

    Ok(())
}

fn parse_context_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Invalid context entry '{}', expected key=value", entry),
    }
}
