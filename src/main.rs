//! hookfsm - state machine runner
//!
//! Loads model definitions, creates an in-memory entity and fires events
//! against it, logging every hook the engine dispatches.

use clap::{Parser, Subcommand};
use hookfsm_core::{CallOptions, ContextPatch};
use hookfsm_host::{Config, Host};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hookfsm")]
#[command(about = "Run lifecycle events against configured state machines")]
#[command(version)]
struct Cli {
    /// Model configuration file (YAML)
    #[arg(short, long, env = "HOOKFSM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list models
    Check,

    /// Print states, events and hook names of a model
    Describe {
        /// Model name
        model: String,
    },

    /// Create an entity and fire events against it in order
    Run {
        /// Model name
        model: String,

        /// Initial state of the entity
        #[arg(short, long)]
        initial: String,

        /// Entity id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Force every event from the current state where allowed
        #[arg(long)]
        force: bool,

        /// Events to fire
        #[arg(required = true)]
        events: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // An explicit --config wins over HOOKFSM_CONFIG; env overrides apply to both.
    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            let mut config = Config::from_file(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };

    let host = match Host::new(&config) {
        Ok(host) => host,
        Err(e) => {
            tracing::error!("Failed to initialize models: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Check => {
            tracing::info!("Configuration OK: {} model(s)", host.models().len());
            for model in host.models() {
                let description = host.describe(model)?;
                println!(
                    "{} ({} states, {} events, checksum {})",
                    model,
                    description.states.len(),
                    description.events.len(),
                    description.checksum
                );
            }
        }

        Commands::Describe { model } => {
            let description = host.describe(&model)?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }

        Commands::Run {
            model,
            initial,
            id,
            force,
            events,
        } => {
            let description = host.describe(&model)?;
            for hook in &description.hooks {
                let name = hook.clone();
                host.observe(&model, hook, move |ctx| {
                    tracing::info!(
                        hook = %name,
                        event = %ctx.event,
                        from = %ctx.from,
                        to = %ctx.to,
                        "hook"
                    );
                    async { Ok(ContextPatch::default()) }
                })?;
            }

            let mut attributes = Map::new();
            attributes.insert(description.state_field.clone(), Value::String(initial));
            if let Some(id) = id {
                attributes.insert("id".to_string(), Value::String(id));
            }
            let mut entity = host.create(&model, attributes)?;

            let options = CallOptions { force };
            for event in &events {
                match host.fire_with(&entity, event, vec![], options).await {
                    Ok(result) => {
                        println!("{}: {} -> {}", event, result.from, result.to);
                        entity = result.entity;
                    }
                    Err(e) => {
                        tracing::error!("{} failed: {}", event, e);
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&json!({
                                "error": e.to_string(),
                                "code": e.error_code(),
                                "entity": host.reload(&entity)?,
                            }))?
                        );
                        return Err(e.into());
                    }
                }
            }

            println!("{}", serde_json::to_string_pretty(&entity)?);
        }
    }

    Ok(())
}
