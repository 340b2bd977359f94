//! sparkmcp - Main CLI Entry Point

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use sparkmcp::{
    cli::{Args, Commands},
    config::Config,
    errors::OrchestratorError,
    orchestrator::Orchestrator,
    security::IdentityResolver,
    tools::ToolRegistry,
};
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    init_tracing(&args, &config);

    let registry = Arc::new(ToolRegistry::with_builtins().context("Failed to register built-in tools")?);
    let orchestrator = Orchestrator::from_config(&config, registry);
    if let Some(interval) = config.sweep_interval() {
        orchestrator.spawn_cache_sweeper(interval);
    }

    let outcome = match &args.command {
        Commands::Run { request, token } => run_request(&orchestrator, &config, request, token).await,
        Commands::Tools => {
            list_tools(&orchestrator);
            Ok(())
        }
        Commands::Config => show_config(&args, &config),
    };

    if args.stats {
        orchestrator.telemetry().snapshot().display_summary();
    }

    outcome
}

/// Install the fmt subscriber; `-v` beats RUST_LOG, which beats the config level
fn init_tracing(args: &Args, config: &Config) {
    let configured = args.log_level(&config.logging.level);
    let filter = if args.verbose > 0 {
        EnvFilter::try_new(&configured)
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&configured))
    }
    .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_request(
    orchestrator: &Orchestrator,
    config: &Config,
    request: &str,
    token: &str,
) -> Result<()> {
    let raw = if request == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        request.to_string()
    };

    let request: Value = serde_json::from_str(&raw).context("Request is not valid JSON")?;

    let Some(user) = config.token_resolver().authenticate(token) else {
        bail!("Invalid credentials");
    };

    match orchestrator.plan_and_execute(request, &user).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&json!({ "results": output.results }))?);
            Ok(())
        }
        Err(OrchestratorError::Execution(e)) => {
            let steps: Vec<Value> = e.results().iter().map(|step| step.to_json()).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "error": e.to_string(), "steps": steps }))?
            );
            Err(anyhow!(e))
        }
        Err(e) => Err(anyhow!(e)),
    }
}

fn list_tools(orchestrator: &Orchestrator) {
    let registry = orchestrator.registry();
    println!("Registered tools ({}):", registry.len());
    for definition in registry.definitions() {
        let mut traits = Vec::new();
        if !definition.parallel_safe {
            traits.push("barrier");
        }
        if definition.retry_safe {
            traits.push("retry-safe");
        }

        let params: Vec<String> = definition
            .parameters
            .iter()
            .map(|p| {
                let optional = if p.required { "" } else { "?" };
                format!("{}{}: {:?}", p.name, optional, p.kind)
            })
            .collect();

        println!("  {:<12} ({})  {}", definition.name, params.join(", "), definition.description);
        if !traits.is_empty() {
            println!("  {:<12} [{}]", "", traits.join(", "));
        }
    }
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let source = args
        .config
        .clone()
        .or_else(|| Config::default_path().filter(|path| path.exists()));
    match source {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# Built-in defaults"),
    }

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
