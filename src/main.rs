//! avon - command line entry point.
//!
//! ```text
//! avon run <goal>
//! avon batch <goal> [<goal>...]
//! avon guard <template> <feature> [target-dir]
//! ```
//!
//! Outcomes are printed to stdout as JSON; logs go to stderr.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use avon_core::config::Config;
use avon_core::guardrail::{BoilerplateRegistry, GuardrailedBuilder};
use avon_core::llm::{ModelGateway, OllamaClient, OpenRouterClient};
use avon_core::memory::FileHeuristicsStore;
use avon_core::search;
use avon_core::supervisor::{RunQueue, Supervisor};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage:
  avon run <goal>
  avon batch <goal> [<goal>...]
  avon guard <template> <feature> [target-dir]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avon_core=debug,avon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: builder={}/{} max_retries={}",
        config.agents.builder.provider_id,
        config.agents.builder.model_id,
        config.limits.max_retries_per_task
    );
    let gateway = Arc::new(build_gateway(&config).await);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match command.as_str() {
        "run" => {
            if rest.is_empty() {
                bail!(USAGE);
            }
            let supervisor = supervisor(&config, gateway);
            let outcome = supervisor.run(&rest.join(" "), &cancel).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        "batch" => {
            if rest.is_empty() {
                bail!(USAGE);
            }
            let queue = RunQueue::start_with_token(
                Arc::new(supervisor(&config, gateway)),
                config.queue,
                cancel.clone(),
            );
            let mut handles = Vec::with_capacity(rest.len());
            for goal in rest {
                handles.push(queue.submit(goal.clone()).await?);
            }
            let mut outcomes = Vec::with_capacity(handles.len());
            for handle in handles {
                outcomes.push(handle.outcome().await?);
            }
            queue.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        "guard" => {
            let (template, feature) = match rest {
                [template, feature, ..] => (template, feature),
                _ => bail!(USAGE),
            };
            let registry = match &config.boilerplates_path {
                Some(path) => BoilerplateRegistry::with_file(path)?,
                None => BoilerplateRegistry::builtin(),
            };
            let builder = GuardrailedBuilder::from_config(&config, Arc::new(registry), gateway);
            let target = rest.get(2).map(Path::new);
            let outcome = builder.run(template, feature, target, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        other => bail!("unknown command: {}\n{}", other, USAGE),
    }

    Ok(())
}

async fn build_gateway(config: &Config) -> ModelGateway {
    let ollama = OllamaClient::new(config.ollama_host.clone());
    if config.ollama_autostart {
        if let Err(e) = ollama.ensure_server().await.context("starting ollama") {
            warn!("{:#}", e);
        }
    }

    let mut gateway = ModelGateway::new().with_provider("ollama", Arc::new(ollama));
    match &config.openrouter_api_key {
        Some(key) => gateway.register("openrouter", Arc::new(OpenRouterClient::new(key.clone()))),
        None => info!("OPENROUTER_API_KEY not set; openrouter provider disabled"),
    }
    info!("Providers: {}", gateway.provider_ids().join(", "));
    gateway
}

fn supervisor(config: &Config, gateway: Arc<ModelGateway>) -> Supervisor {
    let memory = Arc::new(FileHeuristicsStore::new(config.heuristics_path.clone()));
    Supervisor::from_config(config, gateway, search::from_env(), memory)
}
