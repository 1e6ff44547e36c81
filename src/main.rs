use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use circuit_breaker::resilience::{CircuitBreaker, CircuitState, Phase, StateField, StateOverrides};
use circuit_breaker::Registry;

#[derive(Parser)]
#[command(name = "circuitctl")]
#[command(about = "Inspect and override persisted circuit breaker state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the state of a circuit
    Status {
        #[command(flatten)]
        target: Target,
        /// Print a single field (connection_allowed, failed_since_open, failed_total, retry_after)
        #[arg(short, long)]
        field: Option<StateField>,
    },
    /// Force a circuit back to the closed, zeroed state or into a custom one
    Reset {
        #[command(flatten)]
        target: Target,
        /// Leave the circuit open
        #[arg(long)]
        open: bool,
        /// Unix time at which an open circuit becomes ready for a probe
        #[arg(long, requires = "open")]
        retry_after: Option<u64>,
        /// Lifetime failure count to keep
        #[arg(long)]
        failed_total: Option<u64>,
    },
    /// Report a successful call
    Success {
        #[command(flatten)]
        target: Target,
    },
    /// Report a failed call
    Failure {
        #[command(flatten)]
        target: Target,
    },
    /// List configured storage backends
    Backends,
}

#[derive(Args)]
struct Target {
    /// Circuit name
    name: String,
    /// Configuration group from the `circuits` section
    #[arg(short, long)]
    group: Option<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    name: &'a str,
    phase: Phase,
    ready: bool,
    state: CircuitState,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuit_breaker=info,circuitctl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = circuit_breaker::config::load().context("Failed to load configuration")?;
    let registry = Registry::from_settings(settings)
        .await
        .context("Failed to initialise storage backends")?;

    match cli.command {
        Commands::Status { target, field } => {
            let circuit = resolve(&registry, &target).await?;
            match field {
                Some(field) => println!("{}", circuit.status_field(field)),
                None => print_report(&circuit)?,
            }
        }
        Commands::Reset {
            target,
            open,
            retry_after,
            failed_total,
        } => {
            let circuit = resolve(&registry, &target).await?;

            let mut overrides = StateOverrides::default().connection_allowed(!open);
            if let Some(at) = retry_after {
                overrides = overrides.retry_after(at);
            }
            if let Some(total) = failed_total {
                overrides = overrides.failed_total(total);
            }

            circuit.reset(overrides).await;
            circuit.flush().await;
            print_report(&circuit)?;
        }
        Commands::Success { target } => {
            let circuit = resolve(&registry, &target).await?;
            circuit.success().await;
            circuit.flush().await;
            print_report(&circuit)?;
        }
        Commands::Failure { target } => {
            let circuit = resolve(&registry, &target).await?;
            circuit.failure().await;
            circuit.flush().await;
            print_report(&circuit)?;
        }
        Commands::Backends => {
            for id in registry.backends().identifiers() {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

async fn resolve(registry: &Registry, target: &Target) -> Result<Arc<CircuitBreaker>> {
    let circuit = match &target.group {
        Some(group) => registry.get_group(&target.name, group).await,
        None => registry.get_default(&target.name).await,
    };

    circuit.with_context(|| format!("Failed to open circuit `{}`", target.name))
}

fn print_report(circuit: &CircuitBreaker) -> Result<()> {
    let report = Report {
        name: circuit.name(),
        phase: circuit.phase(),
        ready: circuit.ready(),
        state: circuit.status(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
