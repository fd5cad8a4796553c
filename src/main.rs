//! Aerospike Provider
//!
//! Command-line driver: plans and applies declarations of Aerospike users,
//! roles and runtime configuration, or serves the provider operations over
//! HTTP.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aerospike_provider::{
    provider::Severity, ApiServer, ApiServerConfig, BackendFactory, Declaration, Diagnostics,
    Orchestrator, Provider, ProviderConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Aerospike Provider - declarative users, roles and runtime configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// State file
    #[arg(
        long,
        env = "AEROSPIKE_PROVIDER_STATE",
        default_value = "aerospike.state.json",
        global = true
    )]
    state: PathBuf,

    /// Run against an in-process cluster instead of a real one
    #[arg(long, global = true)]
    in_memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the changes needed to reach the declaration
    Plan {
        /// Declaration file (YAML)
        #[arg(short, long, default_value = "aerospike.yaml")]
        file: PathBuf,
    },
    /// Apply the declaration to the cluster
    Apply {
        #[arg(short, long, default_value = "aerospike.yaml")]
        file: PathBuf,
    },
    /// Delete every object recorded in the state file
    Destroy {
        #[arg(short, long, default_value = "aerospike.yaml")]
        file: PathBuf,
    },
    /// Re-read every recorded object from the cluster
    Refresh {
        #[arg(short, long, default_value = "aerospike.yaml")]
        file: PathBuf,
    },
    /// Bring an existing object under management
    Import {
        /// Resource type, e.g. aerospike_user
        resource_type: String,
        /// Name of the object in the state file
        name: String,
        /// Identity of the object in the cluster
        id: String,
        #[arg(short, long, default_value = "aerospike.yaml")]
        file: PathBuf,
    },
    /// Print the resource schemas as JSON
    Schema,
    /// Serve the provider operations over HTTP
    Serve {
        /// REST API bind address
        #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
        api_addr: String,

        /// Provider block (YAML)
        #[arg(long, env = "AEROSPIKE_PROVIDER_CONFIG")]
        config: Option<PathBuf>,

        /// Allow cross-origin requests
        #[arg(long)]
        cors: bool,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);
    info!("Aerospike provider {}", aerospike_provider::VERSION);

    match &args.command {
        Command::Plan { file } => {
            let declaration = load_declaration(file)?;
            let orchestrator = orchestrator(&args, declaration.provider.as_ref()).await?;
            let plan = orchestrator.plan(&declaration).await.map_err(report)?;
            warn_all(&plan.warnings);
            if plan.has_changes() {
                print!("{}", orchestrator.describe(&plan));
            } else {
                println!("No changes. The cluster matches the declaration.");
            }
        }
        Command::Apply { file } => {
            let declaration = load_declaration(file)?;
            let orchestrator = orchestrator(&args, declaration.provider.as_ref()).await?;
            let plan = orchestrator.plan(&declaration).await.map_err(report)?;
            warn_all(&plan.warnings);
            print!("{}", orchestrator.describe(&plan));
            let summary = orchestrator.apply(plan).await.map_err(report)?;
            println!("Apply complete! {}", summary);
        }
        Command::Destroy { file } => {
            let provider = optional_declaration(file)?.and_then(|d| d.provider);
            let orchestrator = orchestrator(&args, provider.as_ref()).await?;
            let summary = orchestrator.destroy().await.map_err(report)?;
            println!("Destroy complete! {}", summary);
        }
        Command::Refresh { file } => {
            let provider = optional_declaration(file)?.and_then(|d| d.provider);
            let orchestrator = orchestrator(&args, provider.as_ref()).await?;
            let state = orchestrator.refresh().await.map_err(report)?;
            println!("Refreshed {} object(s).", state.resources.len());
        }
        Command::Import {
            resource_type,
            name,
            id,
            file,
        } => {
            let provider = optional_declaration(file)?.and_then(|d| d.provider);
            let orchestrator = orchestrator(&args, provider.as_ref()).await?;
            let imported = orchestrator
                .import(resource_type, name, id)
                .await
                .map_err(report)?;
            let handler = orchestrator.provider().resource(resource_type)?;
            println!(
                "Imported {}.{}:\n{}",
                resource_type,
                name,
                serde_json::to_string_pretty(&handler.redact(&imported))?
            );
        }
        Command::Schema => {
            let client = BackendFactory::create("memory", &ProviderConfig::default()).await?;
            let provider = Provider::with_client(client);
            println!("{}", serde_json::to_string_pretty(&provider.schemas())?);
        }
        Command::Serve {
            api_addr,
            config,
            cors,
        } => {
            let provider_config = match config {
                Some(path) => {
                    let text = std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    Some(serde_yaml::from_str::<ProviderConfig>(&text)?)
                }
                None => None,
            };
            let provider = build_provider(&args, provider_config.as_ref()).await?;
            let api_config = ApiServerConfig {
                rest_addr: api_addr
                    .parse()
                    .with_context(|| format!("invalid REST API address {}", api_addr))?,
                cors_enabled: *cors,
                ..Default::default()
            };

            let server = Arc::new(ApiServer::new(api_config, provider));
            let stopper = server.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stopper.shutdown();
                }
            });
            server.run().await?;
            info!("Provider server shutdown complete");
        }
    }

    Ok(())
}

async fn build_provider(
    args: &Args,
    config: Option<&ProviderConfig>,
) -> anyhow::Result<Arc<Provider>> {
    let backend = if args.in_memory { "memory" } else { "aerospike" };
    let config = config.cloned().unwrap_or_default();
    let client = BackendFactory::create(backend, &config)
        .await
        .map_err(|e| report(e.into()))?;
    Ok(Arc::new(Provider::with_client(client)))
}

async fn orchestrator(
    args: &Args,
    config: Option<&ProviderConfig>,
) -> anyhow::Result<Orchestrator> {
    let provider = build_provider(args, config).await?;
    Ok(Orchestrator::new(provider, args.state.clone()))
}

fn load_declaration(path: &Path) -> anyhow::Result<Declaration> {
    Declaration::load(path).with_context(|| format!("loading declaration {}", path.display()))
}

/// Declaration when the file exists; destroy and import work without one
fn optional_declaration(path: &Path) -> anyhow::Result<Option<Declaration>> {
    if path.exists() {
        load_declaration(path).map(Some)
    } else {
        Ok(None)
    }
}

fn warn_all(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
}

/// Print the diagnostics and turn them into the process error
fn report(diagnostics: Diagnostics) -> anyhow::Error {
    warn_all(&diagnostics);
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    anyhow!("{} error(s) reported", errors)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
