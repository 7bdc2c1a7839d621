//! `matchmaker`: drive HN MatchMaker from a terminal.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use matchmaker_core::{parse_structured, ExpectedSchema};
use matchmaker_runtime::{
    InMemoryProfileStore, MatchError, MatchMode, MatchService, ModelClient, ProviderRegistry,
    RuntimeConfig,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "matchmaker")]
#[command(about = "Compatibility matching between two profiles")]
#[command(version)]
struct Cli {
    /// Runtime configuration file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ProviderArgs {
    /// Profiles file (YAML or JSON list)
    #[arg(long, short = 'p')]
    profiles: PathBuf,

    /// Provider type
    #[arg(long, default_value = "openai")]
    provider: String,

    /// Provider configuration as a JSON object
    #[arg(long, default_value = "{}")]
    provider_config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Match two stored profiles
    Match {
        user_a: String,
        user_b: String,

        /// MVP, AGENT_V2 or MULTI_AGENT_V2
        #[arg(long, short, default_value = "MULTI_AGENT_V2")]
        mode: MatchMode,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Run a single specialist agent (profil, valeurs, projection, risques)
    Agent {
        name: String,
        user_a: String,
        user_b: String,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Show the psychological summary of a profile
    Summary {
        user: String,

        /// Ignore any cached summary
        #[arg(long)]
        rebuild: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Validate a raw model response offline
    Validate {
        /// Schema as `field:kind,...`, kinds being string, number or array
        #[arg(long, short)]
        schema: String,

        /// Response file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let client_error = err
                .downcast_ref::<MatchError>()
                .is_some_and(MatchError::is_client_error);
            if client_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Match {
            user_a,
            user_b,
            mode,
            provider,
        } => {
            let service = build_service(&provider, &config)?;
            let cancel = cancel_on_ctrl_c();
            let outcome = service
                .match_by_ids_with_cancel(&user_a, &user_b, mode, &cancel)
                .await?;
            print_json(&outcome)
        }
        Commands::Agent {
            name,
            user_a,
            user_b,
            provider,
        } => {
            let service = build_service(&provider, &config)?;
            let result = service.run_agent_by_ids(&name, &user_a, &user_b).await?;
            print_json(&result)
        }
        Commands::Summary {
            user,
            rebuild,
            provider,
        } => {
            let service = build_service(&provider, &config)?;
            let summary = service.summary_by_id(&user, rebuild).await?;
            print_json(&summary)
        }
        Commands::Validate { schema, file } => validate(&schema, file.as_deref()),
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            println!("# effective model: {}", config.effective_model());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn build_service(args: &ProviderArgs, config: &RuntimeConfig) -> Result<MatchService> {
    let provider_config: serde_json::Value = serde_json::from_str(&args.provider_config)
        .context("--provider-config must be a JSON object")?;
    let provider = ProviderRegistry::with_defaults()
        .create(&args.provider, &provider_config)
        .with_context(|| format!("failed to create provider '{}'", args.provider))?;

    let store = InMemoryProfileStore::from_file(&args.profiles)
        .with_context(|| format!("failed to load profiles from {}", args.profiles.display()))?;
    tracing::debug!(profiles = store.len(), "profiles loaded");

    let client = ModelClient::new(provider)
        .with_default_model(config.effective_model())
        .with_timeout(config.request_timeout);

    Ok(MatchService::new(client, Arc::new(store), config.clone()))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight calls");
            token.cancel();
        }
    });
    cancel
}

fn validate(schema: &str, file: Option<&Path>) -> Result<()> {
    let schema = ExpectedSchema::parse_compact(schema).context("invalid --schema")?;

    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read stdin")?;
            raw
        }
    };

    let result = parse_structured(&raw, &schema)
        .with_context(|| format!("response does not match schema {schema}"))?;
    if !result.empty_arrays().is_empty() {
        eprintln!("flagged for review: {}", result.empty_arrays().join(", "));
    }

    print_json(&result)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
