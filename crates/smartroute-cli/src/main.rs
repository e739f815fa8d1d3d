//! SmartRoute CLI - route prompts to the right model tier

use std::sync::Arc;

use clap::{Parser, Subcommand};
use smartroute_core::config::Config;
use smartroute_core::llm::HttpInvokerFactory;
use smartroute_core::routing::{
    InvocationOutcome, InvocationRequest, LexicalScorer, Router, TierKey, max_timeout,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "smartroute")]
#[command(author, version, about = "Route prompts to the right model tier", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a prompt to a model
    Invoke {
        /// Prompt text
        text: String,
        /// Use this tier (fast, mid, reasoning) instead of classifying
        #[arg(short, long)]
        tier: Option<String>,
        /// Comma-separated model keys to try, in order
        #[arg(short, long, value_delimiter = ',', num_args = 0..)]
        fallback: Option<Vec<String>>,
        /// Race every candidate and keep the first answer
        #[arg(short, long)]
        latency_mode: bool,
        /// Continue the conversation identified by this token
        #[arg(short, long)]
        context_token: Option<String>,
    },

    /// List configured models by tier
    Models,

    /// Score a prompt and show the tier it would use
    Classify {
        /// Prompt text
        text: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Provider keys may live in a local .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smartroute=info".parse()?)
                .add_directive("smartroute_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Invoke {
            text,
            tier,
            fallback,
            latency_mode,
            context_token,
        } => {
            let mut request = InvocationRequest::new(text).with_latency_mode(latency_mode);
            request.tier = tier;
            request.fallback = fallback;
            request.context_token = context_token;
            cmd_invoke(request, cli.format, cli.quiet).await
        }

        Commands::Models => cmd_models(cli.format),

        Commands::Classify { text } => cmd_classify(&text, cli.format),

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

/// Attach the library's error code and suggestion for display
fn describe(err: smartroute_core::Error) -> anyhow::Error {
    match err.suggestion() {
        Some(hint) => anyhow::anyhow!("[{}] {}\n  Try: {}", err.code(), err, hint),
        None => anyhow::anyhow!("[{}] {}", err.code(), err),
    }
}

async fn cmd_invoke(
    request: InvocationRequest,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let router = Router::from_config(
        &config,
        &HttpInvokerFactory::new(),
        Arc::new(LexicalScorer::new()),
    )
    .map_err(describe)?;

    debug!(models = router.catalog().len(), "Router ready");

    let outcome = router.route(request).await.map_err(describe)?;
    print_outcome(&outcome, format, quiet)?;
    Ok(())
}

fn print_outcome(outcome: &InvocationOutcome, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => {
            println!("{}", outcome.output_text);
            if !quiet {
                println!();
                println!("Model:         {}", outcome.model_used);
                println!("Context token: {}", outcome.context_token);
            }
        }
    }
    Ok(())
}

fn cmd_models(format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;

    match format {
        OutputFormat::Json => {
            let tiers: Vec<_> = TierKey::ALL
                .iter()
                .map(|&tier| {
                    let models = config.models.tier(tier);
                    serde_json::json!({
                        "tier": tier,
                        "effective_timeout_secs": tier_timeout_secs(models),
                        "models": models
                            .iter()
                            .map(|m| serde_json::json!({
                                "key": m.key,
                                "name": m.name,
                                "provider": m.provider,
                                "timeout_secs": m.timeout_secs,
                                "api_key_env": m.api_key_env,
                            }))
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tiers)?);
        }
        OutputFormat::Text => {
            for tier in TierKey::ALL {
                let models = config.models.tier(tier);
                println!(
                    "{} (effective timeout {}s)",
                    tier,
                    tier_timeout_secs(models)
                );
                for model in models {
                    println!(
                        "  {:<16} {:<12} {:<32} {}s",
                        model.key,
                        model.provider.to_string(),
                        model.name,
                        model.timeout_secs
                    );
                }
            }
        }
    }
    Ok(())
}

fn tier_timeout_secs(models: &[smartroute_core::config::ModelConfig]) -> u64 {
    max_timeout(models.iter().map(|m| m.descriptor().timeout))
        .map(|t| t.as_secs())
        .unwrap_or(0)
}

fn cmd_classify(text: &str, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    let score = LexicalScorer::new().score_text(text);
    let tier = config.thresholds().decide(score);

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "score": score, "tier": tier }))?
        ),
        OutputFormat::Text => println!("{} (score {:.3})", tier, score),
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.validate()?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
