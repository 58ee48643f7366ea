//! GAIT CLI
//!
//! Command-line front end for the composition engine:
//! - Browsing the endpoint directory and endpoint schemas
//! - One-shot suggestion, generation and execution
//! - An interactive composition shell (`gait shell`)

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use gait_compose::execution::execute_once;
use gait_compose::naming;
use gait_compose::suggestions::lookup_suggestions;
use gait_compose::{
    ComposerConfig, ComposerSession, Endpoint, MockServices, ModelChoice, Services,
};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod shell;

#[derive(Parser)]
#[command(name = "gait")]
#[command(
    author,
    version,
    about = "GAIT: compose GraphQL queries from natural language"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Query manager base URL (default: $GAIT_QUERY_MANAGER_URL or http://127.0.0.1:8000)
    #[arg(long, global = true)]
    query_manager_url: Option<String>,

    /// HTTP timeout in seconds; 0 disables (default: $GAIT_HTTP_TIMEOUT_SECS or 60)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Use built-in in-memory services seeded with a small book catalogue
    #[arg(long, global = true)]
    mock: bool,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the endpoint directory
    Apis,

    /// List the entities of an endpoint's schema
    Entities {
        /// Endpoint URL (default: first directory entry)
        #[arg(long)]
        api: Option<String>,
    },

    /// List the fields of an entity
    Fields {
        entity: String,
    },

    /// Field suggestions for the last word of a request
    Suggest {
        #[arg(long)]
        api: Option<String>,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Generate a GraphQL query from a natural-language request
    Generate {
        #[arg(long)]
        api: Option<String>,
        /// Generation model (OpenAi, Custom)
        #[arg(long)]
        model: Option<ModelChoice>,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Execute a query and print the JSON result
    Run {
        #[arg(long)]
        api: Option<String>,
        /// Query text
        #[arg(long, conflicts_with = "query_file", required_unless_present = "query_file")]
        query: Option<String>,
        /// File holding the query (`-` for stdin)
        #[arg(long)]
        query_file: Option<PathBuf>,
        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
    },

    /// Interactive composition session
    Shell {
        #[arg(long)]
        api: Option<String>,
        #[arg(long)]
        model: Option<ModelChoice>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(run(cli))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;
    let services = build_services(&cli.global, &config)?;

    match cli.command {
        Commands::Apis => cmd_apis(&services).await,
        Commands::Entities { api } => cmd_entities(&services, api).await,
        Commands::Fields { entity } => cmd_fields(&services, &entity).await,
        Commands::Suggest { api, text } => cmd_suggest(&services, api, &text).await,
        Commands::Generate { api, model, text } => {
            cmd_generate(services, &config, api, model, &text).await
        }
        Commands::Run {
            api,
            query,
            query_file,
            variables,
        } => {
            let query = match (query, query_file) {
                (Some(query), _) => query,
                (None, Some(path)) => read_query_file(&path)?,
                (None, None) => bail!("either --query or --query-file is required"),
            };
            cmd_run(&services, api, &query, variables.as_deref()).await
        }
        Commands::Shell { api, model } => {
            let session = open_session(services, &config, api, model).await?;
            shell::run_shell(session).await
        }
    }
}

fn load_config(args: &GlobalArgs) -> Result<ComposerConfig> {
    let mut config = ComposerConfig::from_env().context("invalid environment")?;
    if let Some(url) = &args.query_manager_url {
        config = config.with_query_manager_url(url)?;
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout_secs(secs);
    }
    Ok(config)
}

fn build_services(args: &GlobalArgs, config: &ComposerConfig) -> Result<Services> {
    if args.mock {
        return Ok(Services::mock(Arc::new(MockServices::bookstore())));
    }
    Services::http(config).context("failed to build HTTP client")
}

fn read_query_file(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Activated session with the requested endpoint and model selected.
async fn open_session(
    services: Services,
    config: &ComposerConfig,
    api: Option<String>,
    model: Option<ModelChoice>,
) -> Result<ComposerSession> {
    let session = ComposerSession::new(services, model.unwrap_or(config.default_model));
    session
        .activate()
        .await
        .with_context(|| format!("query manager at {}", config.query_manager_url))?;
    if let Some(api) = api {
        session.select_endpoint(&api)?;
    }
    Ok(session)
}

/// `--api` when given, otherwise the first directory entry.
async fn pick_endpoint(services: &Services, api: Option<String>) -> Result<Endpoint> {
    if let Some(api) = api {
        return Ok(Endpoint::new(api));
    }
    services
        .directory
        .list_endpoints()
        .await
        .context("failed to load endpoint directory")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("endpoint directory is empty; pass --api"))
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_apis(services: &Services) -> Result<()> {
    let endpoints = services
        .directory
        .list_endpoints()
        .await
        .context("failed to load endpoint directory")?;
    if endpoints.is_empty() {
        println!("(no endpoints)");
    }
    for endpoint in endpoints {
        println!("{:<24} {}", endpoint.label().bold(), endpoint.url);
    }
    Ok(())
}

async fn cmd_entities(services: &Services, api: Option<String>) -> Result<()> {
    let endpoint = pick_endpoint(services, api).await?;
    let entities = services
        .schema
        .list_entities(&endpoint.url)
        .await
        .with_context(|| format!("failed to list entities of {}", endpoint.url))?;
    eprintln!("{} {}", "endpoint:".cyan().bold(), endpoint.url);
    for entity in entities {
        let name = entity.short_name().unwrap_or_default();
        println!("{:<24} {}", name.bold(), entity.uri.dimmed());
    }
    Ok(())
}

async fn cmd_fields(services: &Services, entity: &str) -> Result<()> {
    let entity = naming::normalize_case(entity.trim());
    let fields = services
        .schema
        .list_fields(&entity)
        .await
        .with_context(|| format!("failed to list fields of {entity}"))?;
    if fields.is_empty() {
        eprintln!("{} no fields for {entity}", "note:".yellow().bold());
    }
    for uri in &fields {
        println!("{}", naming::field_short_name(uri).unwrap_or(uri));
    }
    Ok(())
}

async fn cmd_suggest(services: &Services, api: Option<String>, text: &[String]) -> Result<()> {
    let endpoint = pick_endpoint(services, api).await?;
    let raw = text.join(" ");
    let Some(token) = naming::trailing_token(&raw) else {
        bail!("nothing to suggest for blank input");
    };
    let suggestions = lookup_suggestions(services.schema.as_ref(), &endpoint.url, token)
        .await
        .context("suggestion lookup failed")?;
    if suggestions.is_empty() {
        eprintln!("{} no suggestions for `{token}`", "note:".yellow().bold());
    }
    for suggestion in suggestions {
        println!("{suggestion}");
    }
    Ok(())
}

async fn cmd_generate(
    services: Services,
    config: &ComposerConfig,
    api: Option<String>,
    model: Option<ModelChoice>,
    text: &[String],
) -> Result<()> {
    let session = open_session(services, config, api, model).await?;
    let mut state = session.subscribe();
    session.set_natural_language(&text.join(" "));
    if session.generate_query()?.is_none() {
        bail!("request is blank");
    }

    let done = state
        .wait_for(|s| !s.is_generating)
        .await
        .map_err(|_| anyhow!("session closed during generation"))?
        .clone();
    if let Some(err) = done.generation_error {
        bail!("query generation failed: {err}");
    }
    println!("{}", done.generated_query_text);
    Ok(())
}

/// `--variables` text; GraphQL variables are always a JSON object.
fn parse_variables(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("--variables is not valid JSON")?;
    if !value.is_object() {
        bail!("--variables must be a JSON object, got `{raw}`");
    }
    Ok(value)
}

async fn cmd_run(
    services: &Services,
    api: Option<String>,
    query: &str,
    variables: Option<&str>,
) -> Result<()> {
    let endpoint = pick_endpoint(services, api).await?;
    let variables = variables.map(parse_variables).transpose()?;
    let (text, failed) = execute_once(
        services.executor.as_ref(),
        &endpoint.url,
        query.trim(),
        variables.as_ref(),
    )
    .await;
    println!("{text}");
    if failed {
        bail!("query failed against {}", endpoint.url);
    }
    Ok(())
}
