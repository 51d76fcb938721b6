//! Tallyboard CLI
//!
//! Command-line interface for:
//! - Validating dashboard configuration files
//! - Previewing the query parameters a filter selection produces
//! - Editing the persisted source layout
//! - Running a refreshing dashboard session against the REST backend

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tallyboard_filters::{build_parameters, FilterKind, FilterStateStore, SelectionChange};
use tallyboard_ingest::http::HttpBackend;
use tallyboard_ingest::{AuthToken, CatalogCollaborator, Outcome};
use tallyboard_sync::{format_age, DashboardConfig};

mod run;
mod sources;

#[derive(Parser)]
#[command(name = "tallyboard")]
#[command(
    author,
    version,
    about = "Tallyboard: filterable dashboards over uploaded and remote spreadsheets"
)]
struct Cli {
    /// Dashboard configuration file
    #[arg(short, long, global = true, default_value = "tallyboard.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the filter graph.
    Check,

    /// Print the query parameters a selection produces.
    Params {
        /// `FILTER=VALUE`; repeat to pick several values of a multi-select filter
        #[arg(short, long = "select", value_name = "FILTER=VALUE")]
        selections: Vec<String>,
    },

    /// Format how long ago a timestamp was, as the refresh status shows it.
    Age {
        /// RFC 3339 timestamp, e.g. 2024-03-09T14:03:27Z
        since: String,
        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Inspect or edit the persisted source slots.
    Sources {
        #[command(subcommand)]
        command: sources::SourceCommands,
    },

    /// List the worksheet titles of a remote spreadsheet.
    SheetNames {
        /// Spreadsheet URL
        url: String,
        /// OAuth token forwarded to the backend
        #[arg(long, default_value = "")]
        token: String,
    },

    /// Run a dashboard session until interrupted.
    Run(run::RunArgs),
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(
                    "warn,tallyboard_cli=info,tallyboard_sync=info,tallyboard_ingest=info",
                )),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => cmd_check(&cli.config),
        Commands::Params { selections } => cmd_params(&cli.config, &selections),
        Commands::Age { since, now } => cmd_age(&since, now.as_deref()),
        Commands::Sources { command } => {
            let config = load_config(&cli.config)?;
            runtime()?.block_on(sources::cmd_sources(&config, command))
        }
        Commands::SheetNames { url, token } => {
            let config = load_config(&cli.config)?;
            runtime()?.block_on(cmd_sheet_names(&config, &url, &token))
        }
        Commands::Run(args) => {
            let config = load_config(&cli.config)?;
            runtime()?.block_on(run::cmd_run(&config, &args))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))
}

fn load_config(path: &Path) -> Result<DashboardConfig> {
    DashboardConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("'{text}' is not an RFC 3339 timestamp"))?
        .with_timezone(&Utc))
}

fn cmd_check(path: &Path) -> Result<()> {
    println!("{} {}", "Checking".green().bold(), path.display());

    let config = load_config(path)?;
    let graph = config.filter_graph()?;
    let refresh = config.refresh_config()?;

    println!("  Filters: {}", graph.len());
    for def in graph.iter() {
        let kind = match def.kind {
            FilterKind::TopLevel => "top-level".cyan(),
            FilterKind::Dependent => "dependent".yellow(),
        };
        let mode = if def.is_multi_select { "multi" } else { "single" };
        print!(
            "    {} ({}) column={} {kind} {mode}",
            def.id.bold(),
            def.display_label(),
            def.source_column
        );
        if !def.depends_on.is_empty() {
            let parents: Vec<&str> = def.depends_on.iter().map(String::as_str).collect();
            print!(" <- {}", parents.join(", "));
        }
        println!();
    }
    println!("  Source slots: {}", config.slot_count);
    println!(
        "  Refresh: every {} min, debounce {} ms, manual debounce {} ms",
        refresh.interval.minutes(),
        config.debounce_ms,
        config.manual_debounce_ms
    );
    println!("  Backend: {}", config.backend_url.cyan());
    println!("  State file: {}", config.state_path.display());

    println!("{}", "Valid.".green());
    Ok(())
}

fn cmd_params(path: &Path, selections: &[String]) -> Result<()> {
    let config = load_config(path)?;
    let mut store = FilterStateStore::new(Arc::new(config.filter_graph()?));

    for selection in selections {
        let (filter, value) = selection
            .split_once('=')
            .ok_or_else(|| anyhow!("expected FILTER=VALUE, got '{selection}'"))?;
        let multi = store
            .graph()
            .get(filter)
            .map(|def| def.is_multi_select)
            .ok_or_else(|| anyhow!("unknown filter '{filter}'"))?;
        let change = if multi {
            SelectionChange::Toggle(value.to_string())
        } else {
            SelectionChange::set(value)
        };
        let reset = store.set_selection(filter, change)?;
        for dependent in reset {
            eprintln!("{} {dependent} reset by {filter}", "note:".yellow());
        }
    }

    let params = build_parameters(&store);
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn cmd_age(since: &str, now: Option<&str>) -> Result<()> {
    let since = parse_instant(since)?;
    let now = match now {
        Some(text) => parse_instant(text)?,
        None => Utc::now(),
    };
    println!("{}", format_age(since, now));
    Ok(())
}

async fn cmd_sheet_names(config: &DashboardConfig, url: &str, token: &str) -> Result<()> {
    if tallyboard_ingest::sources::spreadsheet_id(url).is_none() {
        return Err(anyhow!("'{url}' does not look like a spreadsheet URL"));
    }
    let backend = HttpBackend::new(&config.backend_url, config.columns())?;
    match backend.sheet_names(url, &AuthToken::new(token)).await {
        Outcome::Success(names) => {
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Outcome::Failure { reason } => Err(anyhow!("listing sheets failed: {reason}")),
    }
}
