//! `tallyboard run`: a refreshing dashboard session in the terminal.

use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tallyboard_ingest::http::HttpBackend;
use tallyboard_ingest::{AuthToken, ViewMode, ViewModeSink};
use tallyboard_storage::{open_store, KeyValueStore};
use tallyboard_sync::{
    Collaborators, Dashboard, DashboardConfig, DashboardSession, RefreshInterval, RefreshTarget,
    RunOutcome, SessionEvent, SystemClock,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// OAuth token forwarded when processing remote sheets
    #[arg(long, default_value = "")]
    pub token: String,
    /// Override the refresh interval (minutes: 1, 5, 10, 15, 30 or 60)
    #[arg(long)]
    pub interval: Option<u32>,
    /// Run the pipeline once, print the result and exit
    #[arg(long)]
    pub once: bool,
}

/// Logs view-mode transitions; there is no screen to switch.
struct ConsoleView;

impl ViewModeSink for ConsoleView {
    fn set_view_mode(&self, mode: ViewMode) {
        tracing::debug!(%mode, "view mode");
    }
}

/// Dashboard wired to the configured backend and state file.
pub fn open_dashboard(config: &DashboardConfig) -> Result<Dashboard> {
    let graph = Arc::new(config.filter_graph()?);
    let backend = Arc::new(HttpBackend::new(&config.backend_url, config.columns())?);
    let store: Arc<dyn KeyValueStore> = Arc::new(open_store(&config.state_path)?);
    Ok(Dashboard::open(
        graph,
        config.slot_count,
        Collaborators::from_backend(backend, Arc::new(ConsoleView)),
        store,
    ))
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::RunStarted { run_id, kind } => {
            println!("{} {kind} run {run_id}", "Refreshing".green().bold());
        }
        SessionEvent::RunFinished { kind, options, .. } => {
            println!("  {} {kind} run, {options} option lists", "Finished".green());
        }
        SessionEvent::RunFailed { kind, message, .. } => {
            println!("  {} {kind} run: {message}", "Failed".red().bold());
        }
        SessionEvent::StaleResponseDiscarded { run_id, .. } => {
            println!("  {} stale response of run {run_id}", "Discarded".yellow());
        }
        SessionEvent::SourcesCleared => println!("{}", "No sources left; dashboard cleared.".yellow()),
        SessionEvent::ViewModeChanged { mode } => println!("  view: {}", mode.to_string().cyan()),
    }
}

fn print_summary(dashboard: &Dashboard) {
    dashboard.with_filters(|filters| {
        for (def, state) in filters.iter() {
            let selected = state.selected.values();
            println!(
                "    {} [{} options] {}",
                def.display_label().bold(),
                state.options.len(),
                if selected.is_empty() {
                    "-".dimmed().to_string()
                } else {
                    selected.join(", ")
                }
            );
        }
    });
}

pub async fn cmd_run(config: &DashboardConfig, args: &RunArgs) -> Result<()> {
    let mut dashboard = open_dashboard(config)?;
    dashboard.set_auth_token(AuthToken::new(args.token.clone()));
    dashboard.on_event(Box::new(print_event));

    if args.once {
        dashboard.publish_filters().await;
        let outcome = dashboard.reingest().await;
        print_summary(&dashboard);
        return match outcome {
            RunOutcome::Failed(message) => Err(anyhow!(message)),
            RunOutcome::NothingToDo => {
                println!("{}", "No sources configured.".yellow());
                Ok(())
            }
            RunOutcome::Succeeded | RunOutcome::Discarded => Ok(()),
        };
    }

    let mut refresh = config.refresh_config()?;
    if let Some(minutes) = args.interval {
        refresh.interval = RefreshInterval::from_minutes(minutes)?;
    }
    let session = DashboardSession::start(dashboard, Arc::new(SystemClock), refresh).await;
    println!(
        "{} every {} min (Ctrl-C to stop)",
        "Watching".green().bold(),
        refresh.interval.minutes()
    );
    session.refresh_now();

    let mut status = session.subscribe_status();
    let mut last_seen = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.last_timestamp.is_some() && current.last_timestamp != last_seen {
                    last_seen = current.last_timestamp;
                    println!("  {} {}", "Updated".cyan(), current.formatted_age);
                    print_summary(session.dashboard());
                }
            }
        }
    }

    session.shutdown();
    println!("{}", "Stopped.".green());
    Ok(())
}
