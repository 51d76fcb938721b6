//! Tallyboard sync
//!
//! Keeps a dashboard's data current:
//!
//! ```text
//! ┌──────────────────┐ select / set_source ┌─────────────┐  RefreshTarget   ┌──────────────────┐
//! │ DashboardSession │────────────────────►│  Dashboard  │◄─────────────────│ RefreshScheduler │
//! │                  │─── notify / manual ─┼─────────────┼─────────────────►│ debounce+periodic│
//! └──────────────────┘                     └──────┬──────┘                  └────────┬─────────┘
//!                                                 │ IngestionPipeline                │ busy, status
//!                                                 ▼                                  ▼
//!                                          collaborators                      watch channels
//! ```
//!
//! The scheduler runs at most one refresh at a time. The dashboard tags
//! each run with a generation and drops responses that arrive after a
//! reset.

pub mod config;
pub mod dashboard;
pub mod events;
pub mod relative_time;
pub mod scheduler;
pub mod session;

pub use config::{
    DashboardConfig, RefreshConfig, RefreshConfigError, RefreshInterval, SettingsError,
    ALLOWED_INTERVALS,
};
pub use dashboard::{Collaborators, Dashboard, DashboardError, FILTERS_KEY, SOURCES_KEY};
pub use events::{RunKind, SessionEvent, SessionEventHandler};
pub use relative_time::{describe_elapsed, format_age, format_age_in};
pub use scheduler::{
    Clock, RefreshScheduler, RefreshStatus, RefreshTarget, RunOutcome, SchedulerState,
    SystemClock,
};
pub use session::DashboardSession;
