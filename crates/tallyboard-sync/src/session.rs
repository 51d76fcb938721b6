//! A dashboard paired with the scheduler that refreshes it.

use crate::config::{RefreshConfig, RefreshConfigError, RefreshInterval};
use crate::dashboard::{Dashboard, DashboardError};
use crate::scheduler::{Clock, RefreshScheduler, RefreshStatus, SchedulerState};
use std::sync::Arc;
use tallyboard_filters::{FilterId, SelectionChange, SelectionError};
use tallyboard_ingest::SourceDescriptor;
use tokio::sync::watch;

/// What a UI talks to: selection edits, source edits and refresh controls.
pub struct DashboardSession {
    dashboard: Arc<Dashboard>,
    scheduler: RefreshScheduler,
}

impl DashboardSession {
    /// Publish the filter declarations, then arm the refresh timers.
    pub async fn start(dashboard: Dashboard, clock: Arc<dyn Clock>, config: RefreshConfig) -> Self {
        let dashboard = Arc::new(dashboard);
        dashboard.publish_filters().await;
        let scheduler = RefreshScheduler::start(dashboard.clone(), clock, config);
        Self {
            dashboard,
            scheduler,
        }
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.dashboard
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Apply a selection edit and schedule a debounced fetch.
    pub fn select(
        &self,
        filter_id: &str,
        change: SelectionChange,
    ) -> Result<Vec<FilterId>, SelectionError> {
        let reset = self.dashboard.select(filter_id, change)?;
        self.scheduler.notify_filters_changed();
        Ok(reset)
    }

    /// Edit a source slot. Removing the last source clears the dashboard and
    /// the refresh status.
    pub async fn set_source(
        &self,
        index: usize,
        descriptor: Option<SourceDescriptor>,
    ) -> Result<(), DashboardError> {
        if self.dashboard.set_source(index, descriptor).await? {
            self.scheduler.clear_status();
        }
        Ok(())
    }

    pub async fn clear_source(&self, index: usize) -> Result<(), DashboardError> {
        self.set_source(index, None).await
    }

    /// Ask for a full run after the manual debounce.
    pub fn refresh_now(&self) {
        self.scheduler.request_manual_refresh();
    }

    pub fn set_interval(&self, minutes: u32) -> Result<RefreshInterval, RefreshConfigError> {
        self.scheduler.set_interval(minutes)
    }

    pub fn busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.scheduler.subscribe_busy()
    }

    pub fn status(&self) -> RefreshStatus {
        self.scheduler.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RefreshStatus> {
        self.scheduler.subscribe_status()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
