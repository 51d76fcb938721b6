//! Refresh triggers: debounced filter changes, debounced manual refreshes and
//! a periodic timer, funnelled into one run at a time.
//!
//! ```text
//! filter change ───► debounce ──► refresh_query ──┐
//! manual refresh ──► debounce ──► reingest ───────┼──► single flight ──► busy / status
//! interval timer ────────────────► reingest ───────┘
//! ```
//!
//! A full run triggered while another run is in flight is dropped. A query
//! run triggered while busy is remembered and starts once the current run
//! ends, so the last filter edit is never lost.

use crate::config::{RefreshConfig, RefreshConfigError, RefreshInterval};
use crate::events::RunKind;
use crate::relative_time::format_age;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// How a run ended, as reported by the [`RefreshTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// No source to ingest; the target reset itself.
    NothingToDo,
    Failed(String),
    /// The response belonged to state that was reset while it was in flight.
    Discarded,
}

/// What the scheduler drives.
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    /// Fetch with the current filter parameters.
    async fn refresh_query(&self) -> RunOutcome;

    /// Run the whole ingestion pipeline.
    async fn reingest(&self) -> RunOutcome;
}

/// Wall-clock source for refresh timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// When data was last refreshed, and how long ago that reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStatus {
    pub last_timestamp: Option<DateTime<Utc>>,
    pub formatted_age: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// A debounce timer is armed.
    Pending,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Debounce {
    Filters,
    Manual,
}

impl Debounce {
    fn run_kind(self) -> RunKind {
        match self {
            Debounce::Filters => RunKind::Query,
            Debounce::Manual => RunKind::Full,
        }
    }
}

#[derive(Default)]
struct DebounceSlot {
    /// Bumped on every re-arm; a timer that wakes with an older value lost a
    /// race with `abort` and must not fire.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl DebounceSlot {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct Timers {
    config: RefreshConfig,
    running: bool,
    deferred_query: bool,
    shut_down: bool,
    filters: DebounceSlot,
    manual: DebounceSlot,
    periodic: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl Timers {
    fn slot(&mut self, which: Debounce) -> &mut DebounceSlot {
        match which {
            Debounce::Filters => &mut self.filters,
            Debounce::Manual => &mut self.manual,
        }
    }

    fn delay(&self, which: Debounce) -> Duration {
        match which {
            Debounce::Filters => self.config.debounce,
            Debounce::Manual => self.config.manual_debounce,
        }
    }
}

struct Shared {
    target: Arc<dyn RefreshTarget>,
    clock: Arc<dyn Clock>,
    timers: Mutex<Timers>,
    busy: watch::Sender<bool>,
    status: watch::Sender<RefreshStatus>,
}

/// Clears the single-flight flag even if the target panics.
struct RunGuard<'a> {
    shared: &'a Shared,
    released: bool,
}

impl RunGuard<'_> {
    fn release(&mut self) -> bool {
        self.released = true;
        self.shared.finish_run()
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.shared.finish_run();
        }
    }
}

impl Shared {
    fn trigger(self: &Arc<Self>, kind: RunKind) {
        {
            let mut timers = self.timers.lock();
            if timers.shut_down {
                return;
            }
            if timers.running {
                match kind {
                    RunKind::Query => {
                        tracing::debug!("run in flight, deferring query refresh");
                        timers.deferred_query = true;
                    }
                    RunKind::Full => tracing::debug!("run in flight, dropping full refresh"),
                }
                return;
            }
            timers.running = true;
            self.busy.send_replace(true);
        }

        tracing::debug!(%kind, "scheduler -> running");
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.run(kind).await });
    }

    async fn run(self: Arc<Self>, kind: RunKind) {
        let mut guard = RunGuard {
            shared: &self,
            released: false,
        };
        let outcome = match kind {
            RunKind::Query => self.target.refresh_query().await,
            RunKind::Full => self.target.reingest().await,
        };
        match (kind, &outcome) {
            (RunKind::Full, RunOutcome::Succeeded) => self.mark_refreshed(),
            (RunKind::Full, RunOutcome::NothingToDo) => self.clear_status(),
            _ => {}
        }
        tracing::debug!(%kind, ?outcome, "scheduler -> idle");

        if guard.release() {
            if outcome == RunOutcome::NothingToDo {
                tracing::debug!("dashboard cleared, dropping deferred query refresh");
            } else {
                self.trigger(RunKind::Query);
            }
        }
    }

    /// Returns whether a query run was deferred while this run was in flight.
    fn finish_run(&self) -> bool {
        let mut timers = self.timers.lock();
        timers.running = false;
        self.busy.send_replace(false);
        std::mem::take(&mut timers.deferred_query) && !timers.shut_down
    }

    fn arm(self: &Arc<Self>, which: Debounce) {
        let mut timers = self.timers.lock();
        if timers.shut_down {
            return;
        }
        let delay = timers.delay(which);
        let slot = timers.slot(which);
        slot.cancel();
        slot.generation += 1;
        let generation = slot.generation;
        let weak = Arc::downgrade(self);
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.debounce_elapsed(which, generation);
            }
        }));
    }

    fn debounce_elapsed(self: &Arc<Self>, which: Debounce, generation: u64) {
        {
            let mut timers = self.timers.lock();
            let slot = timers.slot(which);
            if slot.generation != generation {
                return;
            }
            slot.handle = None;
        }
        self.trigger(which.run_kind());
    }

    fn mark_refreshed(self: &Arc<Self>) {
        let now = self.clock.now();
        self.status.send_replace(RefreshStatus {
            last_timestamp: Some(now),
            formatted_age: format_age(now, now),
        });

        let mut timers = self.timers.lock();
        if !timers.shut_down && timers.ticker.is_none() {
            timers.ticker = Some(spawn_ticker(Arc::downgrade(self)));
        }
    }

    fn clear_status(&self) {
        if let Some(ticker) = self.timers.lock().ticker.take() {
            ticker.abort();
        }
        self.status.send_if_modified(|status| status.last_timestamp.take().is_some());
    }
}

fn spawn_periodic(weak: Weak<Shared>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            tracing::debug!(period_secs = period.as_secs(), "periodic refresh due");
            shared.trigger(RunKind::Full);
        }
    })
}

fn spawn_ticker(weak: Weak<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(1);
        let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            let last = shared.status.borrow().last_timestamp;
            let Some(timestamp) = last else {
                break;
            };
            let age = format_age(timestamp, shared.clock.now());
            shared.status.send_if_modified(|status| {
                if status.formatted_age == age {
                    false
                } else {
                    status.formatted_age = age;
                    true
                }
            });
        }
    })
}

/// Owns the refresh timers for one [`RefreshTarget`].
///
/// Must be created inside a tokio runtime. Dropping the scheduler tears
/// down every timer; a run already in flight is left to finish.
pub struct RefreshScheduler {
    shared: Arc<Shared>,
}

impl RefreshScheduler {
    /// Arm the periodic timer. Nothing runs until a trigger fires.
    pub fn start(
        target: Arc<dyn RefreshTarget>,
        clock: Arc<dyn Clock>,
        config: RefreshConfig,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        let (status, _) = watch::channel(RefreshStatus::default());
        let shared = Arc::new(Shared {
            target,
            clock,
            timers: Mutex::new(Timers {
                config,
                running: false,
                deferred_query: false,
                shut_down: false,
                filters: DebounceSlot::default(),
                manual: DebounceSlot::default(),
                periodic: None,
                ticker: None,
            }),
            busy,
            status,
        });

        let periodic = spawn_periodic(Arc::downgrade(&shared), config.interval.as_duration());
        shared.timers.lock().periodic = Some(periodic);
        tracing::debug!(
            interval_minutes = config.interval.minutes(),
            debounce_ms = config.debounce.as_millis() as u64,
            "refresh scheduler started"
        );

        Self { shared }
    }

    /// (Re)arm the filter debounce; when it elapses the current filter
    /// parameters are fetched.
    pub fn notify_filters_changed(&self) {
        self.shared.arm(Debounce::Filters);
    }

    /// (Re)arm the manual debounce; when it elapses a full run starts unless
    /// one is already in flight.
    pub fn request_manual_refresh(&self) {
        self.shared.arm(Debounce::Manual);
    }

    /// Replace the periodic timer. The next periodic run is one full
    /// `minutes` away; nothing runs immediately.
    pub fn set_interval(&self, minutes: u32) -> Result<RefreshInterval, RefreshConfigError> {
        let interval = RefreshInterval::from_minutes(minutes)?;
        let mut timers = self.shared.timers.lock();
        if timers.shut_down {
            return Ok(interval);
        }
        timers.config.interval = interval;
        if let Some(previous) = timers.periodic.take() {
            previous.abort();
        }
        timers.periodic = Some(spawn_periodic(
            Arc::downgrade(&self.shared),
            interval.as_duration(),
        ));
        tracing::info!(minutes, "refresh interval changed");
        Ok(interval)
    }

    pub fn interval(&self) -> RefreshInterval {
        self.shared.timers.lock().config.interval
    }

    pub fn state(&self) -> SchedulerState {
        let timers = self.shared.timers.lock();
        if timers.running {
            SchedulerState::Running
        } else if timers.filters.handle.is_some() || timers.manual.handle.is_some() {
            SchedulerState::Pending
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.shared.busy.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.shared.busy.subscribe()
    }

    pub fn status(&self) -> RefreshStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RefreshStatus> {
        self.shared.status.subscribe()
    }

    /// Forget the last refresh time and stop the age ticker. The last
    /// formatted age stays as it was.
    pub fn clear_status(&self) {
        self.shared.clear_status();
    }

    /// Cancel every timer. Later triggers are ignored.
    pub fn shutdown(&self) {
        let mut timers = self.shared.timers.lock();
        if timers.shut_down {
            return;
        }
        timers.shut_down = true;
        timers.deferred_query = false;
        timers.filters.cancel();
        timers.manual.cancel();
        for handle in [timers.periodic.take(), timers.ticker.take()].into_iter().flatten() {
            handle.abort();
        }
        tracing::debug!("refresh scheduler shut down");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
