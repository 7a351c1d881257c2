//! Announcement scheduling cycle.
//!
//! Keeps exactly one outstanding timer per not-yet-aired episode of every
//! tracked media item, over a rolling 24-hour lookahead window, and re-arms
//! itself one minute before the window's right edge so consecutive windows
//! always overlap.
//!
//! All state lives in an owned `SchedulerState` (queued-release map plus
//! timer handles), never in a global: independent instances (one per test)
//! do not interfere. Timers are `tokio::spawn`ed sleeps; cycles never cancel
//! a live peer's timer — deduplication on the airing ID does that job with
//! less churn. The only cancellation path is the defensive `reset` at
//! process start.

pub mod dispatch;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

use crate::anilist::{AiringSchedule, AniListClient, QueryError};
use crate::chat::ChatGateway;
use crate::core::config;
use crate::storage::{self, DbPool};

/// Where the cycle gets airing schedules from.
///
/// Implemented by `AniListClient`; tests substitute a scripted source.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Airing schedules for `media_ids` with `start <= airingAt < end`.
    async fn upcoming(&self, media_ids: &[i64], start: i64, end: i64) -> Result<Vec<AiringSchedule>, QueryError>;
}

#[async_trait]
impl ScheduleSource for AniListClient {
    async fn upcoming(&self, media_ids: &[i64], start: i64, end: i64) -> Result<Vec<AiringSchedule>, QueryError> {
        self.get_upcoming_episodes(media_ids, start, end, None).await
    }
}

/// An episode with an outstanding announcement timer.
#[derive(Debug, Clone)]
pub struct QueuedRelease {
    pub airing_id: i64,
    pub media_id: i64,
    /// Airing time in unix seconds.
    pub fire_at: i64,
    /// Delay the timer was armed with (clamped to zero for past airings).
    pub delay: Duration,
}

/// Owned queue/timer state shared by the cycle and the dispatcher.
#[derive(Default)]
pub struct SchedulerState {
    queued: Mutex<HashMap<i64, QueuedRelease>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

// A poisoned mutex only means a panicking timer task died mid-update; the
// map itself stays usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an announcement timer is outstanding for this airing ID.
    pub fn is_queued(&self, airing_id: i64) -> bool {
        lock(&self.queued).contains_key(&airing_id)
    }

    /// Number of airings with an outstanding timer.
    pub fn queued_len(&self) -> usize {
        lock(&self.queued).len()
    }

    /// Snapshot of the queued releases, in no particular order.
    pub fn queued_releases(&self) -> Vec<QueuedRelease> {
        lock(&self.queued).values().cloned().collect()
    }

    /// Number of retained timer handles (live or already finished).
    pub fn timer_count(&self) -> usize {
        lock(&self.timers).len()
    }

    /// Record a release as queued. Returns false (and changes nothing) when
    /// a timer for this airing ID already exists — the dedup contract.
    fn enqueue(&self, release: QueuedRelease) -> bool {
        let mut queued = lock(&self.queued);
        if queued.contains_key(&release.airing_id) {
            return false;
        }
        queued.insert(release.airing_id, release);
        true
    }

    /// Remove a release once its timer has conclusively fired.
    pub(crate) fn remove(&self, airing_id: i64) -> Option<QueuedRelease> {
        lock(&self.queued).remove(&airing_id)
    }

    fn retain_timer(&self, handle: JoinHandle<()>) {
        lock(&self.timers).push(handle);
    }

    /// Drop handles of timers that already fired so the vector doesn't grow
    /// for the whole process lifetime.
    fn prune_finished_timers(&self) {
        lock(&self.timers).retain(|handle| !handle.is_finished());
    }

    /// Cancel every outstanding timer and forget every queued release.
    ///
    /// Used once at process start to clear anything left over from a crash
    /// recovery path; steady-state cycles rely on deduplication instead.
    pub fn reset(&self) {
        let mut timers = lock(&self.timers);
        for handle in timers.drain(..) {
            handle.abort();
        }
        drop(timers);
        lock(&self.queued).clear();
    }
}

/// Everything the cycle and dispatcher need, bundled for cloning into tasks.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub db: Arc<DbPool>,
    pub source: Arc<dyn ScheduleSource>,
    pub gateway: Arc<dyn ChatGateway>,
    pub state: Arc<SchedulerState>,
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Delay until an airing time, clamped to zero.
///
/// An episode that already aired by the time the cycle sees it fires
/// immediately; the delay is never negative.
pub fn fire_delay(airing_at: i64, now: i64) -> Duration {
    Duration::from_secs(airing_at.saturating_sub(now).max(0) as u64)
}

/// Start the steady-state scheduling loop as a background task.
///
/// Performs the one-time defensive reset, then starts a cycle 60s before
/// each window's right edge for the life of the process. The time a cycle
/// itself takes (paginated catalog requests, DB access) is absorbed into
/// the wait, so a slow cycle never pushes the next one past the overlap.
pub fn start(deps: SchedulerDeps) -> JoinHandle<()> {
    tokio::spawn(async move {
        deps.state.reset();
        log::info!(
            "Announcement scheduler started (window: {}s, re-arm lead: {}s)",
            config::scheduler::WINDOW_SECS,
            config::scheduler::REARM_LEAD_SECS,
        );

        loop {
            let cycle_started = tokio::time::Instant::now();
            run_cycle(&deps, unix_now()).await;
            let wait = config::scheduler::rearm_delay().saturating_sub(cycle_started.elapsed());
            tokio::time::sleep(wait).await;
        }
    })
}

/// Run one polling cycle at wall-clock `now` (unix seconds).
///
/// Collects the tracked media set, queries the catalog for the next window,
/// and arms one timer per airing that isn't queued yet. Any failure is
/// logged and ends the cycle early; the caller's re-arm is unaffected.
pub async fn run_cycle(deps: &SchedulerDeps, now: i64) {
    deps.state.prune_finished_timers();

    let media_ids = {
        let conn = match storage::get_connection(&deps.db) {
            Ok(conn) => conn,
            Err(e) => {
                log::error!("Scheduler cycle: no database connection: {}", e);
                return;
            }
        };
        match storage::watch::list_active_media_ids(&conn) {
            Ok(ids) => ids,
            Err(e) => {
                log::error!("Scheduler cycle: failed to list tracked media: {}", e);
                return;
            }
        }
    };

    deps.gateway.update_presence(media_ids.len()).await;

    if media_ids.is_empty() {
        log::debug!("Scheduler cycle: nothing is being watched");
        return;
    }

    let window_end = now + config::scheduler::WINDOW_SECS;
    let airings = match deps.source.upcoming(&media_ids, now, window_end).await {
        Ok(airings) => airings,
        Err(e) => {
            log::warn!("Scheduler cycle: airing query failed, retrying next cycle: {}", e);
            return;
        }
    };

    log::info!(
        "Scheduler cycle: {} tracked media, {} airing(s) in the next {}s",
        media_ids.len(),
        airings.len(),
        config::scheduler::WINDOW_SECS,
    );

    for airing in airings {
        schedule_announcement(deps, airing, now);
    }
}

/// Arm the announcement timer for one airing, unless one already exists.
fn schedule_announcement(deps: &SchedulerDeps, airing: AiringSchedule, now: i64) {
    let delay = fire_delay(airing.airing_at, now);
    let release = QueuedRelease {
        airing_id: airing.id,
        media_id: airing.media.id,
        fire_at: airing.airing_at,
        delay,
    };

    if !deps.state.enqueue(release) {
        // Timer already outstanding for this airing; never arm a second one.
        return;
    }

    let airs_at = chrono::DateTime::from_timestamp(airing.airing_at, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| airing.airing_at.to_string());
    log::info!(
        "Scheduled announcement for {} episode {} at {} (in {}s)",
        airing.media.title.romaji,
        airing.episode,
        airs_at,
        delay.as_secs(),
    );

    let task_deps = deps.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        dispatch::announce(&task_deps, &airing).await;
    });
    deps.state.retain_timer(handle);
}
