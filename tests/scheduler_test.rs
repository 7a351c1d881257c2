//! Integration tests for the scheduling cycle and dispatcher.
//!
//! Uses a scripted catalog source, a recording chat gateway, and an
//! in-memory SQLite pool. Timer behavior runs under tokio's paused clock,
//! so nothing here sleeps in real time.
//!
//! Run with: cargo test --test scheduler_test

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use r2d2_sqlite::SqliteConnectionManager;

use anisched::anilist::{AiringSchedule, CoverImage, Media, MediaTitle, QueryError};
use anisched::chat::{ChannelRef, ChatGateway, GatewayError, MessageHandle};
use anisched::render::Embed;
use anisched::scheduler::{self, dispatch, ScheduleSource, SchedulerDeps, SchedulerState};
use anisched::storage::{self, watch, DbPool, ThreadArchiveTime};

// ── fixtures ─────────────────────────────────────────────────────────────────

fn make_airing(airing_id: i64, media_id: i64, episode: u32, airing_at: i64, episodes: Option<u32>) -> AiringSchedule {
    AiringSchedule {
        id: airing_id,
        episode,
        airing_at,
        time_until_airing: airing_at,
        media: Media {
            id: media_id,
            site_url: format!("https://anilist.co/anime/{media_id}"),
            title: MediaTitle {
                romaji: format!("Show {media_id}"),
                native: None,
                english: None,
            },
            format: None,
            duration: Some(24),
            episodes,
            cover_image: CoverImage::default(),
            external_links: vec![],
        },
    }
}

fn test_pool() -> Arc<DbPool> {
    // One shared in-memory connection: with more, each connection would see
    // its own empty database.
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
    storage::db::init_schema(&pool.get().unwrap()).unwrap();
    Arc::new(pool)
}

/// Catalog source that replays a scripted sequence of cycle results, then
/// keeps answering with the last entry.
struct ScriptedSource {
    script: Mutex<Vec<ScriptStep>>,
    calls: Mutex<u32>,
}

enum ScriptStep {
    Ok(Vec<AiringSchedule>),
    ApiError(String),
}

impl ScriptedSource {
    fn new(script: Vec<ScriptStep>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: Mutex::new(0),
        })
    }

    fn returning(airings: Vec<AiringSchedule>) -> Arc<Self> {
        Self::new(vec![ScriptStep::Ok(airings)])
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ScheduleSource for ScriptedSource {
    async fn upcoming(&self, _media_ids: &[i64], _start: i64, _end: i64) -> Result<Vec<AiringSchedule>, QueryError> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        let step = if script.len() > 1 {
            script.remove(0)
        } else {
            match script.first() {
                Some(ScriptStep::Ok(airings)) => ScriptStep::Ok(airings.clone()),
                Some(ScriptStep::ApiError(message)) => ScriptStep::ApiError(message.clone()),
                None => ScriptStep::Ok(vec![]),
            }
        };
        match step {
            ScriptStep::Ok(airings) => Ok(airings),
            ScriptStep::ApiError(message) => Err(QueryError::Api(message)),
        }
    }
}

/// Catalog source that takes a fixed amount of (paused-clock) time to
/// answer, recording when each call began.
struct SlowSource {
    delay: Duration,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl SlowSource {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            call_times: Mutex::new(Vec::new()),
        })
    }

    fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleSource for SlowSource {
    async fn upcoming(&self, _media_ids: &[i64], _start: i64, _end: i64) -> Result<Vec<AiringSchedule>, QueryError> {
        self.call_times.lock().unwrap().push(tokio::time::Instant::now());
        tokio::time::sleep(self.delay).await;
        Ok(vec![])
    }
}

#[derive(Debug, Clone)]
struct SentMessage {
    channel_id: String,
    description: String,
    mention_role: Option<String>,
}

/// Chat gateway that records every delivery instead of talking to a platform.
#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<SentMessage>>,
    threads: Mutex<Vec<(String, String, u32)>>,
    presence: Mutex<Vec<usize>>,
    missing_channels: HashSet<String>,
    fail_thread_channels: HashSet<String>,
    slow_thread_channels: HashSet<String>,
}

impl RecordingGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_missing_channels(channels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            missing_channels: channels.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        })
    }

    fn with_failing_threads(channels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_thread_channels: channels.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        })
    }

    fn with_slow_threads(channels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            slow_thread_channels: channels.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        })
    }

    fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn threads(&self) -> Vec<(String, String, u32)> {
        self.threads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn resolve_channel(&self, channel_id: &str) -> Option<ChannelRef> {
        if self.missing_channels.contains(channel_id) {
            return None;
        }
        Some(ChannelRef {
            id: channel_id.to_string(),
            guild_id: "guild-1".to_string(),
            name: format!("chan-{channel_id}"),
        })
    }

    async fn send_announcement(
        &self,
        channel: &ChannelRef,
        embed: &Embed,
        mention_role: Option<&str>,
    ) -> Result<MessageHandle, GatewayError> {
        self.sent.lock().unwrap().push(SentMessage {
            channel_id: channel.id.clone(),
            description: embed.description.clone(),
            mention_role: mention_role.map(|r| r.to_string()),
        });
        Ok(MessageHandle {
            channel_id: channel.id.clone(),
            message_id: format!("msg-{}", self.sent.lock().unwrap().len()),
        })
    }

    async fn start_thread(&self, message: &MessageHandle, name: &str, archive_minutes: u32) -> Result<(), GatewayError> {
        if self.fail_thread_channels.contains(&message.channel_id) {
            return Err(GatewayError::Thread("server boost tier too low".to_string()));
        }
        if self.slow_thread_channels.contains(&message.channel_id) {
            tokio::time::sleep(Duration::from_secs(10_000)).await;
        }
        self.threads
            .lock()
            .unwrap()
            .push((message.channel_id.clone(), name.to_string(), archive_minutes));
        Ok(())
    }

    async fn update_presence(&self, tracked_media: usize) {
        self.presence.lock().unwrap().push(tracked_media);
    }
}

fn make_deps(db: Arc<DbPool>, source: Arc<ScriptedSource>, gateway: Arc<RecordingGateway>) -> SchedulerDeps {
    SchedulerDeps {
        db,
        source,
        gateway,
        state: Arc::new(SchedulerState::new()),
    }
}

/// Let spawned timer tasks make progress on the current-thread runtime.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ── dedup invariant ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn overlapping_cycles_arm_exactly_one_timer_per_airing() {
    let db = test_pool();
    watch::upsert_watch(&db.get().unwrap(), "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();

    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 5, 3_600, Some(12))]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source.clone(), gateway);

    // Three consecutive cycles over overlapping windows, all returning the
    // same airing.
    scheduler::run_cycle(&deps, 0).await;
    scheduler::run_cycle(&deps, 10).await;
    scheduler::run_cycle(&deps, 20).await;

    assert_eq!(source.calls(), 3);
    assert_eq!(deps.state.queued_len(), 1, "one queued release per airing id");
    assert_eq!(deps.state.timer_count(), 1, "one timer per airing id across the whole run");
}

#[tokio::test(start_paused = true)]
async fn new_airings_are_added_without_cancelling_existing_timers() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        watch::upsert_watch(&conn, "C1", 7, None, false, ThreadArchiveTime::OneDay).unwrap();
    }

    let source = ScriptedSource::new(vec![
        ScriptStep::Ok(vec![make_airing(77, 9001, 5, 3_600, Some(12))]),
        ScriptStep::Ok(vec![
            make_airing(77, 9001, 5, 3_600, Some(12)),
            make_airing(78, 7, 2, 7_200, None),
        ]),
    ]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway);

    scheduler::run_cycle(&deps, 0).await;
    assert_eq!(deps.state.queued_len(), 1);

    scheduler::run_cycle(&deps, 0).await;
    assert_eq!(deps.state.queued_len(), 2);
    assert!(deps.state.is_queued(77));
    assert!(deps.state.is_queued(78));
    assert_eq!(deps.state.timer_count(), 2);
}

// ── the §8 scenario: one airing, two channels ────────────────────────────────

#[tokio::test(start_paused = true)]
async fn airing_fires_once_into_every_watching_channel() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        watch::upsert_watch(&conn, "C2", 9001, Some("role-5"), false, ThreadArchiveTime::OneDay).unwrap();
    }

    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 5, 3_600, Some(12))]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db.clone(), source, gateway.clone());

    scheduler::run_cycle(&deps, 0).await;

    let queued = deps.state.queued_releases();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].airing_id, 77);
    assert_eq!(queued[0].media_id, 9001);
    assert_eq!(queued[0].delay, Duration::from_secs(3_600), "delay is airingAt - now");

    // Nothing fires before the airing time.
    tokio::time::sleep(Duration::from_secs(3_599)).await;
    settle().await;
    assert!(gateway.sent().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 2, "both watching channels get the announcement");
    let channels: HashSet<_> = sent.iter().map(|m| m.channel_id.as_str()).collect();
    assert_eq!(channels, HashSet::from(["C1", "C2"]));
    assert!(sent.iter().all(|m| m.description.contains("Episode 5")));

    let c2 = sent.iter().find(|m| m.channel_id == "C2").unwrap();
    assert_eq!(c2.mention_role.as_deref(), Some("role-5"));

    // Episode 5 of 12: no completion flag.
    let conn = db.get().unwrap();
    assert!(!watch::get_watch(&conn, "C1", 9001).unwrap().unwrap().completed);
    assert!(!watch::get_watch(&conn, "C2", 9001).unwrap().unwrap().completed);

    assert_eq!(deps.state.queued_len(), 0, "fired airing leaves the queued set");
}

#[tokio::test(start_paused = true)]
async fn past_airing_fires_immediately_with_zero_delay() {
    let db = test_pool();
    watch::upsert_watch(&db.get().unwrap(), "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();

    // Aired 100s before the cycle ran.
    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 5, 900, Some(12))]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway.clone());

    scheduler::run_cycle(&deps, 1_000).await;
    assert_eq!(deps.state.queued_releases()[0].delay, Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(gateway.sent().len(), 1);
}

// ── finale handling ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn finale_marks_every_watch_completed_after_delivery() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        watch::upsert_watch(&conn, "C2", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
    }

    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 12, 3_600, Some(12))]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db.clone(), source, gateway.clone());

    scheduler::run_cycle(&deps, 0).await;
    tokio::time::sleep(Duration::from_secs(3_601)).await;
    settle().await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.description.contains("This is the season finale.")));

    let conn = db.get().unwrap();
    assert!(watch::get_watch(&conn, "C1", 9001).unwrap().unwrap().completed);
    assert!(watch::get_watch(&conn, "C2", 9001).unwrap().unwrap().completed);
    assert!(watch::list_active_media_ids(&conn).unwrap().is_empty());
}

// ── partial failure isolation ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn thread_creation_failure_never_blocks_other_matches() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        for channel in ["A", "B", "C"] {
            watch::upsert_watch(&conn, channel, 9001, None, true, ThreadArchiveTime::OneHour).unwrap();
        }
    }

    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 5, 60, Some(12))]);
    let gateway = RecordingGateway::with_failing_threads(&["B"]);
    let deps = make_deps(db, source, gateway.clone());

    scheduler::run_cycle(&deps, 0).await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 3, "all three channels get the primary message");

    let threads = gateway.threads();
    assert_eq!(threads.len(), 2, "only the failing channel is missing a thread");
    let thread_channels: HashSet<_> = threads.iter().map(|(c, _, _)| c.as_str()).collect();
    assert_eq!(thread_channels, HashSet::from(["A", "C"]));
    assert!(threads.iter().all(|(_, name, _)| name == "Show 9001 Episode 5 Discussion"));
    assert!(threads.iter().all(|(_, _, minutes)| *minutes == 60));
}

#[tokio::test(start_paused = true)]
async fn slow_thread_creation_does_not_delay_later_channels() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "A", 9001, None, true, ThreadArchiveTime::OneHour).unwrap();
        watch::upsert_watch(&conn, "B", 9001, None, true, ThreadArchiveTime::OneHour).unwrap();
    }

    // Thread creation in A hangs for 10000s of paused-clock time.
    let source = ScriptedSource::returning(vec![]);
    let gateway = RecordingGateway::with_slow_threads(&["A"]);
    let deps = make_deps(db, source, gateway.clone());

    let airing = make_airing(77, 9001, 5, 0, Some(12));
    dispatch::announce(&deps, &airing).await;

    // Both primary messages went out without the clock moving: B's delivery
    // never waited on the outcome of A's thread creation.
    let sent = gateway.sent();
    assert_eq!(sent.len(), 2, "B's announcement must not queue behind A's thread creation");

    settle().await;
    let threads = gateway.threads();
    assert_eq!(threads.len(), 1, "A's thread creation is still in flight");
    assert_eq!(threads[0].0, "B");

    tokio::time::sleep(Duration::from_secs(10_001)).await;
    settle().await;
    assert_eq!(gateway.threads().len(), 2, "A's thread still gets created eventually");
}

#[tokio::test(start_paused = true)]
async fn deleted_channel_is_skipped_not_fatal() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "gone", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        watch::upsert_watch(&conn, "C2", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
    }

    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 5, 60, Some(12))]);
    let gateway = RecordingGateway::with_missing_channels(&["gone"]);
    let deps = make_deps(db, source, gateway.clone());

    scheduler::run_cycle(&deps, 0).await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel_id, "C2");
}

// ── failure semantics of the cycle itself ────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn catalog_error_skips_the_cycle_and_recovers_on_the_next() {
    let db = test_pool();
    watch::upsert_watch(&db.get().unwrap(), "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();

    let source = ScriptedSource::new(vec![
        ScriptStep::ApiError("rate limited".to_string()),
        ScriptStep::Ok(vec![make_airing(77, 9001, 5, 3_600, Some(12))]),
    ]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway);

    scheduler::run_cycle(&deps, 0).await;
    assert_eq!(deps.state.queued_len(), 0, "an errored cycle queues nothing");

    // The next scheduled cycle succeeds; no immediate retry happened in between.
    scheduler::run_cycle(&deps, 60).await;
    assert_eq!(deps.state.queued_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_cycle_does_not_push_the_next_one_past_the_overlap() {
    let db = test_pool();
    watch::upsert_watch(&db.get().unwrap(), "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();

    // Each cycle spends 600s of paused-clock time on catalog requests.
    let source = SlowSource::new(Duration::from_secs(600));
    let gateway = RecordingGateway::new();
    let deps = SchedulerDeps {
        db,
        source: source.clone(),
        gateway,
        state: Arc::new(SchedulerState::new()),
    };

    let loop_handle = scheduler::start(deps);
    // Long enough to observe two cycle starts.
    tokio::time::sleep(Duration::from_secs(87_000)).await;
    loop_handle.abort();

    let calls = source.call_times();
    assert!(calls.len() >= 2, "expected at least two cycles, saw {}", calls.len());
    assert_eq!(
        calls[1] - calls[0],
        Duration::from_secs(86_340),
        "the 600s the cycle took must be absorbed so the next one still starts 60s before the window end"
    );
}

#[tokio::test(start_paused = true)]
async fn dispatch_with_zero_matches_completes_quietly() {
    let db = test_pool();
    let source = ScriptedSource::returning(vec![]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway.clone());

    let airing = make_airing(77, 9001, 5, 0, Some(12));
    dispatch::announce(&deps, &airing).await;

    assert!(gateway.sent().is_empty());
    assert_eq!(deps.state.queued_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn presence_reflects_tracked_media_count() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        watch::upsert_watch(&conn, "C2", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        watch::upsert_watch(&conn, "C1", 7, None, false, ThreadArchiveTime::OneDay).unwrap();
    }

    let source = ScriptedSource::returning(vec![]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway.clone());

    scheduler::run_cycle(&deps, 0).await;
    assert_eq!(*gateway.presence.lock().unwrap(), vec![2], "two distinct media ids tracked");
}

// ── process-start reset ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reset_cancels_outstanding_timers() {
    let db = test_pool();
    watch::upsert_watch(&db.get().unwrap(), "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();

    let source = ScriptedSource::returning(vec![make_airing(77, 9001, 5, 3_600, Some(12))]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway.clone());

    scheduler::run_cycle(&deps, 0).await;
    assert_eq!(deps.state.queued_len(), 1);

    deps.state.reset();
    assert_eq!(deps.state.queued_len(), 0);
    assert_eq!(deps.state.timer_count(), 0);

    // The aborted timer never fires.
    tokio::time::sleep(Duration::from_secs(7_200)).await;
    settle().await;
    assert!(gateway.sent().is_empty());
}

// ── server title preference flows into the rendered content ──────────────────

#[tokio::test(start_paused = true)]
async fn dispatch_uses_the_owning_servers_title_format() {
    let db = test_pool();
    {
        let conn = db.get().unwrap();
        watch::upsert_watch(&conn, "C1", 9001, None, false, ThreadArchiveTime::OneDay).unwrap();
        let mut config = storage::server::get_or_create_server_config(&conn, "guild-1").unwrap();
        config.title_format = anisched::anilist::TitleFormat::English;
        storage::server::upsert_server_config(&conn, &config).unwrap();
    }

    let mut airing = make_airing(77, 9001, 5, 0, Some(12));
    airing.media.title.english = Some("The English Title".to_string());

    let source = ScriptedSource::returning(vec![]);
    let gateway = RecordingGateway::new();
    let deps = make_deps(db, source, gateway.clone());

    dispatch::announce(&deps, &airing).await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert!(
        sent[0].description.contains("The English Title"),
        "description should use the server's English preference: {}",
        sent[0].description,
    );
}
