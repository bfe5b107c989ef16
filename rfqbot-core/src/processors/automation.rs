//! TradeAutomation engine.
//!
//! The engine owns two independent timers:
//! - the poll timer, which reads new log entries, decodes them, merges them
//!   into the trade store, decides the next action per trade and dispatches
//!   the actions
//! - the hygiene timer, which leaves stale swap channels
//!
//! Each timer has a single run slot. A firing that finds its slot busy is
//! skipped and reported as [`RunOutcome::Skipped`]; the two timers may run
//! concurrently with each other. The trade store is shared behind one mutex
//! that is never held across a tool call.
//!
//! The cursor, the store and the dedup flags belong to the engine instance
//! and survive a stop/start cycle, so a restart does not repeat actions.

use super::cursor::LogCursor;
use super::dispatcher::{ActionDispatcher, TradeAction};
use super::hygiene::{HygieneSweeper, SweepReport, SweepTick};
use super::policy::{LocalIdentity, Policy};
use crate::bridge::{LogSource, ToolError, ToolSurface, invoke_typed};
use crate::events::decode_entry;
use crate::trade::{MergeOutcome, SharedTradeStore, TradeContext, TradeStore};
use crate::utils::clock::now_ms;
use kanau::processor::Processor;
use rfqbot_sdk::config::AutomationConfig;
use rfqbot_sdk::objects::tools::{
    SC_INFO, SC_STATS, SC_SUBSCRIBE, SOL_SIGNER_PUBKEY, ScInfo, ScStats, SignerPubkey,
};
use rfqbot_sdk::objects::{BodyError, Hex32};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StartError {
    #[error("trade automation is already running")]
    AlreadyRunning,

    #[error("bootstrap tool {tool} failed: {source}")]
    Bootstrap {
        tool: &'static str,
        #[source]
        source: ToolError,
    },

    #[error("invalid local peer key: {0}")]
    Identity(#[source] BodyError),
}

/// Result of one poll tick or hygiene sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// The previous run of the same timer was still active.
    Skipped,
    /// The engine is not running.
    NotRunning,
    /// The run could not proceed; it is retried on the next firing.
    Failed(String),
}

impl<T> RunOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }
}

pub type TickOutcome = RunOutcome<TickReport>;
pub type SweepOutcome = RunOutcome<SweepReport>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub channels_polled: usize,
    pub read_errors: usize,
    pub entries: usize,
    pub decode_failures: usize,
    /// Events that filled a slot of a trade context.
    pub applied: usize,
    pub actions_ok: usize,
    pub actions_failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub ticks: u64,
    pub ticks_skipped: u64,
    pub sweeps: u64,
    pub sweeps_skipped: u64,
    pub events_applied: u64,
    pub decode_failures: u64,
    pub actions_ok: u64,
    pub actions_failed: u64,
    pub channels_left: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    pub channels: Vec<String>,
    pub local_peer: Option<String>,
    pub trades: usize,
    pub counters: EngineCounters,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub reason: String,
    /// False when `stop` found nothing to stop.
    pub was_running: bool,
    /// False when a run was still in progress after the stop timeout.
    pub drained: bool,
    pub counters: EngineCounters,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct EngineStats {
    ticks: AtomicU64,
    ticks_skipped: AtomicU64,
    sweeps: AtomicU64,
    sweeps_skipped: AtomicU64,
    events_applied: AtomicU64,
    decode_failures: AtomicU64,
    actions_ok: AtomicU64,
    actions_failed: AtomicU64,
    channels_left: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
}

impl EngineStats {
    fn add(counter: &AtomicU64, value: usize) {
        counter.fetch_add(value as u64, Ordering::Relaxed);
    }

    fn record_error(&self, error: String) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn snapshot(&self) -> EngineCounters {
        EngineCounters {
            ticks: self.ticks.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweeps_skipped: self.sweeps_skipped.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            actions_ok: self.actions_ok.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            channels_left: self.channels_left.load(Ordering::Relaxed),
        }
    }
}

/// Everything bound to one `start()`.
struct Session {
    config: AutomationConfig,
    policy: Policy,
    dispatcher: ActionDispatcher,
    sweeper: HygieneSweeper,
    stopped: AtomicBool,
}

struct Running {
    session: Arc<Session>,
    shutdown_tx: watch::Sender<bool>,
    timers: Vec<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Poll,
    Hygiene,
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timer::Poll => f.write_str("poll"),
            Timer::Hygiene => f.write_str("hygiene"),
        }
    }
}

struct Inner {
    logs: Arc<dyn LogSource>,
    tools: Arc<dyn ToolSurface>,
    store: SharedTradeStore,
    /// Run slot of the poll timer; owns the cursor.
    poll_slot: Mutex<LogCursor>,
    /// Run slot of the hygiene timer.
    sweep_slot: Mutex<()>,
    lifecycle: Mutex<Option<Running>>,
    session: RwLock<Option<Arc<Session>>>,
    stats: EngineStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The trade automation engine. Cheap to clone; clones share one instance.
#[derive(Clone)]
pub struct TradeAutomation {
    inner: Arc<Inner>,
}

impl TradeAutomation {
    pub fn new(logs: Arc<dyn LogSource>, tools: Arc<dyn ToolSurface>) -> Self {
        Self {
            inner: Arc::new(Inner {
                logs,
                tools,
                store: TradeStore::shared(),
                poll_slot: Mutex::new(LogCursor::new()),
                sweep_slot: Mutex::new(()),
                lifecycle: Mutex::new(None),
                session: RwLock::new(None),
                stats: EngineStats::default(),
            }),
        }
    }

    /// Bootstrap, arm both timers, then run the first tick and the first
    /// sweep side by side.
    ///
    /// The lifecycle lock is released before the first runs, so a stalled
    /// first tick holds up neither the hygiene timer nor `stop`.
    pub async fn start(&self, config: AutomationConfig) -> Result<EngineStatus, StartError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let local = self.bootstrap(&config).await?;
        info!(
            local_peer = %local.peer,
            channels = ?config.channels,
            features = ?config.features(),
            "Trade automation starting"
        );

        let dispatcher = ActionDispatcher::new(self.inner.tools.clone(), self.inner.store.clone());
        let session = Arc::new(Session {
            policy: Policy::new(local, &config),
            sweeper: HygieneSweeper::new(
                self.inner.tools.clone(),
                self.inner.store.clone(),
                dispatcher.clone(),
                config.enable_settlement,
            ),
            dispatcher,
            config,
            stopped: AtomicBool::new(false),
        });
        self.set_session(Some(session.clone()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timers = vec![
            self.spawn_timer(Timer::Poll, session.clone(), shutdown_rx.clone()),
            self.spawn_timer(Timer::Hygiene, session.clone(), shutdown_rx),
        ];
        *lifecycle = Some(Running {
            session: session.clone(),
            shutdown_tx,
            timers,
        });
        drop(lifecycle);

        info!("Trade automation started");
        tokio::join!(self.run_tick(&session), self.run_sweep(&session));
        Ok(self.status().await)
    }

    /// Stop both timers and wait for any run in progress to finish.
    ///
    /// The wait is bounded by the session's stop timeout; a run still busy
    /// after that is reported through [`StopReport::drained`] and finishes on
    /// its own.
    pub async fn stop(&self, reason: &str) -> StopReport {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return StopReport {
                reason: reason.to_string(),
                was_running: false,
                drained: true,
                counters: self.inner.stats.snapshot(),
            };
        };

        info!(reason, "Trade automation stopping");
        running.session.stopped.store(true, Ordering::Release);
        let _ = running.shutdown_tx.send(true);
        for timer in running.timers {
            if let Err(e) = timer.await {
                warn!(error = %e, "Timer task ended abnormally");
            }
        }

        // Runs already holding a slot finish; later ones see `stopped`.
        let timeout = running.session.config.stop_timeout();
        let drain = async {
            drop(self.inner.poll_slot.lock().await);
            drop(self.inner.sweep_slot.lock().await);
        };
        let drained = tokio::time::timeout(timeout, drain).await.is_ok();
        if !drained {
            warn!(reason, ?timeout, "A run is still in progress, stopping without it");
        }
        self.set_session(None);

        let counters = self.inner.stats.snapshot();
        info!(reason, drained, ?counters, "Trade automation shutdown complete");
        StopReport {
            reason: reason.to_string(),
            was_running: true,
            drained,
            counters,
        }
    }

    /// Run one poll tick now.
    pub async fn tick(&self) -> TickOutcome {
        match self.session() {
            Some(session) => self.run_tick(&session).await,
            None => RunOutcome::NotRunning,
        }
    }

    /// Run one hygiene sweep now.
    pub async fn sweep(&self) -> SweepOutcome {
        match self.session() {
            Some(session) => self.run_sweep(&session).await,
            None => RunOutcome::NotRunning,
        }
    }

    pub async fn status(&self) -> EngineStatus {
        let session = self.session();
        let trades = self.inner.store.lock().await.len();
        EngineStatus {
            running: session.is_some(),
            channels: session
                .as_ref()
                .map(|s| s.config.channels.clone())
                .unwrap_or_default(),
            local_peer: session
                .as_ref()
                .map(|s| s.policy.local().peer.to_string()),
            trades,
            counters: self.inner.stats.snapshot(),
            last_error: self.inner.stats.last_error(),
        }
    }

    /// Copy of one trade's context.
    pub async fn trade(&self, trade_id: &str) -> Option<TradeContext> {
        self.inner.store.lock().await.get(trade_id).cloned()
    }

    // -- Private helpers ----------------------------------------------------

    fn session(&self) -> Option<Arc<Session>> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session(&self, session: Option<Arc<Session>>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Subscribe and fetch the local identity. Only the identity is required;
    /// a missing signer key or membership list is logged and tolerated. The
    /// membership list seeds the store so that channels joined before this
    /// start are not joined again.
    async fn bootstrap(&self, config: &AutomationConfig) -> Result<LocalIdentity, StartError> {
        let tools = self.inner.tools.as_ref();

        if !config.channels.is_empty() {
            tools
                .invoke(SC_SUBSCRIBE, json!({ "channels": config.channels }))
                .await
                .map_err(|source| StartError::Bootstrap {
                    tool: SC_SUBSCRIBE,
                    source,
                })?;
        }

        let info: ScInfo = invoke_typed(tools, SC_INFO, json!({}))
            .await
            .map_err(|source| StartError::Bootstrap {
                tool: SC_INFO,
                source,
            })?;
        let peer = Hex32::parse(&info.peer).map_err(StartError::Identity)?;

        let settlement_signer =
            match invoke_typed::<SignerPubkey>(tools, SOL_SIGNER_PUBKEY, json!({})).await {
                Ok(signer) => Some(signer.pubkey),
                Err(e) => {
                    warn!(error = %e, "Settlement signer unavailable, continuing without it");
                    None
                }
            };

        match invoke_typed::<ScStats>(tools, SC_STATS, json!({})).await {
            Ok(stats) => {
                debug!(joined = stats.channels.len(), "Fetched channel membership");
                self.inner.store.lock().await.set_membership(stats.channels);
            }
            Err(e) => warn!(error = %e, "Failed to fetch channel membership"),
        }

        Ok(LocalIdentity {
            peer,
            settlement_signer,
        })
    }

    async fn run_tick(&self, session: &Session) -> TickOutcome {
        let stats = &self.inner.stats;
        let Ok(mut cursor) = self.inner.poll_slot.try_lock() else {
            stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous poll tick still running, skipping");
            return RunOutcome::Skipped;
        };
        if session.stopped.load(Ordering::Acquire) {
            return RunOutcome::NotRunning;
        }

        let mut report = TickReport::default();
        let mut events = Vec::new();
        for channel in &session.config.channels {
            report.channels_polled += 1;
            let entries = match cursor.poll(self.inner.logs.as_ref(), channel).await {
                Ok(entries) => entries,
                Err(e) => {
                    report.read_errors += 1;
                    warn!(channel = %channel, error = %e, "Failed to read channel log");
                    stats.record_error(format!("log {channel}: {e}"));
                    continue;
                }
            };
            report.entries += entries.len();
            for entry in &entries {
                match decode_entry(entry) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        report.decode_failures += 1;
                        warn!(
                            channel = %channel,
                            seq = entry.seq,
                            error = %e,
                            "Dropping undecodable log entry"
                        );
                    }
                }
            }
        }

        let now = now_ms();
        let actions: Vec<TradeAction> = {
            let mut store = self.inner.store.lock().await;
            for event in events {
                if matches!(
                    store.apply(event),
                    MergeOutcome::Created | MergeOutcome::Recorded
                ) {
                    report.applied += 1;
                }
            }
            store
                .all()
                .filter_map(|ctx| session.policy.decide(ctx, now))
                .collect()
        };

        for action in actions {
            match session.dispatcher.process(action).await {
                Ok(_) => report.actions_ok += 1,
                Err(e) => {
                    report.actions_failed += 1;
                    stats.record_error(e.to_string());
                }
            }
        }
        drop(cursor);

        stats.ticks.fetch_add(1, Ordering::Relaxed);
        EngineStats::add(&stats.events_applied, report.applied);
        EngineStats::add(&stats.decode_failures, report.decode_failures);
        EngineStats::add(&stats.actions_ok, report.actions_ok);
        EngineStats::add(&stats.actions_failed, report.actions_failed);
        if report.entries > 0 || report.actions_ok + report.actions_failed > 0 {
            debug!(?report, "Poll tick finished");
        }
        RunOutcome::Completed(report)
    }

    async fn run_sweep(&self, session: &Session) -> SweepOutcome {
        let stats = &self.inner.stats;
        let Ok(slot) = self.inner.sweep_slot.try_lock() else {
            stats.sweeps_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous hygiene sweep still running, skipping");
            return RunOutcome::Skipped;
        };
        if session.stopped.load(Ordering::Acquire) {
            return RunOutcome::NotRunning;
        }

        let result = session.sweeper.process(SweepTick { now_ms: now_ms() }).await;
        drop(slot);

        stats.sweeps.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(report) => {
                EngineStats::add(&stats.channels_left, report.left);
                EngineStats::add(&stats.actions_ok, report.left);
                EngineStats::add(&stats.actions_failed, report.failed);
                if report.failed > 0 {
                    stats.record_error(format!("{} channel leave(s) failed", report.failed));
                }
                RunOutcome::Completed(report)
            }
            Err(e) => {
                warn!(error = %e, "Hygiene sweep failed to list joined channels");
                stats.record_error(format!("hygiene: {e}"));
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    fn spawn_timer(
        &self,
        timer: Timer,
        session: Arc<Session>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let period: Duration = match timer {
            Timer::Poll => session.config.poll_interval(),
            Timer::Hygiene => session.config.hygiene_interval(),
        };

        tokio::spawn(async move {
            debug!(%timer, ?period, "Timer started");
            // `start` performs the first run of each timer.
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }

                    _ = interval.tick() => {
                        let engine = engine.clone();
                        let session = session.clone();
                        // Runs are detached so that a slow run shows up as a
                        // skipped firing instead of a delayed one.
                        tokio::spawn(async move {
                            match timer {
                                Timer::Poll => {
                                    engine.run_tick(&session).await;
                                }
                                Timer::Hygiene => {
                                    engine.run_sweep(&session).await;
                                }
                            }
                        });
                    }
                }
            }
            debug!(%timer, "Timer stopped");
        })
    }
}
