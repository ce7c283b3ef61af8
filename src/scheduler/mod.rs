//! Scheduler module for polling targets and refreshing their status messages.

mod reconcile;

pub use reconcile::*;

use crate::config::TargetConfig;
use crate::discord::{ChatClient, ChatError, MessageHandle};
use crate::history::{HistorySeries, HistoryStore};
use crate::presentation::{PresentationBuilder, RenderedPayload};
use crate::probe::{probe, ProbeResult, StatusProbe};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};

/// Scheduler error types.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("destination {0} is unavailable")]
    DestinationUnavailable(String),
    #[error("chart rendering failed: {0}")]
    Chart(#[from] crate::chart::ChartError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Lifecycle of one target's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Stopped,
    Scheduled,
    Running,
}

/// Result of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub target: String,
    pub result: ProbeResult,
    pub payload: RenderedPayload,
    pub outcome: ReconcileOutcome,
}

/// Last observation kept for listing.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub checked_at: DateTime<Utc>,
    pub result: ProbeResult,
    pub outcome: ReconcileOutcome,
}

/// Everything a tick needs, shared by all timers.
pub struct TickContext {
    probe: Arc<dyn StatusProbe>,
    history: HistoryStore,
    builder: PresentationBuilder,
    reconciler: MessageReconciler,
    sample_interval: Duration,
    last: Mutex<HashMap<String, TargetSnapshot>>,
}

impl TickContext {
    pub fn new(
        probe: Arc<dyn StatusProbe>,
        chat: Arc<dyn ChatClient>,
        builder: PresentationBuilder,
        sample_interval: Duration,
    ) -> Self {
        Self {
            probe,
            history: HistoryStore::new(sample_interval),
            builder,
            reconciler: MessageReconciler::new(chat),
            sample_interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn reconciler(&self) -> &MessageReconciler {
        &self.reconciler
    }

    /// Probe, record, build and deliver for one target.
    pub async fn tick(&self, target: &TargetConfig, now: DateTime<Utc>) -> TickReport {
        let (host, port) = target.endpoint();
        let result = probe(self.probe.as_ref(), &host, port, target.timeout()).await;

        if let ProbeResult::Online(status) = &result {
            let capacity = target.history_capacity(self.sample_interval);
            self.history.record(&target.channel_id, status.players, capacity, now);
        }

        let history = self.history.snapshot(&target.channel_id);
        let payload = self.builder.build(target, &result, &history, now);
        let outcome = self.reconciler.reconcile(&target.channel_id, &payload).await;

        match (&result, &outcome) {
            (ProbeResult::Offline { error }, _) => {
                tracing::warn!("Target {} is offline: {}", target.name, error)
            }
            (_, o) if !o.is_delivered() => tracing::warn!("Target {}: status not delivered", target.name),
            _ => tracing::debug!("Target {} refreshed", target.name),
        }

        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        last.insert(
            target.name.clone(),
            TargetSnapshot {
                checked_at: now,
                result: result.clone(),
                outcome: outcome.clone(),
            },
        );
        drop(last);

        TickReport {
            target: target.name.clone(),
            result,
            payload,
            outcome,
        }
    }

    /// Probe and build without touching history or the tracked message.
    pub async fn query_once(&self, target: &TargetConfig, now: DateTime<Utc>) -> RenderedPayload {
        let (host, port) = target.endpoint();
        let result = probe(self.probe.as_ref(), &host, port, target.timeout()).await;
        let history = self.history.snapshot(&target.channel_id);
        self.builder.build(target, &result, &history, now)
    }

    pub fn snapshot(&self, target_name: &str) -> Option<TargetSnapshot> {
        self.last
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(target_name)
            .cloned()
    }
}

/// Live schedule for one target.
struct TargetTask {
    timer: JoinHandle<()>,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight count when a tick ends, even by panic.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns one repeating timer per configured target.
pub struct Scheduler {
    ctx: Arc<TickContext>,
    targets: RwLock<Vec<Arc<TargetConfig>>>,
    tasks: Mutex<HashMap<String, TargetTask>>,
}

impl Scheduler {
    pub fn new(ctx: TickContext, targets: Vec<TargetConfig>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            targets: RwLock::new(targets.into_iter().map(Arc::new).collect()),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &TickContext {
        &self.ctx
    }

    /// Arm every configured target; each runs one tick immediately.
    pub fn start(&self) {
        let mut tasks = self.lock_tasks();
        let targets = self.targets();
        tracing::info!("Starting scheduler with {} targets", targets.len());
        self.arm_locked(&mut tasks, targets);
    }

    /// Stop arming future ticks. In-flight ticks finish on their own.
    pub fn stop(&self) {
        Self::disarm_locked(&mut self.lock_tasks());
    }

    /// Replace the target list, cancelling every timer before re-arming.
    ///
    /// The task table stays locked throughout, so concurrent reloads
    /// cannot leave timers for a superseded list running.
    pub fn reload(&self, targets: Vec<TargetConfig>) {
        let mut tasks = self.lock_tasks();
        Self::disarm_locked(&mut tasks);

        let targets: Vec<Arc<TargetConfig>> = targets.into_iter().map(Arc::new).collect();
        *self.targets.write().unwrap_or_else(|p| p.into_inner()) = targets.clone();
        self.arm_locked(&mut tasks, targets);
    }

    fn arm_locked(&self, tasks: &mut HashMap<String, TargetTask>, targets: Vec<Arc<TargetConfig>>) {
        for target in targets {
            // Never two timers for one target.
            if let Some(old) = tasks.remove(&target.name) {
                old.timer.abort();
            }
            tracing::info!(
                "Scheduler: Adding target {} every {:?}",
                target.name,
                target.update_interval()
            );
            let in_flight = Arc::new(AtomicUsize::new(0));
            let timer = tokio::spawn(run_timer(self.ctx.clone(), target.clone(), in_flight.clone()));
            tasks.insert(target.name.clone(), TargetTask { timer, in_flight });
        }
    }

    fn disarm_locked(tasks: &mut HashMap<String, TargetTask>) {
        for (name, task) in tasks.drain() {
            task.timer.abort();
            tracing::info!("Scheduler: Removed target {}", name);
        }
    }

    pub fn targets(&self) -> Vec<Arc<TargetConfig>> {
        self.targets.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn target(&self, name: &str) -> Result<Arc<TargetConfig>, SchedulerError> {
        self.targets()
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SchedulerError::UnknownTarget(name.to_string()))
    }

    pub fn state(&self, name: &str) -> TargetState {
        match self.lock_tasks().get(name) {
            None => TargetState::Stopped,
            Some(task) if task.timer.is_finished() => TargetState::Stopped,
            Some(task) if task.in_flight.load(Ordering::SeqCst) > 0 => TargetState::Running,
            Some(_) => TargetState::Scheduled,
        }
    }

    /// Tick every target once, concurrently.
    pub async fn tick_all(&self) -> Vec<TickReport> {
        let mut set = JoinSet::new();
        for target in self.targets() {
            let ctx = self.ctx.clone();
            set.spawn(async move { ctx.tick(&target, Utc::now()).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!("Tick task failed: {}", e),
            }
        }
        reports
    }

    /// Single-shot status for an interactive query; history is read, not written.
    pub async fn query_once(&self, name: &str) -> Result<RenderedPayload, SchedulerError> {
        let target = self.target(name)?;
        Ok(self.ctx.query_once(&target, Utc::now()).await)
    }

    /// Chart of the existing history, without probing.
    pub fn chart(&self, name: &str) -> Result<Option<Vec<u8>>, SchedulerError> {
        let target = self.target(name)?;
        let history: HistorySeries = self.ctx.history.snapshot(&target.channel_id);
        Ok(self.ctx.builder.renderer().render(&history, target.chart_color)?)
    }

    /// Deliver a single-shot status as a fresh message that is not tracked.
    pub async fn reply_once(&self, name: &str, channel_id: &str) -> Result<MessageHandle, SchedulerError> {
        let payload = self.query_once(name).await?;
        let chat = self.ctx.reconciler.client();
        let destination = chat
            .resolve(channel_id)
            .await?
            .ok_or_else(|| SchedulerError::DestinationUnavailable(channel_id.to_string()))?;
        Ok(chat.send(&destination, &payload).await?)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<String, TargetTask>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fire a tick for `target` every interval until aborted.
async fn run_timer(ctx: Arc<TickContext>, target: Arc<TargetConfig>, in_flight: Arc<AtomicUsize>) {
    let mut interval = tokio::time::interval(target.update_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        // Ticks are not serialized; a slow tick may overlap the next one.
        in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(in_flight.clone());
        let ctx = ctx.clone();
        let target = target.clone();

        tokio::spawn(async move {
            let _guard = guard;

            // Add jitter to avoid thundering herd
            let jitter = rand::random::<u64>() % 100;
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            ctx.tick(&target, Utc::now()).await;
        });
    }
}
