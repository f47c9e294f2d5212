//! Tokio decision loop around the sans-IO engine.
//!
//! Ticks, execution completions and timer ticks all arrive on one mpsc
//! queue and are applied to the [`Orchestrator`] one at a time. Venue calls
//! run in spawned tasks so a slow venue never blocks tick ingestion; their
//! results re-enter the queue as [`LoopInput::Execution`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::domain::{Tick, Ticket};
use crate::engine::{EngineCommand, EventSink, ExecutionReport, Orchestrator};
use crate::gateway::{ExecutionError, ExecutionGateway};

#[derive(Debug, Clone)]
pub enum LoopInput {
    Tick(Tick),
    Execution(ExecutionReport),
    /// Run a reconciliation pass now.
    ReconcileTimer,
    /// Stop taking ticks, drain in-flight venue calls, then return.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("decision loop has stopped")]
pub struct LoopClosed;

/// Sending side of the decision loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    tx: mpsc::Sender<LoopInput>,
}

impl LoopHandle {
    pub async fn send(&self, input: LoopInput) -> Result<(), LoopClosed> {
        self.tx.send(input).await.map_err(|_| LoopClosed)
    }

    pub async fn tick(&self, tick: Tick) -> Result<(), LoopClosed> {
        self.send(LoopInput::Tick(tick)).await
    }

    pub async fn reconcile(&self) -> Result<(), LoopClosed> {
        self.send(LoopInput::ReconcileTimer).await
    }

    pub async fn shutdown(&self) -> Result<(), LoopClosed> {
        self.send(LoopInput::Shutdown).await
    }
}

/// Bounded retry with exponential backoff for `Unavailable` venue errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. Returns the outcome and the attempt count.
    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> (Result<T, ExecutionError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let mut delay = self.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(what, attempt, error = %err, backoff_ms = delay.as_millis() as u64, "venue call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.multiplier);
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}

/// Owns the engine and drives it from the input queue.
pub struct DecisionLoop<G, S>
where
    G: ExecutionGateway + 'static,
    S: EventSink,
{
    engine: Orchestrator<S>,
    gateway: Arc<G>,
    policy: RetryPolicy,
    reconcile_every: Option<Duration>,
    rx: mpsc::Receiver<LoopInput>,
    // Weak so the queue closes once every handle and task is gone.
    tx: mpsc::WeakSender<LoopInput>,
    tasks: JoinSet<()>,
}

impl<G, S> DecisionLoop<G, S>
where
    G: ExecutionGateway + 'static,
    S: EventSink,
{
    pub fn new(
        engine: Orchestrator<S>,
        gateway: Arc<G>,
        config: &ExecutionConfig,
    ) -> (Self, LoopHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let reconcile_every = (config.reconcile_interval_secs > 0)
            .then(|| Duration::from_secs(config.reconcile_interval_secs));
        let this = Self {
            engine,
            gateway,
            policy: RetryPolicy::from_config(config),
            reconcile_every,
            rx,
            tx: tx.downgrade(),
            tasks: JoinSet::new(),
        };
        (this, LoopHandle { tx })
    }

    /// Run until shutdown, or until every handle is dropped. Returns the
    /// engine with no venue call in flight and no open request pending.
    pub async fn run(mut self) -> Orchestrator<S> {
        info!("decision loop started");
        let mut timer = self.reconcile_every.map(|every| {
            let mut t = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            t.set_missed_tick_behavior(MissedTickBehavior::Skip);
            t
        });
        let mut shutting_down = false;

        loop {
            if shutting_down && self.tasks.is_empty() {
                break;
            }
            tokio::select! {
                biased;
                joined = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Some(Err(err)) = joined {
                        error!(error = %err, "venue task failed");
                    }
                }
                input = self.rx.recv() => match input {
                    Some(input) => self.handle(input, &mut shutting_down),
                    None => {
                        debug!("all handles dropped");
                        shutting_down = true;
                    }
                },
                _ = next_timer(&mut timer), if !shutting_down => {
                    self.spawn_reconcile();
                }
            }
        }

        // Tasks have finished, so their reports are already queued.
        while let Ok(input) = self.rx.try_recv() {
            if let LoopInput::Execution(report) = input {
                self.engine.on_execution(report);
            }
        }
        let abandoned = self.engine.abandon_pending();
        info!(
            rolled_back = abandoned.len(),
            open_positions = self.engine.open_tickets().len(),
            "decision loop stopped"
        );
        self.engine
    }

    fn handle(&mut self, input: LoopInput, shutting_down: &mut bool) {
        match input {
            LoopInput::Tick(tick) if *shutting_down => {
                debug!(at = %tick.timestamp, "tick ignored during shutdown");
            }
            LoopInput::Tick(tick) => {
                let commands = self.engine.on_tick(&tick);
                self.dispatch(commands);
            }
            LoopInput::Execution(report) => self.engine.on_execution(report),
            LoopInput::ReconcileTimer if *shutting_down => {}
            LoopInput::ReconcileTimer => self.spawn_reconcile(),
            LoopInput::Shutdown => {
                info!(in_flight = self.tasks.len(), "shutdown requested");
                *shutting_down = true;
            }
        }
    }

    fn event_time(&self) -> DateTime<Utc> {
        self.engine
            .last_tick()
            .map(|t| t.timestamp)
            .unwrap_or_else(Utc::now)
    }

    fn dispatch(&mut self, commands: Vec<EngineCommand>) {
        let at = self.event_time();
        for command in commands {
            let Some(tx) = self.tx.upgrade() else {
                warn!("queue closed; dropping venue command");
                return;
            };
            let gateway = Arc::clone(&self.gateway);
            let policy = self.policy;
            self.tasks.spawn(async move {
                let Some(report) = execute(gateway.as_ref(), &policy, command, at).await else {
                    return;
                };
                if tx.send(LoopInput::Execution(report)).await.is_err() {
                    warn!("decision loop gone; execution report lost");
                }
            });
        }
    }

    fn spawn_reconcile(&mut self) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let checked = self.engine.open_tickets();
        let gateway = Arc::clone(&self.gateway);
        let policy = self.policy;
        let at = self.event_time();
        self.tasks.spawn(async move {
            if let Some(report) = reconcile(gateway.as_ref(), &policy, checked, at).await {
                if tx.send(LoopInput::Execution(report)).await.is_err() {
                    warn!("decision loop gone; reconciliation lost");
                }
            }
        });
    }
}

async fn next_timer(timer: &mut Option<Interval>) {
    match timer.as_mut() {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn execute<G: ExecutionGateway + ?Sized>(
    gateway: &G,
    policy: &RetryPolicy,
    command: EngineCommand,
    at: DateTime<Utc>,
) -> Option<ExecutionReport> {
    match command {
        EngineCommand::Open {
            request_id,
            request,
        } => {
            let (result, _) = policy
                .run("open", || gateway.open_position(&request))
                .await;
            Some(match result {
                Ok(fill) => ExecutionReport::Opened {
                    request_id,
                    fill,
                    at,
                },
                Err(error) => ExecutionReport::OpenFailed { request_id, error },
            })
        }
        EngineCommand::Close { ticket, reason } => {
            debug!(%ticket, %reason, "closing");
            let (result, attempts) = policy.run("close", || gateway.close_position(ticket)).await;
            Some(match result {
                Ok(fill) => ExecutionReport::Closed { ticket, fill, at },
                Err(error) => ExecutionReport::CloseFailed {
                    ticket,
                    attempts,
                    error,
                },
            })
        }
        EngineCommand::ModifyStop { ticket, stop_loss } => {
            let (result, _) = policy
                .run("modify_stop", || gateway.modify_stop_loss(ticket, stop_loss))
                .await;
            // The engine already holds the new stop; only failures report back.
            result
                .err()
                .map(|error| ExecutionReport::StopModifyFailed { ticket, error })
        }
    }
}

async fn reconcile<G: ExecutionGateway + ?Sized>(
    gateway: &G,
    policy: &RetryPolicy,
    checked: Vec<Ticket>,
    at: DateTime<Utc>,
) -> Option<ExecutionReport> {
    let (open, _) = policy
        .run("query_open_positions", || gateway.query_open_positions())
        .await;
    let venue_open: Vec<Ticket> = match open {
        Ok(positions) => positions.into_iter().map(|p| p.ticket).collect(),
        Err(err) => {
            warn!(error = %err, "reconciliation skipped");
            return None;
        }
    };
    let missing: Vec<Ticket> = checked
        .iter()
        .copied()
        .filter(|t| !venue_open.contains(t))
        .collect();
    let history = if missing.is_empty() {
        Vec::new()
    } else {
        match gateway.fetch_fill_history(&missing).await {
            Ok(history) => history,
            Err(err) => {
                warn!(error = %err, "fill history unavailable; settling from floating P/L");
                Vec::new()
            }
        }
    };
    Some(ExecutionReport::Reconciled {
        checked,
        venue_open,
        history,
        at,
    })
}
