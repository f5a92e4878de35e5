//! Settlement task runner.
//!
//! A task is `{ name, interval, enabled, run }`. `run` must be idempotent;
//! the runner adds single-flight and minimum-interval enforcement so an
//! overlapping or manual trigger never runs the same task twice at once.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{Engine, EngineError};

pub const DEFAULT_WHEEL_SWEEP_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_PERIOD_SWEEP_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_HOUSEKEEPING_INTERVAL_MS: u64 = 60_000;

/// Intervals of the built-in settlement tasks; `0` disables a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub wheel_sweep_enabled: bool,
    pub wheel_sweep_interval_ms: u64,
    pub period_sweep_enabled: bool,
    pub period_sweep_interval_ms: u64,
    pub housekeeping_interval_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            wheel_sweep_enabled: true,
            wheel_sweep_interval_ms: DEFAULT_WHEEL_SWEEP_INTERVAL_MS,
            period_sweep_enabled: true,
            period_sweep_interval_ms: DEFAULT_PERIOD_SWEEP_INTERVAL_MS,
            housekeeping_interval_ms: DEFAULT_HOUSEKEEPING_INTERVAL_MS,
        }
    }
}

pub type TaskFuture = BoxFuture<'static, Result<(), EngineError>>;

/// Current unix time in milliseconds, supplied by the binary.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Ran,
    Failed,
    Disabled,
    InFlight,
    TooSoon,
}

pub struct Task {
    name: &'static str,
    interval: Duration,
    enabled: bool,
    run: Box<dyn Fn(u64) -> TaskFuture + Send + Sync>,
    running: AtomicBool,
    last_started: Mutex<Option<Instant>>,
}

struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Task {
    pub fn new(
        name: &'static str,
        interval: Duration,
        run: impl Fn(u64) -> TaskFuture + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            interval,
            enabled: !interval.is_zero(),
            run: Box::new(run),
            running: AtomicBool::new(false),
            last_started: Mutex::new(None),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled && !self.interval.is_zero();
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Shortest accepted gap between two starts: the interval less a tenth
    /// of slack for late ticks.
    fn min_gap(&self) -> Duration {
        self.interval - self.interval / 10
    }

    /// Runs the task once unless it is disabled, already running, or last
    /// started less than [`Task::min_gap`] ago.
    pub async fn tick(&self, now_ms: u64) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Disabled;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return TickOutcome::InFlight;
        }
        let _running = Running(&self.running);
        {
            let mut last = self.last_started.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            if last.is_some_and(|at| now.duration_since(at) < self.min_gap()) {
                return TickOutcome::TooSoon;
            }
            *last = Some(now);
        }
        match (self.run)(now_ms).await {
            Ok(()) => TickOutcome::Ran,
            Err(err) => {
                tracing::warn!(task = self.name, error = %err, "task failed");
                TickOutcome::Failed
            }
        }
    }
}

pub struct TaskRunner {
    tasks: Vec<Arc<Task>>,
    clock: Clock,
}

impl TaskRunner {
    pub fn new(clock: Clock) -> Self {
        Self {
            tasks: Vec::new(),
            clock,
        }
    }

    pub fn add(mut self, task: Task) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    /// Drives every enabled task on its own interval until `shutdown` flips.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for task in self.tasks.into_iter().filter(|task| task.is_enabled()) {
            let clock = self.clock.clone();
            let mut shutdown = shutdown.clone();
            tracing::info!(
                task = task.name(),
                interval_ms = task.interval.as_millis() as u64,
                "task scheduled"
            );
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(task.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            task.tick(clock()).await;
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                tracing::info!(task = task.name(), "task stopped");
            }));
        }
        handles
    }
}

/// Wheel auto-draw, period rollover and guard housekeeping.
pub fn settlement_tasks(engine: Arc<Engine>, schedule: &ScheduleConfig, clock: Clock) -> TaskRunner {
    let wheels = engine.clone();
    let periods = engine.clone();
    let housekeeping = engine;
    TaskRunner::new(clock)
        .add(
            Task::new(
                "wheel_auto_draw",
                Duration::from_millis(schedule.wheel_sweep_interval_ms),
                move |now| {
                    let engine = wheels.clone();
                    Box::pin(async move {
                        let drawn = engine.run_due_wheel_draws(now).await?;
                        if !drawn.is_empty() {
                            tracing::info!(count = drawn.len(), "scheduled wheel draws completed");
                        }
                        Ok(())
                    })
                },
            )
            .enabled(schedule.wheel_sweep_enabled),
        )
        .add(
            Task::new(
                "period_rollover",
                Duration::from_millis(schedule.period_sweep_interval_ms),
                move |now| {
                    let engine = periods.clone();
                    Box::pin(async move { engine.rollover(now).map(|_| ()) })
                },
            )
            .enabled(schedule.period_sweep_enabled),
        )
        .add(Task::new(
            "guard_housekeeping",
            Duration::from_millis(schedule.housekeeping_interval_ms),
            move |_| {
                housekeeping.guard().housekeeping();
                Box::pin(async { Ok(()) })
            },
        ))
}
