use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::event::{SessionEvent, TimerEvent};

const TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Inner {
    generation: u64,
    /// Bumped whenever the running task is superseded; stale tasks check it
    /// under the lock before emitting.
    run_id: u64,
    budget_secs: u32,
    deadline: Option<Instant>,
    paused_remaining: Option<Duration>,
    expired: bool,
    task: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_task(&mut self) {
        self.run_id += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Per-question countdown with one-second resolution.
///
/// Emits [`TimerEvent::Tick`] every second and exactly one
/// [`TimerEvent::Expired`] when the budget runs out. Pausing freezes the
/// remaining time; events from a superseded countdown are never delivered.
pub struct QuestionFlowScheduler {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl QuestionFlowScheduler {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    /// Begin a fresh countdown, cancelling any running one. Returns its generation.
    pub fn start(&self, budget_secs: u32) -> u64 {
        let mut inner = self.inner.lock();
        inner.cancel_task();
        inner.generation += 1;
        inner.budget_secs = budget_secs;
        inner.paused_remaining = None;
        inner.expired = false;
        let deadline = Instant::now() + Duration::from_secs(u64::from(budget_secs));
        inner.deadline = Some(deadline);
        self.spawn(&mut inner, deadline);
        debug!(generation = inner.generation, budget_secs, "countdown started");
        inner.generation
    }

    /// Cancel and restart with a new budget.
    pub fn reset(&self, budget_secs: u32) -> u64 {
        self.start(budget_secs)
    }

    /// Freeze the countdown. Returns false if nothing was running.
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(deadline) = inner.deadline else {
            return false;
        };
        if inner.paused_remaining.is_some() || inner.expired {
            return false;
        }
        inner.cancel_task();
        inner.paused_remaining = Some(deadline.saturating_duration_since(Instant::now()));
        inner.deadline = None;
        debug!(generation = inner.generation, "countdown paused");
        true
    }

    /// Continue a paused countdown with the time it had left.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(remaining) = inner.paused_remaining.take() else {
            return false;
        };
        let deadline = Instant::now() + remaining;
        inner.deadline = Some(deadline);
        self.spawn(&mut inner, deadline);
        debug!(generation = inner.generation, remaining_ms = remaining.as_millis() as u64, "countdown resumed");
        true
    }

    /// Cancel without emitting anything.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.cancel_task();
        inner.deadline = None;
        inner.paused_remaining = None;
    }

    /// Whole seconds left, rounded up.
    pub fn remaining_secs(&self) -> u32 {
        let inner = self.inner.lock();
        let remaining = match (inner.deadline, inner.paused_remaining) {
            (_, Some(paused)) => paused,
            (Some(deadline), None) => deadline.saturating_duration_since(Instant::now()),
            (None, None) => Duration::ZERO,
        };
        ceil_secs(remaining)
    }

    /// Seconds consumed from the current budget.
    pub fn elapsed_secs(&self) -> u32 {
        let budget = self.inner.lock().budget_secs;
        budget.saturating_sub(self.remaining_secs())
    }

    /// Tag carried by events of the live countdown.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused_remaining.is_some()
    }

    pub fn is_running(&self) -> bool {
        let inner = self.inner.lock();
        inner.deadline.is_some() && !inner.expired
    }

    fn spawn(&self, inner: &mut Inner, deadline: Instant) {
        let shared = Arc::clone(&self.inner);
        let events = self.events.clone();
        let generation = inner.generation;
        let run_id = inner.run_id;
        inner.task = Some(tokio::spawn(async move {
            let mut next_tick = Instant::now() + TICK;
            loop {
                tokio::time::sleep_until(next_tick.min(deadline)).await;
                let now = Instant::now();

                let mut inner = shared.lock();
                if inner.run_id != run_id {
                    return;
                }
                if now >= deadline {
                    inner.expired = true;
                    inner.deadline = None;
                    inner.task = None;
                    let _ = events.send(SessionEvent::Timer(TimerEvent::Expired { generation }));
                    return;
                }
                let remaining_secs = ceil_secs(deadline - now);
                let _ = events.send(SessionEvent::Timer(TimerEvent::Tick {
                    generation,
                    remaining_secs,
                }));
                drop(inner);
                next_tick += TICK;
            }
        }));
    }
}

impl Drop for QuestionFlowScheduler {
    fn drop(&mut self) {
        self.inner.lock().cancel_task();
    }
}

fn ceil_secs(d: Duration) -> u32 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
