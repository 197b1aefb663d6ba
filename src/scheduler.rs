//! Collector scheduler (C12): a min-heap of periodic callbacks with
//! drift-corrected re-scheduling and an interruptible sleep, grounded in the
//! fixed-interval `tokio::spawn` + `tokio::time::interval` tick loops used
//! throughout the original daemon's background tasks. Generalized here into
//! a priority queue so several tasks of different periods can share one
//! loop rather than one `tokio::spawn` apiece.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// A periodic unit of work. `name` is used only for logging.
pub trait Task: Send {
    fn name(&self) -> &str;
    fn run(&mut self);
}

/// Wraps a plain closure as a [`Task`], for callers with nothing stateful
/// to hold onto.
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F> FnTask<F>
where
    F: FnMut() + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnTask { name: name.into(), f }
    }
}

impl<F> Task for FnTask<F>
where
    F: FnMut() + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) {
        (self.f)()
    }
}

struct Entry {
    next_fire: Instant,
    /// Zero disables rescheduling: the task runs once and is dropped.
    interval: Duration,
    task: Box<dyn Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.next_fire == other.next_fire
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_fire.cmp(&other.next_fire)
    }
}

#[derive(Default)]
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Entry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { heap: BinaryHeap::new() }
    }

    /// Registers `task` to run every `interval`, first firing one interval
    /// from now. An `interval` of zero runs the task exactly once.
    pub fn register(&mut self, task: Box<dyn Task>, interval: Duration) {
        self.heap.push(Reverse(Entry { next_fire: Instant::now() + interval, interval, task }));
    }

    pub fn register_fn(&mut self, name: impl Into<String>, interval: Duration, f: impl FnMut() + Send + 'static) {
        self.register(Box::new(FnTask::new(name, f)), interval);
    }

    /// Runs the scheduler loop until `running` observes `false`. Cancellation
    /// is checked both before sleeping and after waking, so a shutdown
    /// signal that arrives mid-sleep is honored immediately rather than
    /// waiting out the sleeping task's full interval.
    pub async fn run(mut self, mut running: watch::Receiver<bool>) {
        loop {
            if !*running.borrow() {
                return;
            }
            let Some(Reverse(mut entry)) = self.heap.pop() else {
                return;
            };
            let now = Instant::now();
            if entry.next_fire > now {
                tokio::select! {
                    _ = tokio::time::sleep_until(entry.next_fire) => {}
                    _ = running.changed() => {
                        if !*running.borrow() {
                            return;
                        }
                    }
                }
            }
            if !*running.borrow() {
                return;
            }

            entry.task.run();

            if entry.interval.is_zero() {
                let name = entry.task.name();
                tracing::debug!("task {name} completed (one-shot, not rescheduled)");
                continue;
            }

            let now = Instant::now();
            let mut next_fire = entry.next_fire + entry.interval;
            if next_fire <= now {
                let name = entry.task.name();
                tracing::warn!("task {name} exceeded its interval, skipping ahead");
                next_fire = now;
            }
            entry.next_fire = next_fire;
            self.heap.push(Reverse(entry));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn task_fires_repeatedly_at_its_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        {
            let count = count.clone();
            scheduler.register_fn("tick", Duration::from_millis(10), move || {
                count.fetch_add(1, AtomicOrdering::SeqCst);
            });
        }
        let (tx, rx) = watch::channel(true);
        let handle = tokio::spawn(scheduler.run(rx));
        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;
        tx.send(false).unwrap();
        handle.await.unwrap();
        assert!(count.load(AtomicOrdering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn zero_interval_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        {
            let count = count.clone();
            scheduler.register_fn("once", Duration::ZERO, move || {
                count.fetch_add(1, AtomicOrdering::SeqCst);
            });
        }
        let (_tx, rx) = watch::channel(true);
        scheduler.run(rx).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_without_running_pending_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        {
            let count = count.clone();
            scheduler.register_fn("slow", Duration::from_secs(3600), move || {
                count.fetch_add(1, AtomicOrdering::SeqCst);
            });
        }
        let (tx, rx) = watch::channel(true);
        let handle = tokio::spawn(scheduler.run(rx));
        tx.send(false).unwrap();
        handle.await.unwrap();
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);
    }
}
