//! Round-robin poll scheduler driven by an external timer

use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

use crate::core::error::{Error, Result};

/// Zero-argument query issued on rotation
pub type PollOp = Box<dyn FnMut() -> Result<()> + Send>;

pub struct PollTask {
    name: &'static str,
    op: PollOp,
}

impl PollTask {
    pub fn new(name: &'static str, op: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        Self { name, op: Box::new(op) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for PollTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollTask").field("name", &self.name).finish()
    }
}

/// Every `interval` ticks, runs the head task and moves it to the tail.
#[derive(Debug)]
pub struct PollScheduler {
    interval: u32,
    count: u32,
    tasks: VecDeque<PollTask>,
}

impl PollScheduler {
    pub fn new(interval: u32) -> Result<Self> {
        if interval == 0 {
            return Err(Error::Config("poll interval must be at least 1 tick".into()));
        }
        Ok(Self {
            interval,
            count: 0,
            tasks: VecDeque::new(),
        })
    }

    pub fn push(&mut self, task: PollTask) {
        self.tasks.push_back(task);
    }

    pub fn with_task(mut self, task: PollTask) -> Self {
        self.push(task);
        self
    }

    /// Advance one tick. Returns the name of the task run on this tick, if any.
    pub fn on_tick(&mut self) -> Option<&'static str> {
        self.count += 1;
        if self.count < self.interval {
            return None;
        }
        self.count = 0;

        let mut task = self.tasks.pop_front()?;
        match (task.op)() {
            Ok(()) => debug!(task = task.name, "poll"),
            Err(e) => warn!(task = task.name, error = %e, "poll failed"),
        }
        let name = task.name;
        // failed tasks stay in rotation
        self.tasks.push_back(task);
        Some(name)
    }

    /// Task names in the order they will next run
    pub fn order(&self) -> Vec<&'static str> {
        self.tasks.iter().map(PollTask::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> PollTask {
        let log = log.clone();
        PollTask::new(name, move || {
            log.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_round_robin_every_second_tick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = PollScheduler::new(2)
            .unwrap()
            .with_task(recording("A", &log))
            .with_task(recording("B", &log));

        let fired: Vec<_> = (0..12).map(|_| scheduler.on_tick()).collect();
        assert!(fired.iter().step_by(2).all(Option::is_none));
        assert_eq!(log.lock().as_slice(), ["A", "B", "A", "B", "A", "B"]);
    }

    #[test]
    fn test_each_task_once_per_cycle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = PollScheduler::new(3).unwrap();
        for name in ["A", "B", "C"] {
            scheduler.push(recording(name, &log));
        }
        for _ in 0..9 {
            scheduler.on_tick();
        }
        let mut seen = log.lock().clone();
        seen.sort();
        assert_eq!(seen, ["A", "B", "C"]);
        assert_eq!(scheduler.order(), ["A", "B", "C"]);
    }

    #[test]
    fn test_failing_task_stays_in_rotation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(0));
        let counter = failures.clone();
        let mut scheduler = PollScheduler::new(1)
            .unwrap()
            .with_task(PollTask::new("broken", move || {
                *counter.lock() += 1;
                Err(Error::Vendor("refused".into()))
            }))
            .with_task(recording("B", &log));

        let fired: Vec<_> = (0..4).filter_map(|_| scheduler.on_tick()).collect();
        assert_eq!(fired, ["broken", "B", "broken", "B"]);
        assert_eq!(*failures.lock(), 2);
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_empty_scheduler_and_zero_interval() {
        let mut scheduler = PollScheduler::new(1).unwrap();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.on_tick(), None);
        assert!(matches!(PollScheduler::new(0), Err(Error::Config(_))));
    }
}
