//! Cooperative tick-counted tasks.
//!
//! A task runs once per tick until it is marked inactive, either by returning
//! [`Flow::Stop`] from its own step or through [`TaskScheduler::cancel`]. The
//! scheduler notices inactivity on its next pass, calls the finalizer exactly
//! once, and drops the task.

use thiserror::Error;

use crate::registry::Handle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task has no source to group it under")]
    MissingSource,
}

/// What a task belongs to, for bulk cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSource {
    World,
    Player(Handle),
    Mob(Handle),
}

/// Result of one execute step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Behaviour of a task over some mutable context `C`.
pub trait TaskKind<C> {
    /// Runs one tick. `ticks` counts completed executions, starting at 0.
    fn execute(&mut self, ticks: u64, ctx: &mut C) -> Flow;

    /// Called once after the task goes inactive.
    fn finish(&mut self, ctx: &mut C);
}

#[derive(Debug)]
pub struct Task<K> {
    source: Option<TaskSource>,
    kind: K,
    ticks: u64,
    active: bool,
}

impl<K> Task<K> {
    pub fn new(source: TaskSource, kind: K) -> Self {
        Self {
            source: Some(source),
            kind,
            ticks: 0,
            active: true,
        }
    }

    /// A task nobody owns. The scheduler refuses these.
    pub fn unowned(kind: K) -> Self {
        Self {
            source: None,
            kind,
            ticks: 0,
            active: true,
        }
    }

    pub fn source(&self) -> Option<TaskSource> {
        self.source
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stop(&mut self) {
        self.active = false;
    }
}

#[derive(Debug)]
pub struct TaskScheduler<K> {
    tasks: Vec<Task<K>>,
}

impl<K> Default for TaskScheduler<K> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<K> TaskScheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: Task<K>) -> Result<(), SchedulerError> {
        if task.source.is_none() {
            return Err(SchedulerError::MissingSource);
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Marks every task owned by `source` inactive.
    pub fn cancel(&mut self, source: TaskSource) -> usize {
        let mut cancelled = 0;
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.active && t.source == Some(source))
        {
            task.stop();
            cancelled += 1;
        }
        cancelled
    }

    /// One scheduler pass.
    pub fn run<C>(&mut self, ctx: &mut C)
    where
        K: TaskKind<C>,
    {
        let mut i = 0;
        while i < self.tasks.len() {
            let task = &mut self.tasks[i];
            if task.active {
                if task.kind.execute(task.ticks, ctx) == Flow::Stop {
                    task.active = false;
                }
                task.ticks += 1;
                i += 1;
            } else {
                let mut task = self.tasks.remove(i);
                task.kind.finish(ctx);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task<K>> {
        self.tasks.iter()
    }
}
