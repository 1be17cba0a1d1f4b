//! Parallel backends for running independent search drivers.
//!
//! A backend takes a batch of independent closures, runs them to completion
//! and hands back their results in submission order. A panicking task
//! propagates the panic to the caller once the batch has been joined.

use std::thread;

use crossbeam_channel::unbounded;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One unit of work submitted to an executor.
pub type Task<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;

pub trait TaskExecutor {
    /// Run every task and return the results in the order they were given.
    fn execute<'a, T: Send + 'a>(&self, tasks: Vec<Task<'a, T>>) -> Vec<T>;

    fn name(&self) -> &'static str;
}

/// Runs tasks one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl TaskExecutor for SequentialExecutor {
    fn execute<'a, T: Send + 'a>(&self, tasks: Vec<Task<'a, T>>) -> Vec<T> {
        tasks.into_iter().map(|task| task()).collect()
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Scoped OS threads pulling from a shared work queue.
#[derive(Debug, Clone, Copy)]
pub struct ThreadExecutor {
    pub max_workers: usize,
}

impl ThreadExecutor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(workers)
    }
}

impl TaskExecutor for ThreadExecutor {
    fn execute<'a, T: Send + 'a>(&self, tasks: Vec<Task<'a, T>>) -> Vec<T> {
        let n = tasks.len();
        if n == 0 {
            return Vec::new();
        }

        let (job_tx, job_rx) = unbounded::<(usize, Task<'a, T>)>();
        let (result_tx, result_rx) = unbounded::<(usize, T)>();
        for job in tasks.into_iter().enumerate() {
            // Receiver is alive, send cannot fail.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let workers = self.max_workers.max(1).min(n);
        debug!(workers, tasks = n, "starting thread executor");

        let slots: Vec<Option<T>> = thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (index, task) in job_rx.iter() {
                        if result_tx.send((index, task())).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut slots: Vec<Option<T>> = (0..n).map(|_| None).collect();
            for (index, value) in result_rx.iter() {
                slots[index] = Some(value);
            }
            slots
        });

        // Every slot is filled unless a worker panicked, in which case the
        // scope above has already re-raised the panic.
        slots.into_iter().flatten().collect()
    }

    fn name(&self) -> &'static str {
        "threads"
    }
}

/// Runs tasks on the global rayon pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor;

impl TaskExecutor for RayonExecutor {
    fn execute<'a, T: Send + 'a>(&self, tasks: Vec<Task<'a, T>>) -> Vec<T> {
        tasks.into_par_iter().map(|task| task()).collect()
    }

    fn name(&self) -> &'static str {
        "rayon"
    }
}

/// Backend selection as it appears in a search configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Sequential,
    Threads { max_workers: usize },
    Rayon,
}

impl Default for ExecutorKind {
    fn default() -> Self {
        Self::Rayon
    }
}

impl ExecutorKind {
    pub fn execute<'a, T: Send + 'a>(&self, tasks: Vec<Task<'a, T>>) -> Vec<T> {
        match *self {
            Self::Sequential => SequentialExecutor.execute(tasks),
            Self::Threads { max_workers } => ThreadExecutor::new(max_workers).execute(tasks),
            Self::Rayon => RayonExecutor.execute(tasks),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sequential => SequentialExecutor.name(),
            Self::Threads { .. } => "threads",
            Self::Rayon => RayonExecutor.name(),
        }
    }
}
