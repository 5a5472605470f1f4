//! Worker pool
//!
//! Launches N workers with ids `0..N`, each on its own OS thread, and joins
//! them all. Every worker starts from a copy of the shared defaults; the
//! n-th worker receives the n-th item of the override sequence, if any.
//!
//! # Overrides
//!
//! [`Overrides`] is consumed once, lazily, one item per spawned worker:
//!
//! | Variant | Behaviour |
//! |---------|-----------|
//! | `None` | every worker runs with the defaults |
//! | `Finite` | workers past the end run with the defaults |
//! | `Cyclic` | restarts from the first item when exhausted |
//! | `Lazy` | any iterator, possibly infinite, never restarted |

use rowbench_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Applies one override item to a parameter set
pub trait ApplyOverride<O> {
    /// Merge `overrides` into `self`
    fn apply_override(&mut self, overrides: O);
}

/// Per-worker parameter overrides
pub enum Overrides<O> {
    /// No overrides
    None,
    /// One item per worker, defaults after the end
    Finite(Vec<O>),
    /// Items repeated in order
    Cyclic(Vec<O>),
    /// Arbitrary lazy sequence
    Lazy(Box<dyn Iterator<Item = O> + Send>),
}

impl<O: Clone + Send + 'static> Overrides<O> {
    /// Sequence consumed by the harness
    pub fn into_sequence(self) -> Box<dyn Iterator<Item = O> + Send> {
        match self {
            Overrides::None => Box::new(std::iter::empty()),
            Overrides::Finite(items) => Box::new(items.into_iter()),
            Overrides::Cyclic(items) => Box::new(items.into_iter().cycle()),
            Overrides::Lazy(iter) => iter,
        }
    }
}

impl<O> Default for Overrides<O> {
    fn default() -> Self {
        Overrides::None
    }
}

impl<O> fmt::Debug for Overrides<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overrides::None => f.write_str("None"),
            Overrides::Finite(items) => write!(f, "Finite({} items)", items.len()),
            Overrides::Cyclic(items) => write!(f, "Cyclic({} items)", items.len()),
            Overrides::Lazy(_) => f.write_str("Lazy"),
        }
    }
}

/// Runs a worker function on N threads
#[derive(Debug, Clone)]
pub struct Harness {
    name: String,
}

impl Harness {
    /// Harness whose threads are named `{name}-{id}`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Parameters for each of `workers` workers
    pub fn plan<P, O>(workers: usize, defaults: &P, overrides: Overrides<O>) -> Vec<P>
    where
        P: Clone + ApplyOverride<O>,
        O: Clone + Send + 'static,
    {
        let mut sequence = overrides.into_sequence();
        (0..workers)
            .map(|_| {
                let mut params = defaults.clone();
                if let Some(item) = sequence.next() {
                    params.apply_override(item);
                }
                params
            })
            .collect()
    }

    /// Run `worker(id, params)` on `workers` threads and wait for all of them
    ///
    /// Results are returned in worker id order. A panicking worker does not
    /// stop the others; it is reported as `WorkerPanicked` once every thread
    /// has been joined.
    pub fn run<P, O, R, F>(
        &self,
        workers: usize,
        defaults: P,
        overrides: Overrides<O>,
        worker: F,
    ) -> Result<Vec<R>>
    where
        P: Clone + ApplyOverride<O> + Send + 'static,
        O: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(usize, P) -> R + Send + Sync + 'static,
    {
        let worker = Arc::new(worker);
        let plan = Self::plan(workers, &defaults, overrides);

        let mut handles: Vec<JoinHandle<R>> = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for (id, params) in plan.into_iter().enumerate() {
            let worker = Arc::clone(&worker);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.name, id))
                .spawn(move || worker(id, params));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        tracing::debug!(harness = %self.name, workers = handles.len(), "workers started");

        let mut results = Vec::with_capacity(handles.len());
        let mut panicked = None;
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(_) => {
                    tracing::error!(harness = %self.name, worker = id, "worker panicked");
                    panicked.get_or_insert(id);
                }
            }
        }

        if let Some(e) = spawn_error {
            return Err(Error::Io(e));
        }
        if let Some(worker) = panicked {
            return Err(Error::WorkerPanicked { worker });
        }
        Ok(results)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new("worker")
    }
}
