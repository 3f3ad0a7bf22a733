use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::Result;

/// The handle to where the numeric work of a run executes.
///
/// Every forward, backward and update pass of the driver runs inside this context's thread pool,
/// so two runs in the same process never share workers.
#[derive(Debug)]
pub struct ExecutionContext {
    pool: ThreadPool,
}

impl ExecutionContext {
    /// Creates a new `ExecutionContext`.
    ///
    /// # Arguments
    /// * `threads` - The amount of worker threads, one per core when `None`.
    ///
    /// # Returns
    /// A new `ExecutionContext` or an error if the pool couldn't be built.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(|i| format!("trainer-{i}"))
            .build()?;

        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `op` inside the context's thread pool, blocking until it returns.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
