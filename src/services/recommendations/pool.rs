use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Bounded pool for one stage's units of work.
///
/// At most `size` units run at once. Once `stop` fires, queued units are never
/// started and running ones are dropped at their next await point. A unit
/// returning a fatal error fires `stop` itself.
pub struct WorkerPool {
    size: usize,
    stop: CancellationToken,
}

/// What happened to the units submitted to [`WorkerPool::run_all`]
pub struct PoolReport<T> {
    /// Units that ran to completion, successfully or not
    pub finished: Vec<AppResult<T>>,
    /// Units abandoned because the pool was stopped
    pub abandoned: usize,
}

impl WorkerPool {
    pub fn new(size: usize, stop: CancellationToken) -> Self {
        Self {
            size: size.max(1),
            stop,
        }
    }

    pub async fn run_all<T, Fut>(&self, units: Vec<Fut>) -> PoolReport<T>
    where
        T: Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.size));
        let mut tasks = JoinSet::new();

        for unit in units {
            let semaphore = semaphore.clone();
            let stop = self.stop.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return None,
                    permit = semaphore.acquire_owned() => permit.ok()?,
                };

                tokio::select! {
                    biased;
                    _ = stop.cancelled() => None,
                    result = unit => Some(result),
                }
            });
        }

        let mut finished = Vec::new();
        let mut abandoned = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => {
                    if let Err(e) = &result {
                        if e.is_fatal() && !self.stop.is_cancelled() {
                            tracing::error!(error = %e, "Fatal error, stopping outstanding work");
                            self.stop.cancel();
                        }
                    }
                    finished.push(result);
                }
                Ok(None) => abandoned += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Worker task failed");
                    finished.push(Err(AppError::Internal(e.to_string())));
                }
            }
        }

        PoolReport {
            finished,
            abandoned,
        }
    }
}
