//! Bounded, concurrently-run callback list (§4.1 "shutdown hooks", §7.5): a
//! `join_all` fan-out over boxed callbacks with per-callback error
//! aggregation, given an aggregate timeout.

use crate::component::BoxFuture;
use crate::error::{CoreError, ShutdownError};
use futures::future::join_all;
use std::sync::RwLock;
use std::time::Duration;

/// Aggregate timeout across all callbacks in one `run()` call (§7.5): 10s.
pub const DEFAULT_AGGREGATE_TIMEOUT: Duration = Duration::from_secs(10);

pub trait Callback: Send + Sync {
    fn call(&self) -> BoxFuture<'_, Result<(), CoreError>>;
}

impl<F> Callback for F
where
    F: Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync,
{
    fn call(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        (self)()
    }
}

/// A list of independent callbacks (reload hooks, shutdown hooks) that all
/// run concurrently, bounded by one aggregate timeout (§7.5).
#[derive(Default)]
pub struct CallbackList {
    callbacks: RwLock<Vec<Box<dyn Callback>>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, callback: Box<dyn Callback>) {
        self.callbacks.write().unwrap().push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every callback concurrently. Errors from individual callbacks are
    /// logged and aggregated rather than aborting the others (§7.5); if the
    /// whole batch does not finish within `timeout`, returns a
    /// [`ShutdownError::Timeout`] and abandons the stragglers.
    pub async fn run(&self, timeout: Duration) -> Result<(), CoreError> {
        let futures: Vec<_> = {
            let callbacks = self.callbacks.read().unwrap();
            callbacks.iter().map(|cb| cb.call()).collect()
        };

        let results = match tokio::time::timeout(timeout, join_all(futures)).await {
            Ok(results) => results,
            Err(_) => return Err(CoreError::Shutdown(ShutdownError::Timeout(timeout))),
        };

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                log::error!("callback failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);
    impl Callback for Counting {
        fn call(&self) -> BoxFuture<'_, Result<(), CoreError>> {
            let counter = self.0.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct Failing;
    impl Callback for Failing {
        fn call(&self) -> BoxFuture<'_, Result<(), CoreError>> {
            Box::pin(async { Err(CoreError::Invariant("boom".into())) })
        }
    }

    struct Hanging;
    impl Callback for Hanging {
        fn call(&self) -> BoxFuture<'_, Result<(), CoreError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn all_callbacks_run_concurrently() {
        let counter = Arc::new(AtomicUsize::new(0));
        let list = CallbackList::new();
        list.push(Box::new(Counting(counter.clone())));
        list.push(Box::new(Counting(counter.clone())));
        list.push(Box::new(Counting(counter.clone())));

        list.run(DEFAULT_AGGREGATE_TIMEOUT).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let list = CallbackList::new();
        list.push(Box::new(Counting(counter.clone())));
        list.push(Box::new(Failing));

        let result = list.run(DEFAULT_AGGREGATE_TIMEOUT).await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aggregate_timeout_is_enforced() {
        let list = CallbackList::new();
        list.push(Box::new(Hanging));

        let result = list.run(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CoreError::Shutdown(ShutdownError::Timeout(_)))));
    }
}
