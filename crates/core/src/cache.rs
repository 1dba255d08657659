//! Memoised asynchronous loads.

use std::{future::Future, sync::Arc};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type SharedLoad<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

enum State<T, E> {
    Empty,
    Loading { generation: u64, future: SharedLoad<T, E> },
    Ready(T),
    Failed(E),
}

/// Observable state of a [`LoadCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing loaded yet, or invalidated.
    Empty,
    /// A load is running; callers join it.
    Loading,
    /// A value is available.
    Ready,
    /// The last load failed; the next call retries.
    Failed,
}

struct Inner<T, E> {
    state: State<T, E>,
    generation: u64,
}

/// Single-flight cache around one asynchronous load.
///
/// Concurrent callers share one in-flight future. A failed load is remembered
/// only as a status: the next caller starts a fresh attempt. `invalidate` drops
/// the value and detaches any running load so its result is not stored.
pub struct LoadCache<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for LoadCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for LoadCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> LoadCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Empty,
                generation: 0,
            })),
        }
    }

    /// Return the cached value, join a running load, or start one with `load`.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (generation, future) = {
            let mut inner = self.inner.lock();
            let pending = match &inner.state {
                State::Ready(value) => return Ok(value.clone()),
                State::Loading { generation, future } => Some((*generation, future.clone())),
                State::Empty | State::Failed(_) => None,
            };

            match pending {
                Some(pending) => pending,
                None => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let future = load().boxed().shared();
                    inner.state = State::Loading {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut inner = self.inner.lock();
        let current = matches!(
            &inner.state,
            State::Loading { generation: running, .. } if *running == generation
        );
        if current {
            inner.state = match &result {
                Ok(value) => State::Ready(value.clone()),
                Err(err) => State::Failed(err.clone()),
            };
        }
        result
    }

    /// Forget the cached value or failure and detach any running load.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = State::Empty;
    }

    /// Cached value, if one is ready.
    pub fn peek(&self) -> Option<T> {
        match &self.inner.lock().state {
            State::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Last recorded failure, if the most recent load failed.
    pub fn last_error(&self) -> Option<E> {
        match &self.inner.lock().state {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Current status.
    pub fn status(&self) -> CacheStatus {
        match &self.inner.lock().state {
            State::Empty => CacheStatus::Empty,
            State::Loading { .. } => CacheStatus::Loading,
            State::Ready(_) => CacheStatus::Ready,
            State::Failed(_) => CacheStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let cache: LoadCache<u32, String> = LoadCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_load(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        Ok(7)
                    })
                    .await
            })
        };

        while cache.status() != CacheStatus::Loading {
            tokio::task::yield_now().await;
        }

        let second = {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_load(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(99)
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        let _ = release_tx.send(());

        assert_eq!(first.await.ok(), Some(Ok(7)));
        assert_eq!(second.await.ok(), Some(Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek(), Some(7));
    }

    #[tokio::test]
    async fn failure_allows_retry() {
        let cache: LoadCache<u32, String> = LoadCache::new();

        let failed = cache
            .get_or_load(|| async { Err("offline".to_string()) })
            .await;
        assert_eq!(failed, Err("offline".to_string()));
        assert_eq!(cache.status(), CacheStatus::Failed);
        assert_eq!(cache.last_error().as_deref(), Some("offline"));

        let loaded = cache.get_or_load(|| async { Ok(3) }).await;
        assert_eq!(loaded, Ok(3));
        assert_eq!(cache.status(), CacheStatus::Ready);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache: LoadCache<u32, String> = LoadCache::new();
        assert_eq!(cache.get_or_load(|| async { Ok(1) }).await, Ok(1));
        assert_eq!(cache.get_or_load(|| async { Ok(2) }).await, Ok(1));

        cache.invalidate();
        assert_eq!(cache.status(), CacheStatus::Empty);
        assert_eq!(cache.get_or_load(|| async { Ok(2) }).await, Ok(2));
    }
}
