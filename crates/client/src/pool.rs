use crate::TransportError;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type Factory<C> = Box<dyn Fn() -> Result<C, TransportError> + Send + Sync>;

struct PoolInner<C> {
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<C>>,
    factory: Factory<C>,
    size: usize,
}

/// Bounded pool of connections.
///
/// At most `size` connections are checked out at once; further checkouts
/// wait for a permit. Connections are created lazily and reused.
pub struct ConnectionPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + 'static> ConnectionPool<C> {
    pub fn new(
        size: usize,
        factory: impl Fn() -> Result<C, TransportError> + Send + Sync + 'static,
    ) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::Connect("pool size must be positive".into()));
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(Vec::with_capacity(size)),
                factory: Box::new(factory),
                size,
            }),
        })
    }

    /// Wait for a free slot and hand out a connection. The returned guard
    /// puts the connection back when dropped.
    pub async fn checkout(&self) -> Result<PooledConnection<C>, TransportError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Connect("connection pool closed".into()))?;
        let reused = self.inner.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => (self.inner.factory)()?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Slots not currently checked out.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

/// Checked-out connection. Returns to the pool on drop, including when the
/// call using it failed.
pub struct PooledConnection<C> {
    conn: Option<C>,
    pool: Arc<PoolInner<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C> PooledConnection<C> {
    /// Drop the connection instead of returning it, e.g. after it broke.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `discard` and `drop` take the connection, and both consume
        // the guard.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_pool(size: usize) -> (ConnectionPool<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = ConnectionPool::new(size, move || Ok(counter.fetch_add(1, Ordering::SeqCst)))
            .unwrap();
        (pool, created)
    }

    #[tokio::test]
    async fn connections_are_reused() {
        let (pool, created) = counting_pool(2);
        {
            let conn = pool.checkout().await.unwrap();
            assert_eq!(*conn, 0);
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.idle(), 1);

        let conn = pool.checkout().await.unwrap();
        assert_eq!(*conn, 0);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_call_returns_connection() {
        let (pool, _) = counting_pool(1);
        let result: Result<(), TransportError> = async {
            let _conn = pool.checkout().await?;
            Err(TransportError::Timeout)
        }
        .await;
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn checkout_waits_when_exhausted() {
        let (pool, _) = counting_pool(1);
        let held = pool.checkout().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.checkout()).await;
        assert!(blocked.is_err());

        drop(held);
        let conn = tokio::time::timeout(Duration::from_millis(50), pool.checkout()).await;
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn discarded_connection_is_replaced() {
        let (pool, created) = counting_pool(1);
        pool.checkout().await.unwrap().discard();
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.available(), 1);

        let conn = pool.checkout().await.unwrap();
        assert_eq!(*conn, 1);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_sized_pool_is_refused() {
        assert!(ConnectionPool::new(0, || Ok(())).is_err());
    }
}
