use crate::connection::{connect, ConnectionError};
use crate::executor::{instrumented, DbError, SqlExecutor};
use crate::pool::config::DatabaseConfig;
use may::sync::{Mutex, Semphore};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::ops::Deref;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Parked items plus a semaphore holding one permit per parked item.
///
/// Waiting happens on the `may` semaphore, so a coroutine waiting for an
/// item yields its worker thread instead of blocking it. Plain threads
/// block as usual.
struct IdleQueue<T> {
    items: Mutex<Vec<T>>,
    available: Semphore,
}

impl<T> IdleQueue<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            available: Semphore::new(items.len()),
            items: Mutex::new(items),
        }
    }

    /// Take an item, waiting up to `timeout`. `Ok(None)` on timeout.
    fn take(&self, timeout: Duration) -> Result<Option<T>, ConnectionError> {
        if !self.available.wait_timeout(timeout) {
            return Ok(None);
        }
        let item = self
            .items
            .lock()
            .map_err(|_| ConnectionError::Other("pool queue lock poisoned".to_string()))?
            .pop();
        match item {
            Some(item) => Ok(Some(item)),
            None => Err(ConnectionError::Other(
                "pool permit granted with no idle connection".to_string(),
            )),
        }
    }

    fn put(&self, item: T) -> Result<(), ConnectionError> {
        self.items
            .lock()
            .map_err(|_| ConnectionError::Other("pool queue lock poisoned".to_string()))?
            .push(item);
        self.available.post();
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }
}

/// Fixed-size pool of `may_postgres` clients
pub struct ConnectionPool {
    idle: IdleQueue<Client>,
    size: usize,
    timeout: Duration,
}

impl ConnectionPool {
    /// Open `max_connections` connections up front.
    ///
    /// Fails if any connection cannot be established.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        if config.max_connections == 0 {
            return Err(ConnectionError::Other(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let clients = (0..config.max_connections)
            .map(|_| connect(&config.url))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(feature = "metrics")]
        METRICS.set_idle_connections(config.max_connections);

        log::info!(
            "Connection pool ready with {} connection(s)",
            config.max_connections
        );

        Ok(Self {
            idle: IdleQueue::new(clients),
            size: config.max_connections,
            timeout: config.pool_timeout(),
        })
    }

    /// Check out a connection, waiting up to the configured timeout
    pub fn acquire(&self) -> Result<PooledClient<'_>, ConnectionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        let Some(client) = self.idle.take(self.timeout)? else {
            log::warn!(
                "No pooled connection free after {}s ({} in pool)",
                self.timeout.as_secs(),
                self.size
            );
            return Err(ConnectionError::PoolTimeout(self.timeout.as_secs()));
        };

        #[cfg(feature = "metrics")]
        {
            METRICS.record_pool_wait(start.elapsed());
            METRICS.set_idle_connections(self.idle.len());
        }
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(PooledClient {
            client: Some(client),
            pool: self,
        })
    }

    /// Number of connections owned by the pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections currently parked in the queue
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    fn release(&self, client: Client) {
        if let Err(e) = self.idle.put(client) {
            log::warn!("Dropping connection: {}", e);
        }
        #[cfg(feature = "metrics")]
        METRICS.set_idle_connections(self.idle.len());
    }
}

/// A checked-out connection, returned to the pool on drop
pub struct PooledClient<'a> {
    client: Option<Client>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledClient<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        // Only `Drop` takes the client out.
        self.client.as_ref().unwrap_or_else(|| unreachable!("pooled client used after release"))
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}

impl SqlExecutor for PooledClient<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        instrumented(query, || self.deref().execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        instrumented(query, || self.deref().query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        instrumented(query, || self.deref().query(query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_take_times_out_when_empty() {
        let queue = IdleQueue::new(vec![1_u32]);
        assert_eq!(queue.take(Duration::from_millis(10)).unwrap(), Some(1));
        assert_eq!(queue.take(Duration::from_millis(10)).unwrap(), None);
        queue.put(1).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_waiting_coroutines_yield_to_holders() {
        const WORKERS: usize = 32;
        let queue = Arc::new(IdleQueue::new(vec![1_u32, 2]));
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let done = Arc::clone(&done);
                may::go!(move || {
                    let item = queue
                        .take(Duration::from_secs(30))
                        .unwrap()
                        .expect("item within timeout");
                    // Hold the item across a yield point.
                    may::coroutine::sleep(Duration::from_millis(2));
                    queue.put(item).unwrap();
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(done.load(Ordering::SeqCst), WORKERS);
        assert_eq!(queue.len(), 2);
    }
}
