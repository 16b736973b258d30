//! Bounded connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cistern_core::{CisternError, Connection, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::source::ConnectionSource;
use crate::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation checks that the connection is not closed.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// A connection plus the identity the pool tracks it by
///
/// Minted entries carry their pool's identity stamp; checkin refuses
/// entries without it.
pub struct PoolEntry {
    id: u64,
    token: Arc<()>,
    conn: Arc<dyn Connection>,
}

impl PoolEntry {
    /// Create an entry with the given id and connection
    ///
    /// Entries created this way belong to the source that creates
    /// them; a `Pool` only takes back entries it minted itself.
    pub fn new(id: u64, conn: Arc<dyn Connection>) -> Self {
        Self {
            id,
            token: Arc::new(()),
            conn,
        }
    }

    /// Get the entry id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }
}

struct PoolInner {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory, used at open and to replace dead connections
    factory: Arc<dyn ConnectionFactory>,
    /// Available idle entries, checked out oldest-first
    idle: Mutex<VecDeque<PoolEntry>>,
    /// Semaphore bounding concurrent checkouts to the pool size
    semaphore: Arc<Semaphore>,
    /// Identity stamped into every entry this pool mints
    token: Arc<()>,
    /// Next entry id
    next_id: AtomicU64,
    /// Set once `close_all` runs; checkins drop instead of returning
    closed: AtomicBool,
    /// Number of entries currently checked out
    in_use: AtomicUsize,
    /// Number of checkouts waiting on the semaphore
    waiting: AtomicUsize,
}

impl PoolInner {
    async fn mint_entry(&self) -> Result<PoolEntry> {
        let conn = self.factory.create().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PoolEntry {
            id,
            token: self.token.clone(),
            conn,
        })
    }

    /// Pop idle entries until one passes validation
    ///
    /// Dead entries are closed and dropped.
    async fn take_idle(&self) -> Option<PoolEntry> {
        loop {
            let entry = { self.idle.lock().pop_front() };

            match entry {
                Some(entry) => {
                    if !self.factory.validate(entry.connection().as_ref()).await {
                        tracing::debug!(entry_id = entry.id(), "dropping dead idle connection");
                        let _ = entry.connection().close().await;
                        continue;
                    }
                    return Some(entry);
                }
                None => return None,
            }
        }
    }

    fn checkin_entry(&self, entry: PoolEntry) {
        // Strict checkin: only entries stamped by this pool may come
        // back. Ids are sequential per pool, so an id match alone
        // proves nothing.
        if !Arc::ptr_eq(&entry.token, &self.token) {
            tracing::warn!(
                entry_id = entry.id(),
                "discarding connection not minted by this pool"
            );
            return;
        }

        self.in_use.fetch_sub(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(entry_id = entry.id(), "pool closed, dropping returned connection");
            return;
        }

        if entry.connection().is_closed() {
            tracing::debug!(entry_id = entry.id(), "dropping dead connection on checkin");
            return;
        }

        self.idle.lock().push_back(entry);
    }
}

/// A bounded pool of database connections
///
/// The pool opens its full complement of connections eagerly and hands
/// them out on demand. Checked-out connections are returned when the
/// `PooledConn` guard is dropped, from any thread. Cloning the pool
/// yields another handle to the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Open a pool, eagerly creating `config.size()` connections
    ///
    /// If any connection fails to open, the connections opened so far
    /// are closed and the error is returned.
    pub async fn open<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        let size = config.size();
        let inner = Arc::new(PoolInner {
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(VecDeque::with_capacity(size)),
            semaphore: Arc::new(Semaphore::new(size)),
            token: Arc::new(()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            in_use: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
        });
        let pool = Pool { inner };

        for opened in 0..size {
            match pool.inner.mint_entry().await {
                Ok(entry) => pool.inner.idle.lock().push_back(entry),
                Err(err) => {
                    tracing::warn!(opened, size, "pool fill failed, closing opened connections");
                    if let Err(close_err) = pool.close_all().await {
                        tracing::warn!(error = %close_err, "error closing partially filled pool");
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!(size, "connection pool opened");
        Ok(pool)
    }

    /// Check a connection out of the pool
    ///
    /// Waits up to the configured checkout timeout for a connection to
    /// become available. Idle connections are validated before being
    /// handed out; dead ones are replaced through the factory.
    ///
    /// Returns `PoolTimeout` if the timeout elapses.
    pub async fn checkout(&self) -> Result<PooledConn> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CisternError::InvalidState("pool is closed".into()));
        }

        self.inner.waiting.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.inner.config.checkout_timeout(), async {
            let permit = self
                .inner
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| CisternError::InvalidState("pool is closed".into()))?;

            // close_all may have raced the permit wait
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(CisternError::InvalidState("pool is closed".into()));
            }

            let entry = match self.inner.take_idle().await {
                Some(entry) => entry,
                None => {
                    // close_all may have drained the queue while we
                    // were validating; never mint on a closed pool
                    if self.inner.closed.load(Ordering::SeqCst) {
                        return Err(CisternError::InvalidState("pool is closed".into()));
                    }
                    self.inner.mint_entry().await?
                }
            };

            self.inner.in_use.fetch_add(1, Ordering::SeqCst);

            let source: Arc<dyn ConnectionSource> = Arc::new(self.clone());
            Ok(PooledConn::with_permit(entry, source, permit))
        })
        .await;

        self.inner.waiting.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(conn) => conn,
            Err(_) => Err(CisternError::PoolTimeout(
                self.inner.config.checkout_timeout(),
            )),
        }
    }

    /// Close every connection in the pool
    ///
    /// Idempotent. Closes all idle connections even if some fail,
    /// returning the first failure. Connections still checked out are
    /// dropped when their guards are returned.
    pub async fn close_all(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let entries: Vec<PoolEntry> = {
            let mut idle = self.inner.idle.lock();
            idle.drain(..).collect()
        };

        let count = entries.len();
        let mut first_failure = None;
        for entry in entries {
            if let Err(err) = entry.connection().close().await {
                tracing::warn!(entry_id = entry.id(), error = %err, "error closing pooled connection");
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }

        tracing::info!(closed = count, "connection pool closed");

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().len();
        let in_use = self.inner.in_use.load(Ordering::SeqCst);
        let waiting = self.inner.waiting.load(Ordering::SeqCst);
        PoolStats::new(self.inner.config.size(), idle, in_use, waiting)
    }

    /// Get the pool size
    pub fn size(&self) -> usize {
        self.inner.config.size()
    }

    /// Get the number of idle connections
    pub fn available(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Check whether `close_all` has run
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionSource for Pool {
    async fn checkout(&self) -> Result<PooledConn> {
        Pool::checkout(self).await
    }

    fn checkin(&self, entry: PoolEntry) {
        self.inner.checkin_entry(entry);
    }

    fn size(&self) -> usize {
        Pool::size(self)
    }

    fn checkout_timeout(&self) -> Duration {
        self.inner.config.checkout_timeout()
    }

    async fn close_all(&self) -> Result<()> {
        Pool::close_all(self).await
    }
}

/// A connection checked out of a `ConnectionSource`
///
/// When dropped, the entry is returned to its source. The guard is
/// `Send`, so it may be dropped on a different thread than the one
/// that checked it out.
pub struct PooledConn {
    entry: Option<PoolEntry>,
    source: Arc<dyn ConnectionSource>,
    // Released after the drop body checks the entry in, so a woken
    // waiter finds it idle
    _permit: Option<OwnedSemaphorePermit>,
}

impl PooledConn {
    /// Create a guard that returns `entry` to `source` on drop
    pub fn new(entry: PoolEntry, source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            entry: Some(entry),
            source,
            _permit: None,
        }
    }

    pub(crate) fn with_permit(
        entry: PoolEntry,
        source: Arc<dyn ConnectionSource>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            entry: Some(entry),
            source,
            _permit: Some(permit),
        }
    }

    /// Get the underlying connection as an Arc
    pub fn connection(&self) -> &Arc<dyn Connection> {
        self.entry.as_ref().expect("entry taken").connection()
    }

    /// Get the id of the entry held by this guard
    pub fn entry_id(&self) -> u64 {
        self.entry.as_ref().expect("entry taken").id()
    }
}

impl Deref for PooledConn {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection().as_ref()
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.source.checkin(entry);
        }
    }
}
