use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::backend::{BackendConnection, BackendError};
use crate::config::{PoolRecord, PoolsConfig};

// -----------------------------------------------------------------------------
// ----- GatewayPools ----------------------------------------------------------

/// Every configured server pool, keyed by dbkey. Shared by all sessions.
#[derive(Debug)]
pub struct GatewayPools {
    pools: HashMap<String, Arc<ServerPool>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub dbkey: String,
    pub idle: usize,
    pub available: usize,
    pub max: u32,
}

impl GatewayPools {
    pub fn new(config: &PoolsConfig) -> Self {
        let pools = config
            .records()
            .map(|record| (record.dbkey.clone(), Arc::new(ServerPool::new(record.clone()))))
            .collect();

        Self { pools }
    }

    pub fn get(&self, dbkey: &str) -> Option<Arc<ServerPool>> {
        self.pools.get(dbkey).cloned()
    }

    pub fn contains(&self, dbkey: &str) -> bool {
        self.pools.contains_key(dbkey)
    }

    pub fn snapshot(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools.values().map(|pool| pool.stats()).collect();
        stats.sort_by(|a, b| a.dbkey.cmp(&b.dbkey));
        stats
    }

    pub async fn warm_all(&self) {
        for pool in self.pools.values() {
            pool.warm_min().await;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ServerPool ------------------------------------------------------------

#[derive(Debug)]
pub struct ServerPool {
    record: PoolRecord,
    idle: Mutex<VecDeque<IdleConnection>>,
    max: Arc<Semaphore>,
}

impl ServerPool {
    fn new(record: PoolRecord) -> Self {
        let max = record.max_connections.max(1) as usize;
        Self {
            record,
            idle: Mutex::new(VecDeque::new()),
            max: Arc::new(Semaphore::new(max)),
        }
    }

    pub fn dbkey(&self) -> &str {
        &self.record.dbkey
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            dbkey: self.record.dbkey.clone(),
            idle: self.idle.lock().len(),
            available: self.max.available_permits(),
            max: self.record.max_connections,
        }
    }

    pub async fn warm_min(&self) {
        let current = self.idle.lock().len() as u32;
        if current >= self.record.min_connections {
            return;
        }

        let target = self.record.min_connections - current;
        info!(
            "warming pool {}: opening {target} backend connections",
            self.record.dbkey
        );

        for _ in 0..target {
            let Ok(permit) = self.max.clone().try_acquire_owned() else {
                break;
            };
            match self.open().await {
                Ok(conn) => self.idle.lock().push_back(IdleConnection { conn, permit }),
                Err(err) => warn!("failed to warm pool {}: {err}", self.record.dbkey),
            }
        }
    }

    /// An idle connection if there is one, otherwise a new one once the pool
    /// has room.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, BackendError> {
        let idle = self.idle.lock().pop_front();
        if let Some(idle) = idle {
            return Ok(PooledConnection::new(self.clone(), idle.conn, idle.permit));
        }

        let permit = self
            .max
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BackendError::Protocol("pool closed".into()))?;

        let conn = self.open().await?;
        Ok(PooledConnection::new(self.clone(), conn, permit))
    }

    async fn open(&self) -> Result<BackendConnection, BackendError> {
        let mut conn = BackendConnection::connect(&self.record.host, self.record.port).await?;
        conn.startup(
            &self.record.user,
            &self.record.dbname,
            self.record.password_exposed(),
        )
        .await?;
        debug!("opened backend connection for pool {}", self.record.dbkey);
        Ok(conn)
    }

    fn push_idle(&self, conn: BackendConnection, permit: OwnedSemaphorePermit) {
        self.idle.lock().push_back(IdleConnection { conn, permit });
    }

    async fn reset_and_push_idle(&self, mut conn: BackendConnection, permit: OwnedSemaphorePermit) {
        if let Err(err) = conn.reset_session().await {
            warn!(
                "dropping backend connection after reset failure on pool {}: {err}",
                self.record.dbkey
            );
            return;
        }
        self.push_idle(conn, permit);
    }
}

// -----------------------------------------------------------------------------
// ----- PooledConnection ------------------------------------------------------

/// A leased backend connection. Dropping it hands the connection back to its
/// pool, unless it is mid-transaction or has unread bytes.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<ServerPool>,
    conn: Option<BackendConnection>,
    permit: Option<OwnedSemaphorePermit>,
    reset_on_release: bool,
}

impl PooledConnection {
    fn new(pool: Arc<ServerPool>, conn: BackendConnection, permit: OwnedSemaphorePermit) -> Self {
        Self {
            pool,
            conn: Some(conn),
            permit: Some(permit),
            reset_on_release: false,
        }
    }

    pub fn dbkey(&self) -> &str {
        self.pool.dbkey()
    }

    pub fn connection(&mut self) -> &mut BackendConnection {
        self.conn
            .as_mut()
            .expect("pooled connection missing backend connection")
    }

    pub fn in_transaction(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| conn.status().in_transaction())
    }

    /// Run `DISCARD ALL` before the connection is reused.
    pub fn reset_on_release(&mut self, reset: bool) {
        self.reset_on_release = reset;
    }

    /// Close the connection instead of returning it; frees the pool slot.
    pub fn discard(mut self) {
        self.conn = None;
        self.permit = None;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Some(permit) = self.permit.take() else {
            return;
        };

        if conn.status().in_transaction() || !conn.buffer().is_empty() {
            debug!("closing dirty backend connection for pool {}", self.pool.dbkey());
            return;
        }

        if !self.reset_on_release {
            self.pool.push_idle(conn, permit);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let pool = self.pool.clone();
        runtime.spawn(async move {
            pool.reset_and_push_idle(conn, permit).await;
        });
    }
}

#[derive(Debug)]
struct IdleConnection {
    conn: BackendConnection,
    permit: OwnedSemaphorePermit,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
