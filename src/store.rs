//! Connection handling and raw statement execution.
//!
//! A [`TempusStore`] carries the connection pool and the backend; it is the
//! context every table operation receives. A process-wide default store can
//! be installed with [`open`] and retrieved with [`global`] for callers that
//! do not want to thread the handle through their own code.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use log::debug;
use once_cell::sync::Lazy;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, ExecResult, QueryResult, Statement, TransactionTrait, Value,
};

use crate::config::{DatabaseConfig, TempusConfig};
use crate::dialect::{dialect_for, Dialect};
use crate::{TempusError, TempusResult};

#[derive(Clone, Debug)]
pub struct TempusStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
}

impl TempusStore {
    pub async fn connect(config: &TempusConfig, base_dir: &Path) -> TempusResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(TempusError::from)?;
        let backend = conn.get_database_backend();
        Ok(Self { conn, backend })
    }

    pub async fn connect_sqlite(path: &Path) -> TempusResult<Self> {
        let config = TempusConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    /// The underlying connection, for non-standard read access (joined
    /// selects etc.).
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        dialect_for(self.backend)
    }

    /// The literal this store accepts in place of a timestamp string.
    pub fn now_keyword(&self) -> &'static str {
        self.dialect().now_keyword()
    }

    pub async fn begin(&self) -> TempusResult<DatabaseTransaction> {
        let tx = self
            .conn
            .begin()
            .await
            .map_err(|err| TempusError::storage(format!("begin transaction failed: {err}")))?;
        debug!("begin transaction");
        Ok(tx)
    }

    pub async fn commit(&self, tx: DatabaseTransaction) -> TempusResult<()> {
        tx.commit()
            .await
            .map_err(|err| TempusError::storage(format!("commit transaction failed: {err}")))?;
        debug!("commit transaction");
        Ok(())
    }

    pub async fn rollback(&self, tx: DatabaseTransaction) -> TempusResult<()> {
        tx.rollback()
            .await
            .map_err(|err| TempusError::storage(format!("rollback transaction failed: {err}")))?;
        debug!("rollback transaction");
        Ok(())
    }
}

static DEFAULT_STORE: Lazy<RwLock<Option<TempusStore>>> = Lazy::new(|| RwLock::new(None));

/// Connects and installs the process-wide default store.
///
/// Fails when a default store is already installed.
pub async fn open(config: &TempusConfig, base_dir: &Path) -> TempusResult<TempusStore> {
    if DEFAULT_STORE
        .read()
        .expect("default store lock poisoned")
        .is_some()
    {
        return Err(TempusError::AlreadyOpen);
    }
    let store = TempusStore::connect(config, base_dir).await?;
    {
        let mut guard = DEFAULT_STORE.write().expect("default store lock poisoned");
        if guard.is_some() {
            return Err(TempusError::AlreadyOpen);
        }
        *guard = Some(store.clone());
    }
    debug!("open database");
    Ok(store)
}

/// Closes and removes the process-wide default store. Idempotent.
pub async fn close() -> TempusResult<()> {
    let taken = DEFAULT_STORE
        .write()
        .expect("default store lock poisoned")
        .take();
    if let Some(store) = taken {
        store.conn.close().await.map_err(TempusError::from)?;
        debug!("close database");
    }
    Ok(())
}

/// Returns the process-wide default store installed by [`open`].
pub fn global() -> TempusResult<TempusStore> {
    DEFAULT_STORE
        .read()
        .expect("default store lock poisoned")
        .clone()
        .ok_or(TempusError::NotOpen)
}

fn build_connection_url(config: &TempusConfig, base_dir: &Path) -> TempusResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } => Ok(url.clone()),
        DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

/// Replaces `%` in query text embedded in error messages; the SQL timestamp
/// format strings would otherwise be mangled by downstream formatting.
pub(crate) fn sanitize_query(sql: &str) -> String {
    sql.replace('%', "_")
}

async fn exec_on<C>(conn: &C, sql: &str, values: Vec<Value>) -> TempusResult<ExecResult>
where
    C: ConnectionTrait,
{
    debug!("sql: {sql}");
    conn.execute(Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        values,
    ))
    .await
    .map_err(|err| {
        TempusError::storage(format!(
            "error executing statement: {}: {err}",
            sanitize_query(sql)
        ))
    })
}

async fn query_all_on<C>(conn: &C, sql: &str, values: Vec<Value>) -> TempusResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
{
    debug!("sql: {sql}");
    conn.query_all(Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        values,
    ))
    .await
    .map_err(|err| {
        TempusError::storage(format!(
            "error executing query: {}: {err}",
            sanitize_query(sql)
        ))
    })
}

async fn query_one_on<C>(
    conn: &C,
    sql: &str,
    values: Vec<Value>,
) -> TempusResult<Option<QueryResult>>
where
    C: ConnectionTrait,
{
    debug!("sql: {sql}");
    conn.query_one(Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        values,
    ))
    .await
    .map_err(|err| {
        TempusError::storage(format!(
            "error executing query: {}: {err}",
            sanitize_query(sql)
        ))
    })
}

pub(crate) async fn exec(
    store: &TempusStore,
    tx: Option<&DatabaseTransaction>,
    sql: &str,
    values: Vec<Value>,
) -> TempusResult<ExecResult> {
    match tx {
        Some(tx) => exec_on(tx, sql, values).await,
        None => exec_on(&store.conn, sql, values).await,
    }
}

pub(crate) async fn exec_ddl(
    store: &TempusStore,
    tx: Option<&DatabaseTransaction>,
    sql: &str,
) -> TempusResult<()> {
    debug!("sql: {sql}");
    let outcome = match tx {
        Some(tx) => tx.execute_unprepared(sql).await,
        None => store.conn.execute_unprepared(sql).await,
    };
    outcome.map_err(|err| {
        TempusError::storage(format!("error executing ddl: {}: {err}", sanitize_query(sql)))
    })?;
    Ok(())
}

pub(crate) async fn query_all(
    store: &TempusStore,
    tx: Option<&DatabaseTransaction>,
    sql: &str,
    values: Vec<Value>,
) -> TempusResult<Vec<QueryResult>> {
    match tx {
        Some(tx) => query_all_on(tx, sql, values).await,
        None => query_all_on(&store.conn, sql, values).await,
    }
}

pub(crate) async fn query_one(
    store: &TempusStore,
    tx: Option<&DatabaseTransaction>,
    sql: &str,
    values: Vec<Value>,
) -> TempusResult<Option<QueryResult>> {
    match tx {
        Some(tx) => query_one_on(tx, sql, values).await,
        None => query_one_on(&store.conn, sql, values).await,
    }
}
