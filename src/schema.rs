//! Idempotent creation of the version table, the identity table and their
//! indexes.

use sea_orm::DatabaseTransaction;

use crate::error::OpContext;
use crate::store::{self, TempusStore};
use crate::table::Table;
use crate::{TempusError, TempusResult};

impl<P> Table<P> {
    /// Creates the version table, the identity table and both indexes.
    ///
    /// Succeeds without touching the schema when both tables already exist;
    /// fails with a consistency error when exactly one of them does.
    ///
    /// PostgreSQL does not accept this DDL inside a caller-owned
    /// transaction; pass `None` there.
    pub async fn create(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<()> {
        self.create_inner(store, tx).await.op("Table::create")
    }

    async fn create_inner(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<()> {
        self.require_name()?;
        if self.exists(store, tx).await? {
            return Ok(());
        }
        self.create_table(store, tx).await?;
        self.create_id_table(store, tx).await?;
        self.create_index_id_begin(store, tx).await?;
        self.create_index_id_until(store, tx).await?;
        Ok(())
    }

    async fn exists(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<bool> {
        let version = self.probe(store, tx, &self.name).await;
        let identity = self.probe(store, tx, &self.id_table()).await;
        match (version, identity) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            (true, false) => Err(TempusError::CompanionMissing {
                present: self.name.clone(),
                missing: self.id_table(),
            }),
            (false, true) => Err(TempusError::CompanionMissing {
                present: self.id_table(),
                missing: self.name.clone(),
            }),
        }
    }

    async fn probe(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
        table: &str,
    ) -> bool {
        let sql = format!("select count(*) from {table};");
        store::query_one(store, tx, &sql, Vec::new()).await.is_ok()
    }

    async fn create_table(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<()> {
        let mut defs: Vec<&str> = store.dialect().std_defs().to_vec();
        defs.extend(self.defs.iter().map(String::as_str));
        let sql = format!("create table {}({});", self.name, defs.join(","));
        store::exec_ddl(store, tx, &sql).await
    }

    async fn create_id_table(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<()> {
        let sql = format!(
            "create table {}({});",
            self.id_table(),
            store.dialect().std_id_defs().join(",")
        );
        store::exec_ddl(store, tx, &sql).await
    }

    async fn create_index_id_begin(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<()> {
        let sql = format!(
            "create unique index {0}idxidbegin on {0} (id, begin);",
            self.name
        );
        store::exec_ddl(store, tx, &sql).await
    }

    async fn create_index_id_until(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<()> {
        let sql = format!(
            "create index {0}idxiduntil on {0} (id, until);",
            self.name
        );
        store::exec_ddl(store, tx, &sql).await
    }
}
