//! Parameterized reads against a version table.
//!
//! Every operation runs its preconditions before touching the database,
//! accepts an optional transaction, and returns records in deterministic
//! order.

use sea_orm::{DatabaseTransaction, Value};

use crate::dialect::Dialect;
use crate::error::OpContext;
use crate::store::{self, sanitize_query, TempusStore};
use crate::table::{read_i64, read_opt_string, read_string, Record, StdId, Table};
use crate::{TempusError, TempusResult};

/// An equality predicate used by [`Table::by_ts_and_xs`] and
/// [`Table::by_xs`].
#[derive(Clone, Debug)]
pub struct NameValue {
    pub name: String,
    pub value: Value,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<P> Table<P> {
    /// Returns the version row with the given primary key.
    pub async fn by_key(
        &self,
        store: &TempusStore,
        key: i64,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        self.by_key_inner(store, key, tx).await.op("Table::by_key")
    }

    async fn by_key_inner(
        &self,
        store: &TempusStore,
        key: i64,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        if key == 0 {
            return Err(TempusError::missing("key"));
        }
        self.read_precs()?;
        let dialect = store.dialect();
        let mut sql = self.select_clause(dialect);
        sql.push_str(&format!(" where pkey={};", dialect.format_att(1)));
        self.query(store, tx, &sql, vec![key.into()]).await
    }

    /// Point lookup by identity and begin timestamp.
    pub async fn by_id_begin(
        &self,
        store: &TempusStore,
        id: i64,
        begin: &str,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        self.point_lookup(store, id, "begin", begin, tx)
            .await
            .op("Table::by_id_begin")
    }

    /// Point lookup by identity and until timestamp.
    pub async fn by_id_until(
        &self,
        store: &TempusStore,
        id: i64,
        until: &str,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        self.point_lookup(store, id, "until", until, tx)
            .await
            .op("Table::by_id_until")
    }

    async fn point_lookup(
        &self,
        store: &TempusStore,
        id: i64,
        column: &str,
        ts: &str,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        if id == 0 {
            return Err(TempusError::missing("id"));
        }
        if ts.is_empty() {
            return Err(TempusError::missing("ts"));
        }
        self.read_precs()?;
        let dialect = store.dialect();
        let mut num = 0;
        let mut values: Vec<Value> = Vec::new();
        let mut sql = self.select_clause(dialect);
        num += 1;
        sql.push_str(&format!(" where id={}", dialect.format_att(num)));
        values.push(id.into());
        if ts == dialect.now_keyword() {
            sql.push_str(&format!(" and {column}={};", dialect.format_now()));
        } else {
            num += 1;
            sql.push_str(&format!(" and {column}={};", dialect.format_tmsp(num)));
            values.push(ts.into());
        }
        self.query(store, tx, &sql, values).await
    }

    /// Returns all versions valid at `ts`.
    pub async fn by_ts(
        &self,
        store: &TempusStore,
        ts: &str,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        self.by_ts_and_xs_inner(store, ts, &[], tx)
            .await
            .op("Table::by_ts")
    }

    /// Returns all versions valid at `ts` matching the given equality
    /// predicates, ordered by each predicate's name, then id and begin.
    pub async fn by_ts_and_xs(
        &self,
        store: &TempusStore,
        ts: &str,
        xs: &[NameValue],
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        if xs.is_empty() {
            return Err(TempusError::missing("xs").op("Table::by_ts_and_xs"));
        }
        self.by_ts_and_xs_inner(store, ts, xs, tx)
            .await
            .op("Table::by_ts_and_xs")
    }

    /// Returns the versions of one identity valid at `ts`.
    pub async fn by_id_ts(
        &self,
        store: &TempusStore,
        id: i64,
        ts: &str,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        if id == 0 {
            return Err(TempusError::missing("id").op("Table::by_id_ts"));
        }
        let xs = [NameValue::new("id", id)];
        self.by_ts_and_xs_inner(store, ts, &xs, tx)
            .await
            .op("Table::by_id_ts")
    }

    async fn by_ts_and_xs_inner(
        &self,
        store: &TempusStore,
        ts: &str,
        xs: &[NameValue],
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        if ts.is_empty() {
            return Err(TempusError::missing("ts"));
        }
        self.read_precs()?;
        let dialect = store.dialect();
        let mut num = 0;
        let mut values: Vec<Value> = Vec::new();
        let mut sql = self.select_clause(dialect);
        if ts == dialect.now_keyword() {
            sql.push_str(&format!(" where begin<={}", dialect.format_now()));
            sql.push_str(&format!(
                " and (until is null or until>{})",
                dialect.format_now()
            ));
        } else {
            num += 1;
            sql.push_str(&format!(" where begin<={}", dialect.format_tmsp(num)));
            values.push(ts.into());
            num += 1;
            sql.push_str(&format!(
                " and (until is null or until>{})",
                dialect.format_tmsp(num)
            ));
            values.push(ts.into());
        }
        for x in xs {
            num += 1;
            sql.push_str(&format!(" and {}={}", x.name, dialect.format_att(num)));
            values.push(x.value.clone());
        }
        sql.push_str(" order by ");
        for x in xs {
            sql.push_str(&x.name);
            sql.push(',');
        }
        sql.push_str("id,begin;");
        self.query(store, tx, &sql, values).await
    }

    /// Returns all versions matching the given equality predicates, without
    /// a validity window.
    pub async fn by_xs(
        &self,
        store: &TempusStore,
        xs: &[NameValue],
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        self.by_xs_inner(store, xs, tx).await.op("Table::by_xs")
    }

    async fn by_xs_inner(
        &self,
        store: &TempusStore,
        xs: &[NameValue],
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Vec<Record<P>>> {
        if xs.is_empty() {
            return Err(TempusError::missing("xs"));
        }
        self.read_precs()?;
        let dialect = store.dialect();
        let mut num = 0;
        let mut values: Vec<Value> = Vec::new();
        let mut sql = self.select_clause(dialect);
        for (i, x) in xs.iter().enumerate() {
            sql.push_str(if i == 0 { " where " } else { " and " });
            num += 1;
            sql.push_str(&format!("{}={}", x.name, dialect.format_att(num)));
            values.push(x.value.clone());
        }
        sql.push_str(" order by ");
        for x in xs {
            sql.push_str(&x.name);
            sql.push(',');
        }
        sql.push_str("id,begin;");
        self.query(store, tx, &sql, values).await
    }

    /// Counts the version rows of one identity.
    pub async fn count_by_id(
        &self,
        store: &TempusStore,
        id: i64,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<i64> {
        self.count_by_id_inner(store, id, tx)
            .await
            .op("Table::count_by_id")
    }

    async fn count_by_id_inner(
        &self,
        store: &TempusStore,
        id: i64,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<i64> {
        if id == 0 {
            return Err(TempusError::missing("id"));
        }
        self.require_name()?;
        let dialect = store.dialect();
        let sql = format!(
            "select count(*) as n from {} where id={}",
            self.name,
            dialect.format_att(1)
        );
        let row = store::query_one(store, tx, &sql, vec![id.into()]).await?;
        match row {
            Some(row) => read_i64(&row, "n"),
            None => Ok(0),
        }
    }

    /// Reads one identity row from the companion identity table.
    pub async fn read_id(
        &self,
        store: &TempusStore,
        id: i64,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Option<StdId>> {
        self.read_id_inner(store, id, tx).await.op("Table::read_id")
    }

    async fn read_id_inner(
        &self,
        store: &TempusStore,
        id: i64,
        tx: Option<&DatabaseTransaction>,
    ) -> TempusResult<Option<StdId>> {
        if id == 0 {
            return Err(TempusError::missing("id"));
        }
        self.require_name()?;
        let dialect = store.dialect();
        let sql = format!(
            "select {} from {} where id={};",
            dialect.std_id_atts().join(","),
            self.id_table(),
            dialect.format_att(1)
        );
        let row = store::query_one(store, tx, &sql, vec![id.into()]).await?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        Ok(Some(StdId {
            id: read_i64(&row, "id")?,
            created: read_string(&row, "created")?,
            created_by: read_string(&row, "created_by")?,
            used_by: read_opt_string(&row, "used_by")?,
        }))
    }

    fn read_precs(&self) -> TempusResult<()> {
        self.require_name()?;
        self.scan_fn()?;
        Ok(())
    }

    fn select_clause(&self, dialect: &dyn Dialect) -> String {
        let mut sql = String::from("select ");
        for (i, att) in dialect.std_atts().iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(att);
        }
        for att in &self.atts {
            sql.push(',');
            sql.push_str(&att.name);
        }
        sql.push_str(" from ");
        sql.push_str(&self.name);
        sql
    }

    /// Runs a select and maps every row through the descriptor's scanner.
    pub(crate) async fn query(
        &self,
        store: &TempusStore,
        tx: Option<&DatabaseTransaction>,
        sql: &str,
        values: Vec<Value>,
    ) -> TempusResult<Vec<Record<P>>> {
        let scan = self.scan_fn()?;
        let rows = store::query_all(store, tx, sql, values).await?;
        let mut recs = Vec::with_capacity(rows.len());
        for row in &rows {
            let rec = scan(row).map_err(|err| {
                TempusError::storage(format!(
                    "error scanning row for query: {}: {err}",
                    sanitize_query(sql)
                ))
            })?;
            recs.push(rec);
        }
        Ok(recs)
    }
}
