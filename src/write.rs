//! Write operations: the identity protocol, the five version state
//! transitions, and the low-level DML primitives they are built from.
//!
//! Every operation validates its inputs, validates the timestamp against
//! the database clock (writing in the past is refused), and re-reads the
//! targeted row to detect competitive modification before emitting any DML.

use sea_orm::{DatabaseTransaction, Value};

use crate::error::OpContext;
use crate::store::{self, TempusStore};
use crate::table::{Std, Table};
use crate::tmsp::{tmsp, TimeRel};
use crate::{TempusError, TempusResult};

fn write_precs(ts: &str, creator: &str) -> TempusResult<()> {
    if ts.is_empty() {
        return Err(TempusError::missing("ts"));
    }
    if creator.is_empty() {
        return Err(TempusError::missing("creator"));
    }
    Ok(())
}

impl<P: Clone + PartialEq> Table<P> {
    /// Validates a write timestamp. The now keyword passes through and is
    /// resolved at SQL generation time; anything else must be a valid
    /// timestamp that does not lie in the past.
    async fn handle_ts(&self, store: &TempusStore, ts: &str) -> TempusResult<String> {
        if ts == store.now_keyword() {
            return Ok(ts.to_string());
        }
        // Validated outside the caller's transaction: a failed probe would
        // poison the transaction on PostgreSQL.
        let (out, rel) = tmsp(store, ts, None).await?;
        if rel == TimeRel::Past {
            return Err(TempusError::PastWrite { ts: out });
        }
        Ok(out)
    }

    /// Re-reads `old` by primary key and requires it to equal the captured
    /// record, refusing the write otherwise.
    async fn assert_unchanged(
        &self,
        store: &TempusStore,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        let sames = self.by_key(store, self.old.std.pkey, Some(tx)).await?;
        let same = match sames.first() {
            Some(same) => same,
            None => return Err(TempusError::CompetitivelyDeleted),
        };
        if same.std != self.old.std || same.idv != self.old.idv {
            return Err(TempusError::CompetitivelyChanged);
        }
        Ok(())
    }

    /// Allocates a new identity and returns its id. Two successive calls
    /// return two distinct ids.
    pub async fn new_id(
        &self,
        store: &TempusStore,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        self.new_id_inner(store, creator, tx)
            .await
            .op("Table::new_id")
    }

    async fn new_id_inner(
        &self,
        store: &TempusStore,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        if creator.is_empty() {
            return Err(TempusError::missing("creator"));
        }
        self.require_name()?;
        let dialect = store.dialect();
        let sql = format!(
            "insert into {} (created,created_by) values ({},{});",
            self.id_table(),
            dialect.format_now(),
            dialect.format_att(1)
        );
        let res = store::exec(store, Some(tx), &sql, vec![creator.into()]).await?;
        dialect.inserted_id(tx, &self.name, &res).await
    }

    /// Claims the identity in `new.std.id` for `creator`.
    ///
    /// The conditional update succeeds at most once and only for the actor
    /// that allocated the identity; zero affected rows means the claim was
    /// rejected.
    pub async fn use_id(
        &self,
        store: &TempusStore,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        self.use_id_inner(store, creator, tx)
            .await
            .op("Table::use_id")
    }

    async fn use_id_inner(
        &self,
        store: &TempusStore,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        let dialect = store.dialect();
        let sql = format!(
            "update {} set used_by={} where id={} and created_by={} and used_by is null;",
            self.id_table(),
            dialect.format_att(1),
            dialect.format_att(2),
            dialect.format_att(3)
        );
        let values: Vec<Value> = vec![
            creator.into(),
            self.new.std.id.into(),
            creator.into(),
        ];
        let res = store::exec(store, Some(tx), &sql, values).await?;
        if res.rows_affected() == 0 {
            return Err(TempusError::IdNotClaimed);
        }
        Ok(())
    }

    /// Inserts the first version of identity `id` and marks the identity
    /// as used. Returns the primary key of the new row.
    pub async fn start(
        &mut self,
        store: &TempusStore,
        id: i64,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        self.start_inner(store, id, ts, creator, tx)
            .await
            .op("Table::start")
    }

    async fn start_inner(
        &mut self,
        store: &TempusStore,
        id: i64,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        write_precs(ts, creator)?;
        if id == 0 {
            return Err(TempusError::missing("id"));
        }
        self.require_name()?;
        if self.new.idv.is_none() {
            return Err(TempusError::missing("Table.new.idv"));
        }
        self.vals_fn()?;

        let ts = self.handle_ts(store, ts).await?;
        self.new.std = Std {
            id,
            begin: ts,
            created_by: creator.to_string(),
            ..Std::default()
        };
        let key = self.ins(store, tx).await?;
        self.use_id_inner(store, creator, tx).await?;
        Ok(key)
    }

    /// Records a change effective at `ts`.
    ///
    /// An identical payload is a no-op; a change at the version's own begin
    /// rewrites it in place; otherwise a new version is appended and the
    /// old one closed at `ts`. Returns the primary key of the resulting
    /// current version.
    pub async fn change(
        &mut self,
        store: &TempusStore,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        self.change_inner(store, ts, creator, tx)
            .await
            .op("Table::change")
    }

    async fn change_inner(
        &mut self,
        store: &TempusStore,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        write_precs(ts, creator)?;
        self.amend_precs()?;
        if self.new.idv.is_none() {
            return Err(TempusError::missing("Table.new.idv"));
        }
        self.vals_fn()?;

        let ts = self.handle_ts(store, ts).await?;
        if self.new.idv == self.old.idv {
            return Ok(self.old.std.pkey); // nothing changed
        }
        self.assert_unchanged(store, tx).await?;

        if ts == self.old.std.begin {
            self.new.std = self.old.std.clone();
            self.new.std.created_by = creator.to_string();
            self.upd(store, tx).await?;
            Ok(self.new.std.pkey)
        } else {
            self.new.std = Std {
                id: self.old.std.id,
                begin: ts.clone(),
                created_by: creator.to_string(),
                ..Std::default()
            };
            let key = self.ins(store, tx).await?;

            self.new.std = self.old.std.clone();
            self.new.std.until = ts;
            self.new.std.ended_by = creator.to_string();
            self.set_until(store, tx).await?;
            Ok(key)
        }
    }

    /// Terminates the captured version at `ts`, deleting every follower
    /// that lay beyond it. Returns the primary key, or 0 when the version
    /// collapsed and was deleted.
    pub async fn terminate(
        &mut self,
        store: &TempusStore,
        ts: &str,
        terminator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        self.terminate_inner(store, ts, terminator, tx)
            .await
            .op("Table::terminate")
    }

    async fn terminate_inner(
        &mut self,
        store: &TempusStore,
        ts: &str,
        terminator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        write_precs(ts, terminator)?;
        self.amend_precs()?;

        let ts = self.handle_ts(store, ts).await?;
        let mut key = self.old.std.pkey;
        if ts == self.old.std.until {
            return Ok(key); // no change
        }
        if ts.as_str() < self.old.std.begin.as_str() {
            return Err(TempusError::NotAllowed);
        }
        self.assert_unchanged(store, tx).await?;

        if ts == self.old.std.begin {
            // The period collapses to empty.
            self.new.std = self.old.std.clone();
            self.del(store, tx).await?;
            key = 0;
        } else {
            self.new.std = self.old.std.clone();
            self.new.std.until = ts.clone();
            self.new.std.ended_by = terminator.to_string();
            self.set_until(store, tx).await?;
        }

        if !self.old.std.until.is_empty() {
            let mut nexts = self
                .by_id_begin(store, self.old.std.id, &self.old.std.until, Some(tx))
                .await?;
            while let Some(next) = nexts.first().cloned() {
                self.new.std = next.std.clone();
                self.del(store, tx).await?;
                if next.std.until.is_empty() {
                    break;
                }
                nexts = self
                    .by_id_begin(store, next.std.id, &next.std.until, Some(tx))
                    .await?;
            }
        }

        Ok(key)
    }

    /// Moves the terminal edge of the captured version to `ts`, absorbing
    /// or truncating followers. Returns the primary key, or 0 when the
    /// version collapsed and was deleted.
    pub async fn move_until(
        &mut self,
        store: &TempusStore,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        self.move_until_inner(store, ts, creator, tx)
            .await
            .op("Table::move_until")
    }

    async fn move_until_inner(
        &mut self,
        store: &TempusStore,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        write_precs(ts, creator)?;
        self.amend_precs()?;

        let ts = self.handle_ts(store, ts).await?;
        let mut key = self.old.std.pkey;
        if ts == self.old.std.until {
            return Ok(key); // no change
        }
        if ts.as_str() < self.old.std.begin.as_str() {
            return Err(TempusError::NotAllowed);
        }
        self.assert_unchanged(store, tx).await?;

        if ts == self.old.std.begin {
            self.new.std = self.old.std.clone();
            self.del(store, tx).await?;
            key = 0;
        } else {
            self.new.std = self.old.std.clone();
            self.new.std.until = ts.clone();
            self.new.std.ended_by = creator.to_string();
            self.set_until(store, tx).await?;
        }

        if !self.old.std.until.is_empty() {
            let nexts = self
                .by_id_begin(store, self.old.std.id, &self.old.std.until, Some(tx))
                .await?;
            let mut survivor = nexts.first().cloned();
            if ts.as_str() > self.old.std.until.as_str() {
                // Extending: followers fully inside the moved range are
                // shadowed and deleted.
                while let Some(next) = survivor.clone() {
                    if next.std.until.is_empty() || next.std.until.as_str() >= ts.as_str() {
                        break;
                    }
                    self.new.std = next.std.clone();
                    self.del(store, tx).await?;
                    let nexts = self
                        .by_id_begin(store, next.std.id, &next.std.until, Some(tx))
                        .await?;
                    survivor = nexts.first().cloned();
                }
            }
            if let Some(next) = survivor {
                self.new.std = next.std.clone();
                self.new.std.begin = ts.clone();
                self.new.std.created_by = creator.to_string();
                self.set_begin(store, tx).await?;
            }
        }

        Ok(key)
    }

    /// Moves the initial edge of the captured version to `ts`, absorbing
    /// or truncating predecessors. Returns the primary key, or 0 when the
    /// version collapsed and was deleted.
    pub async fn move_begin(
        &mut self,
        store: &TempusStore,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        self.move_begin_inner(store, ts, creator, tx)
            .await
            .op("Table::move_begin")
    }

    async fn move_begin_inner(
        &mut self,
        store: &TempusStore,
        ts: &str,
        creator: &str,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        write_precs(ts, creator)?;
        self.amend_precs()?;

        let ts = self.handle_ts(store, ts).await?;
        let mut key = self.old.std.pkey;
        if ts == self.old.std.begin {
            return Ok(key); // no change
        }
        if ts.as_str() > self.old.std.until.as_str() {
            return Err(TempusError::NotAllowed);
        }
        self.assert_unchanged(store, tx).await?;

        if ts == self.old.std.until {
            self.new.std = self.old.std.clone();
            self.del(store, tx).await?;
            key = 0;
        } else {
            self.new.std = self.old.std.clone();
            self.new.std.begin = ts.clone();
            self.new.std.ended_by = creator.to_string();
            self.set_begin(store, tx).await?;
        }

        let nexts = self
            .by_id_until(store, self.old.std.id, &self.old.std.begin, Some(tx))
            .await?;
        let mut survivor = nexts.first().cloned();
        if survivor.is_none() {
            return Ok(key); // no predecessor
        }
        if ts.as_str() < self.old.std.begin.as_str() {
            // Extending backward: predecessors fully inside the moved range
            // are shadowed and deleted.
            while let Some(prev) = survivor.clone() {
                if prev.std.begin.as_str() <= ts.as_str() {
                    break;
                }
                self.new.std = prev.std.clone();
                self.del(store, tx).await?;
                let nexts = self
                    .by_id_until(store, prev.std.id, &prev.std.begin, Some(tx))
                    .await?;
                survivor = nexts.first().cloned();
            }
        }
        if let Some(prev) = survivor {
            self.new.std = prev.std.clone();
            self.new.std.until = ts.clone();
            self.new.std.created_by = creator.to_string();
            self.set_until(store, tx).await?;
        }

        Ok(key)
    }

    // Shared preconditions of the amend-style operations.
    fn amend_precs(&self) -> TempusResult<()> {
        self.require_name()?;
        if self.old.std.pkey == 0 {
            return Err(TempusError::missing("Table.old.std"));
        }
        if self.old.idv.is_none() {
            return Err(TempusError::missing("Table.old.idv"));
        }
        self.scan_fn()?;
        Ok(())
    }

    /// Inserts `new` as a version row; only non-empty standard fields and
    /// non-empty cells are written, `created` is always the database clock.
    pub(crate) async fn ins(
        &self,
        store: &TempusStore,
        tx: &DatabaseTransaction,
    ) -> TempusResult<i64> {
        let cells = self.cells()?;
        let dialect = store.dialect();
        let std = &self.new.std;
        let mut cols = String::new();
        let mut marks = String::new();
        let mut values: Vec<Value> = Vec::new();
        let mut num = 0;

        if std.id != 0 {
            num += 1;
            cols.push_str("id,");
            marks.push_str(&format!("{},", dialect.format_att(num)));
            values.push(std.id.into());
        }
        if !std.begin.is_empty() {
            cols.push_str("begin,");
            if std.begin == dialect.now_keyword() {
                marks.push_str(&format!("{},", dialect.format_now()));
            } else {
                num += 1;
                marks.push_str(&format!("{},", dialect.format_tmsp(num)));
                values.push(std.begin.clone().into());
            }
        }
        if !std.until.is_empty() {
            num += 1;
            cols.push_str("until,");
            marks.push_str(&format!("{},", dialect.format_tmsp(num)));
            values.push(std.until.clone().into());
        }
        cols.push_str("created,");
        marks.push_str(&format!("{},", dialect.format_now()));
        if !std.created_by.is_empty() {
            num += 1;
            cols.push_str("created_by,");
            marks.push_str(&format!("{},", dialect.format_att(num)));
            values.push(std.created_by.clone().into());
        }
        if !std.ended.is_empty() {
            num += 1;
            cols.push_str("ended,");
            marks.push_str(&format!("{},", dialect.format_tmsp(num)));
            values.push(std.ended.clone().into());
        }
        if !std.ended_by.is_empty() {
            num += 1;
            cols.push_str("ended_by,");
            marks.push_str(&format!("{},", dialect.format_att(num)));
            values.push(std.ended_by.clone().into());
        }
        for (att, cell) in self.atts.iter().zip(&cells) {
            if cell.is_empty() {
                continue; // NULL by omission
            }
            num += 1;
            cols.push_str(&att.name);
            cols.push(',');
            marks.push_str(&format!("{},", dialect.format_att(num)));
            values.push(att.bind(cell)?);
        }

        cols.pop();
        marks.pop();
        let sql = format!("insert into {} ({}) values ({});", self.name, cols, marks);
        let res = store::exec(store, Some(tx), &sql, values).await?;
        dialect.inserted_key(tx, &self.name, &res).await
    }

    /// Rewrites the domain columns of the row keyed by `new.std.pkey`,
    /// refreshing `created` and `created_by`.
    pub(crate) async fn upd(
        &self,
        store: &TempusStore,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        let cells = self.cells()?;
        let dialect = store.dialect();
        let mut sql = format!("update {} set created={}", self.name, dialect.format_now());
        let mut values: Vec<Value> = Vec::new();
        let mut num = 0;

        if !self.new.std.created_by.is_empty() {
            num += 1;
            sql.push_str(&format!(",created_by={}", dialect.format_att(num)));
            values.push(self.new.std.created_by.clone().into());
        }
        for (att, cell) in self.atts.iter().zip(&cells) {
            if cell.is_empty() {
                sql.push_str(&format!(",{}={}", att.name, dialect.format_null()));
            } else {
                num += 1;
                sql.push_str(&format!(",{}={}", att.name, dialect.format_att(num)));
                values.push(att.bind(cell)?);
            }
        }
        num += 1;
        sql.push_str(&format!(" where pkey={};", dialect.format_att(num)));
        values.push(self.new.std.pkey.into());

        let res = store::exec(store, Some(tx), &sql, values).await?;
        if res.rows_affected() == 0 {
            return Err(TempusError::NothingUpdated);
        }
        Ok(())
    }

    /// Deletes the row keyed by `new.std.pkey`.
    pub(crate) async fn del(
        &self,
        store: &TempusStore,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        let dialect = store.dialect();
        let sql = format!(
            "delete from {} where pkey={};",
            self.name,
            dialect.format_att(1)
        );
        let res = store::exec(store, Some(tx), &sql, vec![self.new.std.pkey.into()]).await?;
        if res.rows_affected() == 0 {
            return Err(TempusError::NothingDeleted);
        }
        Ok(())
    }

    /// Updates `begin`, refreshing `created` and `created_by`.
    pub(crate) async fn set_begin(
        &self,
        store: &TempusStore,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        let dialect = store.dialect();
        let mut sql = format!("update {} set ", self.name);
        let mut values: Vec<Value> = Vec::new();
        let mut num = 0;

        if self.new.std.begin == dialect.now_keyword() {
            sql.push_str(&format!("begin={},", dialect.format_now()));
        } else {
            num += 1;
            sql.push_str(&format!("begin={},", dialect.format_tmsp(num)));
            values.push(self.new.std.begin.clone().into());
        }
        sql.push_str(&format!("created={},", dialect.format_now()));
        num += 1;
        sql.push_str(&format!("created_by={}", dialect.format_att(num)));
        values.push(self.new.std.created_by.clone().into());
        num += 1;
        sql.push_str(&format!(" where pkey={};", dialect.format_att(num)));
        values.push(self.new.std.pkey.into());

        let res = store::exec(store, Some(tx), &sql, values).await?;
        if res.rows_affected() == 0 {
            return Err(TempusError::NothingUpdated);
        }
        Ok(())
    }

    /// Updates `until`, refreshing `ended` and `ended_by`.
    pub(crate) async fn set_until(
        &self,
        store: &TempusStore,
        tx: &DatabaseTransaction,
    ) -> TempusResult<()> {
        let dialect = store.dialect();
        let mut sql = format!("update {} set ", self.name);
        let mut values: Vec<Value> = Vec::new();
        let mut num = 0;

        if self.new.std.until == dialect.now_keyword() {
            sql.push_str(&format!("until={},", dialect.format_now()));
        } else {
            num += 1;
            sql.push_str(&format!("until={},", dialect.format_tmsp(num)));
            values.push(self.new.std.until.clone().into());
        }
        sql.push_str(&format!("ended={},", dialect.format_now()));
        num += 1;
        sql.push_str(&format!("ended_by={}", dialect.format_att(num)));
        values.push(self.new.std.ended_by.clone().into());
        num += 1;
        sql.push_str(&format!(" where pkey={};", dialect.format_att(num)));
        values.push(self.new.std.pkey.into());

        let res = store::exec(store, Some(tx), &sql, values).await?;
        if res.rows_affected() == 0 {
            return Err(TempusError::NothingUpdated);
        }
        Ok(())
    }
}
