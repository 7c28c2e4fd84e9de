//! Per-engine SQL formatting primitives.
//!
//! SQL syntax differs slightly between the supported engines: positional
//! parameter markers, timestamp formatting functions, and the way the last
//! auto-assigned key is retrieved. Everything engine-specific is
//! concentrated here; the rest of the crate only talks to the [`Dialect`]
//! trait. The dialect is picked at connect time from the sea-orm backend.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseTransaction, ExecResult, Statement};

use crate::table::read_i64;
use crate::{TempusError, TempusResult};

/// Standard attributes of a version table, in wire order.
///
/// `ended` is used instead of `terminated` because MariaDB reserves the
/// latter.
pub const STD_ATTS: &[&str] = &[
    "id",
    "begin",
    "until",
    "pkey",
    "created",
    "created_by",
    "ended",
    "ended_by",
];

/// Standard attributes of an identity table, in wire order.
pub const STD_ID_ATTS: &[&str] = &["id", "created", "created_by", "used_by"];

#[async_trait]
pub trait Dialect: Send + Sync {
    fn backend(&self) -> DatabaseBackend;

    /// Literal accepted anywhere a timestamp string is expected; resolved
    /// against the database clock at SQL generation time.
    fn now_keyword(&self) -> &'static str {
        "now"
    }

    /// SQL fragment formatting the `num`-th positional parameter as the
    /// canonical timestamp string.
    fn format_tmsp(&self, num: usize) -> String;

    /// SQL fragment producing the current UTC timestamp as the canonical
    /// string.
    fn format_now(&self) -> String;

    /// SQL fragment computing `reference - tmsp` in seconds. The dialect
    /// may swap the two arguments in place when the engine's builtin
    /// computes the difference the other way around.
    fn format_diff_tmsp(&self, reference: &mut String, tmsp: &mut String) -> String;

    /// SQL fragment computing `now - tmsp` in seconds.
    fn format_diff_now(&self) -> String;

    /// Positional parameter marker.
    fn format_att(&self, num: usize) -> String;

    fn format_null(&self) -> &'static str {
        "NULL"
    }

    fn std_atts(&self) -> &'static [&'static str] {
        STD_ATTS
    }

    fn std_defs(&self) -> &'static [&'static str];

    fn std_id_atts(&self) -> &'static [&'static str] {
        STD_ID_ATTS
    }

    fn std_id_defs(&self) -> &'static [&'static str];

    /// Returns the `pkey` auto-assigned by the insert that produced `res`.
    async fn inserted_key(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
        res: &ExecResult,
    ) -> TempusResult<i64>;

    /// Returns the identity `id` auto-assigned by the insert that produced
    /// `res`.
    async fn inserted_id(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
        res: &ExecResult,
    ) -> TempusResult<i64>;
}

pub(crate) fn dialect_for(backend: DatabaseBackend) -> &'static dyn Dialect {
    match backend {
        DatabaseBackend::Postgres => &PostgresDialect,
        DatabaseBackend::MySql => &MysqlDialect,
        _ => &SqliteDialect,
    }
}

async fn query_sequence(tx: &DatabaseTransaction, sql: String) -> TempusResult<i64> {
    let row = tx
        .query_one(Statement::from_string(DatabaseBackend::Postgres, sql))
        .await
        .map_err(|err| TempusError::storage(format!("select last inserted value failed: {err}")))?
        .ok_or_else(|| TempusError::storage("select last inserted value returned no row"))?;
    read_i64(&row, "last_value")
}

// Timestamps are stored as text because SQLite has no native timestamp
// type; the other engines follow suit so readers behave identically.

pub struct SqliteDialect;

#[async_trait]
impl Dialect for SqliteDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    fn format_tmsp(&self, _num: usize) -> String {
        "strftime('%Y-%m-%d %H:%M:%f',?)".to_string()
    }

    fn format_now(&self) -> String {
        "strftime('%Y-%m-%d %H:%M:%f','now')".to_string()
    }

    fn format_diff_tmsp(&self, _reference: &mut String, _tmsp: &mut String) -> String {
        "strftime('%s',?) - strftime('%s',?)".to_string()
    }

    fn format_diff_now(&self) -> String {
        "strftime('%s','now') - strftime('%s',?)".to_string()
    }

    fn format_att(&self, _num: usize) -> String {
        "?".to_string()
    }

    fn std_defs(&self) -> &'static [&'static str] {
        &[
            "id integer not null",
            "begin varchar(26) not null",
            "until varchar(26)",
            "pkey integer primary key autoincrement",
            "created varchar(26) not null",
            "created_by varchar(50) not null",
            "ended varchar(26)",
            "ended_by varchar(50)",
        ]
    }

    fn std_id_defs(&self) -> &'static [&'static str] {
        &[
            "id integer primary key autoincrement",
            "created varchar(26) not null",
            "created_by varchar(50) not null",
            "used_by varchar(50)",
        ]
    }

    async fn inserted_key(
        &self,
        _tx: &DatabaseTransaction,
        _table: &str,
        res: &ExecResult,
    ) -> TempusResult<i64> {
        Ok(res.last_insert_id() as i64)
    }

    async fn inserted_id(
        &self,
        _tx: &DatabaseTransaction,
        _table: &str,
        res: &ExecResult,
    ) -> TempusResult<i64> {
        Ok(res.last_insert_id() as i64)
    }
}

pub struct PostgresDialect;

#[async_trait]
impl Dialect for PostgresDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn format_tmsp(&self, num: usize) -> String {
        format!("to_char(${num}::timestamp,'YYYY-MM-DD HH24:MI:SS.US')")
    }

    // now() is pinned to the start of the transaction; clock_timestamp()
    // gives the actual wall clock.
    fn format_now(&self) -> String {
        "to_char(clock_timestamp() at time zone 'utc','YYYY-MM-DD HH24:MI:SS.US')".to_string()
    }

    // extract(epoch ...) yields numeric on PostgreSQL 14+; the float8 cast
    // keeps the result decodable as a double.
    fn format_diff_tmsp(&self, _reference: &mut String, _tmsp: &mut String) -> String {
        "extract(epoch from $1::timestamp - $2::timestamp)::float8".to_string()
    }

    fn format_diff_now(&self) -> String {
        "extract(epoch from now() at time zone 'utc' - $1::timestamp)::float8".to_string()
    }

    fn format_att(&self, num: usize) -> String {
        format!("${num}")
    }

    fn std_defs(&self) -> &'static [&'static str] {
        &[
            "id integer not null",
            "begin varchar(26) not null",
            "until varchar(26)",
            "pkey serial primary key",
            "created varchar(26) not null",
            "created_by varchar(50) not null",
            "ended varchar(26)",
            "ended_by varchar(50)",
        ]
    }

    fn std_id_defs(&self) -> &'static [&'static str] {
        &[
            "id serial primary key",
            "created varchar(26) not null",
            "created_by varchar(50) not null",
            "used_by varchar(50)",
        ]
    }

    async fn inserted_key(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
        _res: &ExecResult,
    ) -> TempusResult<i64> {
        query_sequence(tx, format!("select last_value from {table}_pkey_seq;")).await
    }

    async fn inserted_id(
        &self,
        tx: &DatabaseTransaction,
        table: &str,
        _res: &ExecResult,
    ) -> TempusResult<i64> {
        query_sequence(tx, format!("select last_value from {table}id_id_seq;")).await
    }
}

pub struct MysqlDialect;

#[async_trait]
impl Dialect for MysqlDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::MySql
    }

    fn now_keyword(&self) -> &'static str {
        "now()"
    }

    fn format_tmsp(&self, _num: usize) -> String {
        "date_format(?,'%Y-%m-%d %H:%i:%s.%f')".to_string()
    }

    fn format_now(&self) -> String {
        "date_format(utc_timestamp(6),'%Y-%m-%d %H:%i:%s.%f')".to_string()
    }

    // timestampdiff(second,a,b) computes b - a, so the arguments are
    // swapped in place to keep the reference - tmsp sign convention.
    fn format_diff_tmsp(&self, reference: &mut String, tmsp: &mut String) -> String {
        std::mem::swap(reference, tmsp);
        "timestampdiff(second,?,?)".to_string()
    }

    fn format_diff_now(&self) -> String {
        "timestampdiff(second,?,utc_timestamp(6))".to_string()
    }

    fn format_att(&self, _num: usize) -> String {
        "?".to_string()
    }

    fn std_defs(&self) -> &'static [&'static str] {
        &[
            "id integer not null",
            "begin varchar(26) not null",
            "until varchar(26)",
            "pkey integer auto_increment primary key",
            "created varchar(26) not null",
            "created_by varchar(50) not null",
            "ended varchar(26)",
            "ended_by varchar(50)",
        ]
    }

    fn std_id_defs(&self) -> &'static [&'static str] {
        &[
            "id integer auto_increment primary key",
            "created varchar(26) not null",
            "created_by varchar(50) not null",
            "used_by varchar(50)",
        ]
    }

    async fn inserted_key(
        &self,
        _tx: &DatabaseTransaction,
        _table: &str,
        res: &ExecResult,
    ) -> TempusResult<i64> {
        Ok(res.last_insert_id() as i64)
    }

    async fn inserted_id(
        &self,
        _tx: &DatabaseTransaction,
        _table: &str,
        res: &ExecResult,
    ) -> TempusResult<i64> {
        Ok(res.last_insert_id() as i64)
    }
}
