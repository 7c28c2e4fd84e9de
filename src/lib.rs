//! Temporal tables layered on a general-purpose SQL engine.
//!
//! Every domain entity is modeled as a permanent *identity* plus a sequence
//! of *versions*, each valid for the half-open period `[begin, until)`.
//! Changing data never overwrites valid history: a change terminates the
//! current period and appends a new version. Overwrite and delete are only
//! possible for versions whose period has not yet begun.
//!
//! The crate supports SQLite, PostgreSQL and MySQL through a runtime
//! [`Dialect`] selected from the connection backend.

pub mod config;
pub mod dialect;
mod error;
mod read;
mod schema;
pub mod store;
pub mod table;
pub mod tmsp;
mod write;

pub use config::{DatabaseConfig, PoolConfig, TempusConfig};
pub use dialect::{Dialect, MysqlDialect, PostgresDialect, SqliteDialect};
pub use error::{TempusError, TempusResult};
pub use read::NameValue;
pub use store::{close, global, open, TempusStore};
pub use table::{
    read_i64, read_opt_i64, read_opt_string, read_string, Att, Record, ScanFn, Std, StdId, Table,
    ValsFn,
};
pub use tmsp::{cmp_tmsp_now, cmp_tmsp_ref, current_tmsp, is_tmsp, tmsp, TimeRel};
