#![allow(dead_code)]

use sea_orm::{DatabaseBackend, QueryResult};
use tempfile::TempDir;
use tempus::{
    read_opt_i64, read_opt_string, read_string, Att, Record, Std, Table, TempusConfig,
    TempusResult, TempusStore,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Gadget {
    pub label: String,
    pub code: String,
    pub qty: i64,
}

impl Gadget {
    pub fn new(label: &str, code: &str, qty: i64) -> Self {
        Self {
            label: label.to_string(),
            code: code.to_string(),
            qty,
        }
    }
}

pub fn gadget_scan(row: &QueryResult) -> TempusResult<Record<Gadget>> {
    let std = Std::from_row(row)?;
    let gadget = Gadget {
        label: read_opt_string(row, "label")?,
        code: read_string(row, "code")?,
        qty: read_opt_i64(row, "qty")?,
    };
    Ok(Record {
        std,
        idv: Some(gadget),
    })
}

pub fn gadget_vals(gadget: &Gadget) -> Vec<String> {
    vec![
        gadget.label.clone(),
        gadget.code.clone(),
        // zero is the NULL sentinel for numeric cells
        if gadget.qty == 0 {
            String::new()
        } else {
            gadget.qty.to_string()
        },
    ]
}

pub fn gadget_table_named(name: &str) -> Table<Gadget> {
    Table {
        name: name.to_string(),
        atts: vec![Att::text("label"), Att::text("code"), Att::num("qty")],
        defs: vec![
            "label varchar(10)".to_string(),
            "code varchar(10) not null".to_string(),
            "qty integer".to_string(),
        ],
        old: Record::default(),
        new: Record::default(),
        vals: Some(gadget_vals),
        scan: Some(gadget_scan),
    }
}

pub fn gadget_table() -> Table<Gadget> {
    gadget_table_named("gadget")
}

pub async fn sqlite_store() -> (TempDir, TempusStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = TempusConfig::default_sqlite(dir.path().join("tempus.sqlite").to_string_lossy());
    let store = TempusStore::connect(&config, dir.path())
        .await
        .expect("connect sqlite");
    (dir, store)
}

/// Canonical timestamp literal with the fraction width the backend stores:
/// milliseconds on SQLite, microseconds on PostgreSQL and MySQL.
pub fn ts(store: &TempusStore, head: &str) -> String {
    match store.backend() {
        DatabaseBackend::Sqlite => format!("{head}.000"),
        _ => format!("{head}.000000"),
    }
}
