//! The table descriptor and its record types.

use sea_orm::QueryResult;

use crate::{TempusError, TempusResult};

/// Standard attributes present in every version row.
///
/// Nullable columns use the empty string (or `0`) as the NULL sentinel so
/// records stay plainly comparable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Std {
    /// Identity this version belongs to.
    pub id: i64,
    /// Valid from and including.
    pub begin: String,
    /// Valid until and excluding; empty means open-ended.
    pub until: String,
    /// Primary key of this version row.
    pub pkey: i64,
    pub created: String,
    pub created_by: String,
    pub ended: String,
    pub ended_by: String,
}

impl Std {
    /// Reads the standard columns from a result row.
    pub fn from_row(row: &QueryResult) -> TempusResult<Std> {
        Ok(Std {
            id: read_i64(row, "id")?,
            begin: read_string(row, "begin")?,
            until: read_opt_string(row, "until")?,
            pkey: read_i64(row, "pkey")?,
            created: read_string(row, "created")?,
            created_by: read_string(row, "created_by")?,
            ended: read_opt_string(row, "ended")?,
            ended_by: read_opt_string(row, "ended_by")?,
        })
    }
}

/// One row of an identity table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StdId {
    pub id: i64,
    pub created: String,
    pub created_by: String,
    /// Creator of the first version row; empty until the identity is used.
    pub used_by: String,
}

/// A version record: standard attributes plus the domain payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Record<P> {
    pub std: Std,
    pub idv: Option<P>,
}

impl<P> Default for Record<P> {
    fn default() -> Self {
        Self {
            std: Std::default(),
            idv: None,
        }
    }
}

/// A domain attribute of a version table.
#[derive(Clone, Debug)]
pub struct Att {
    pub name: String,
    /// Numeric attributes bind their cells as integers; PostgreSQL rejects
    /// text parameters in integer columns.
    pub num_type: bool,
}

impl Att {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_type: false,
        }
    }

    pub fn num(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_type: true,
        }
    }

    pub(crate) fn bind(&self, cell: &str) -> TempusResult<sea_orm::Value> {
        if self.num_type {
            let value: i64 = cell.parse().map_err(|_| {
                TempusError::storage(format!(
                    "attribute {} expects a numeric value, got: {cell}",
                    self.name
                ))
            })?;
            Ok(value.into())
        } else {
            Ok(cell.to_string().into())
        }
    }
}

/// Maps a result row to a record. The scanner must translate SQL NULL to
/// the empty/zero sentinels.
pub type ScanFn<P> = fn(&QueryResult) -> TempusResult<Record<P>>;

/// Extracts a payload into string cells parallel to the attribute list.
/// The empty string indicates SQL NULL.
pub type ValsFn<P> = fn(&P) -> Vec<String>;

/// Client-owned descriptor of one temporal table.
///
/// `old` holds the version being amended, `new` the version being written;
/// write operations use both as working state.
pub struct Table<P> {
    pub name: String,
    pub atts: Vec<Att>,
    /// Domain column definitions, used by [`Table::create`].
    pub defs: Vec<String>,
    pub old: Record<P>,
    pub new: Record<P>,
    pub vals: Option<ValsFn<P>>,
    pub scan: Option<ScanFn<P>>,
}

impl<P> Table<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atts: Vec::new(),
            defs: Vec::new(),
            old: Record::default(),
            new: Record::default(),
            vals: None,
            scan: None,
        }
    }

    /// Name of the companion identity table.
    pub fn id_table(&self) -> String {
        format!("{}id", self.name)
    }

    pub(crate) fn require_name(&self) -> TempusResult<()> {
        if self.name.is_empty() {
            return Err(TempusError::missing("table name"));
        }
        Ok(())
    }

    pub(crate) fn scan_fn(&self) -> TempusResult<ScanFn<P>> {
        self.scan.ok_or_else(|| TempusError::missing("Table.scan"))
    }

    pub(crate) fn vals_fn(&self) -> TempusResult<ValsFn<P>> {
        self.vals.ok_or_else(|| TempusError::missing("Table.vals"))
    }

    pub(crate) fn cells(&self) -> TempusResult<Vec<String>> {
        let vals = self.vals_fn()?;
        let idv = self
            .new
            .idv
            .as_ref()
            .ok_or_else(|| TempusError::missing("Table.new.idv"))?;
        let cells = vals(idv);
        if cells.len() != self.atts.len() {
            return Err(TempusError::storage(format!(
                "value extractor returned {} cells for {} attributes",
                cells.len(),
                self.atts.len()
            )));
        }
        Ok(cells)
    }
}

/// Reads an integer column, tolerating the width the engine reports.
pub fn read_i64(row: &QueryResult, name: &str) -> TempusResult<i64> {
    if let Ok(value) = row.try_get::<i64>("", name) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<i32>("", name) {
        return Ok(value as i64);
    }
    if let Ok(value) = row.try_get::<u64>("", name) {
        return Ok(value as i64);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>>("", name) {
        if let Ok(parsed) = value.parse::<i64>() {
            return Ok(parsed);
        }
    }
    Err(TempusError::storage(format!(
        "unsupported integer format for column {name}"
    )))
}

/// Reads a nullable integer column; NULL maps to `0`.
pub fn read_opt_i64(row: &QueryResult, name: &str) -> TempusResult<i64> {
    if let Ok(value) = row.try_get::<Option<i64>>("", name) {
        return Ok(value.unwrap_or_default());
    }
    if let Ok(value) = row.try_get::<Option<i32>>("", name) {
        return Ok(value.unwrap_or_default() as i64);
    }
    if let Ok(value) = row.try_get::<Option<u64>>("", name) {
        return Ok(value.unwrap_or_default() as i64);
    }
    Err(TempusError::storage(format!(
        "unsupported integer format for column {name}"
    )))
}

pub fn read_string(row: &QueryResult, name: &str) -> TempusResult<String> {
    row.try_get::<String>("", name).map_err(TempusError::from)
}

/// Reads a nullable text column; NULL maps to the empty string.
pub fn read_opt_string(row: &QueryResult, name: &str) -> TempusResult<String> {
    Ok(row
        .try_get::<Option<String>>("", name)
        .map_err(TempusError::from)?
        .unwrap_or_default())
}
