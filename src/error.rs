use thiserror::Error;

#[derive(Debug, Error)]
pub enum TempusError {
    #[error("{name} missing")]
    Missing { name: String },
    #[error("database already open")]
    AlreadyOpen,
    #[error("database not open")]
    NotOpen,
    #[error("table {present} exists, table {missing} is missing")]
    CompanionMissing { present: String, missing: String },
    #[error("timestamp {name} too short: {value}, expected at least 19 characters")]
    TmspTooShort { name: String, value: String },
    #[error("not a valid timestamp: {value}")]
    TmspInvalid { value: String },
    #[error("cannot change the past: {ts}")]
    PastWrite { ts: String },
    #[error("competitively deleted")]
    CompetitivelyDeleted,
    #[error("competitively changed")]
    CompetitivelyChanged,
    #[error("not allowed")]
    NotAllowed,
    #[error("id table not updated")]
    IdNotClaimed,
    #[error("nothing updated")]
    NothingUpdated,
    #[error("nothing deleted")]
    NothingDeleted,
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("{op}: {source}")]
    Op {
        op: &'static str,
        #[source]
        source: Box<TempusError>,
    },
}

impl TempusError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    /// Wraps the error with the name of the failing operation.
    pub fn op(self, op: &'static str) -> Self {
        Self::Op {
            op,
            source: Box::new(self),
        }
    }

    /// Strips operation contexts down to the originating error.
    pub fn root(&self) -> &TempusError {
        match self {
            Self::Op { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type TempusResult<T> = Result<T, TempusError>;

impl From<sea_orm::DbErr> for TempusError {
    fn from(value: sea_orm::DbErr) -> Self {
        TempusError::storage(value.to_string())
    }
}

pub(crate) trait OpContext<T> {
    fn op(self, op: &'static str) -> TempusResult<T>;
}

impl<T> OpContext<T> for TempusResult<T> {
    fn op(self, op: &'static str) -> TempusResult<T> {
        self.map_err(|err| err.op(op))
    }
}
