//! Timestamp validation and classification.
//!
//! All timestamp semantics round-trip through the database so the library
//! agrees bit for bit with the engine's own temporal functions, in
//! particular around DST and leap seconds. A local reimplementation would
//! diverge.

use sea_orm::{DatabaseTransaction, QueryResult};

use crate::error::OpContext;
use crate::store::{self, TempusStore};
use crate::{TempusError, TempusResult};

/// Position of a timestamp relative to a reference instant. The compare
/// stops at second granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeRel {
    Past,
    Present,
    Future,
}

impl TimeRel {
    pub fn is_past(self) -> bool {
        self == TimeRel::Past
    }

    pub fn is_present(self) -> bool {
        self == TimeRel::Present
    }

    pub fn is_future(self) -> bool {
        self == TimeRel::Future
    }
}

/// Returns true if `tmsp` conforms to the canonical timestamp format and
/// denotes a valid date, as judged by the database.
///
/// A query error is interpreted as "not a valid timestamp" rather than
/// surfaced: PostgreSQL reports malformed input by raising, SQLite by
/// returning NULL.
pub async fn is_tmsp(
    store: &TempusStore,
    tmsp: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<bool> {
    let sql = format!("select {} as ts;", store.dialect().format_tmsp(1));
    let row = match store::query_one(store, tx, &sql, vec![tmsp.into()]).await {
        Ok(row) => row,
        Err(_) => return Ok(false),
    };
    let row = row
        .ok_or_else(|| TempusError::storage("timestamp probe returned no row"))
        .op("is_tmsp")?;
    let value: Option<String> = row.try_get("", "ts").map_err(TempusError::from).op("is_tmsp")?;
    Ok(value.is_some())
}

/// Returns the current UTC timestamp as the canonical string.
pub async fn current_tmsp(
    store: &TempusStore,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<String> {
    let sql = format!("select {} as ts;", store.dialect().format_now());
    let row = store::query_one(store, tx, &sql, Vec::new())
        .await
        .op("current_tmsp")?
        .ok_or_else(|| TempusError::storage("current timestamp query returned no row"))
        .op("current_tmsp")?;
    row.try_get("", "ts")
        .map_err(TempusError::from)
        .op("current_tmsp")
}

/// Classifies `tmsp` against the database clock.
pub async fn cmp_tmsp_now(
    store: &TempusStore,
    tmsp: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<TimeRel> {
    cmp_tmsp_now_inner(store, tmsp, tx).await.op("cmp_tmsp_now")
}

async fn cmp_tmsp_now_inner(
    store: &TempusStore,
    tmsp: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<TimeRel> {
    let head = head19("tmsp", tmsp)?;
    let sql = format!("select {} as seconds;", store.dialect().format_diff_now());
    let row = store::query_one(store, tx, &sql, vec![head.into()])
        .await?
        .ok_or_else(|| TempusError::storage("timestamp diff query returned no row"))?;
    Ok(classify(read_seconds(&row)?))
}

/// Classifies `tmsp` against a caller-supplied reference timestamp.
pub async fn cmp_tmsp_ref(
    store: &TempusStore,
    tmsp: &str,
    reference: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<TimeRel> {
    cmp_tmsp_ref_inner(store, tmsp, reference, tx)
        .await
        .op("cmp_tmsp_ref")
}

async fn cmp_tmsp_ref_inner(
    store: &TempusStore,
    tmsp: &str,
    reference: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<TimeRel> {
    let mut reference = head19("ref", reference)?.to_string();
    let mut tmsp = head19("tmsp", tmsp)?.to_string();
    // The dialect may swap the two bind values in place.
    let frag = store
        .dialect()
        .format_diff_tmsp(&mut reference, &mut tmsp);
    let sql = format!("select {frag} as seconds;");
    let row = store::query_one(store, tx, &sql, vec![reference.into(), tmsp.into()])
        .await?
        .ok_or_else(|| TempusError::storage("timestamp diff query returned no row"))?;
    Ok(classify(read_seconds(&row)?))
}

/// Validates `input` and classifies it against the database clock. The
/// now keyword resolves to [`current_tmsp`] and classifies as present.
pub async fn tmsp(
    store: &TempusStore,
    input: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<(String, TimeRel)> {
    tmsp_inner(store, input, tx).await.op("tmsp")
}

async fn tmsp_inner(
    store: &TempusStore,
    input: &str,
    tx: Option<&DatabaseTransaction>,
) -> TempusResult<(String, TimeRel)> {
    if input == store.now_keyword() {
        let out = current_tmsp(store, tx).await?;
        return Ok((out, TimeRel::Present));
    }
    if !is_tmsp(store, input, tx).await? {
        return Err(TempusError::TmspInvalid {
            value: input.to_string(),
        });
    }
    let rel = cmp_tmsp_now(store, input, tx).await?;
    Ok((input.to_string(), rel))
}

fn head19<'a>(name: &str, value: &'a str) -> TempusResult<&'a str> {
    value.get(..19).ok_or_else(|| TempusError::TmspTooShort {
        name: name.to_string(),
        value: value.to_string(),
    })
}

// Positive means the probed timestamp lies before the reference.
fn classify(seconds: f64) -> TimeRel {
    if seconds > 0.0 {
        TimeRel::Past
    } else if seconds == 0.0 {
        TimeRel::Present
    } else {
        TimeRel::Future
    }
}

// The seconds expression decodes differently per engine: SQLite yields an
// integer, MySQL a bigint, PostgreSQL a double after the float8 cast.
fn read_seconds(row: &QueryResult) -> TempusResult<f64> {
    if let Ok(value) = row.try_get::<f64>("", "seconds") {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<i64>("", "seconds") {
        return Ok(value as f64);
    }
    if let Ok(value) = row.try_get::<i32>("", "seconds") {
        return Ok(value as f64);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>>("", "seconds") {
        if let Ok(parsed) = value.parse::<f64>() {
            return Ok(parsed);
        }
    }
    Err(TempusError::storage("unsupported seconds format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_sign_convention() {
        assert_eq!(classify(1.0), TimeRel::Past);
        assert_eq!(classify(0.0), TimeRel::Present);
        assert_eq!(classify(-1.0), TimeRel::Future);
    }

    #[test]
    fn head19_requires_length() {
        assert!(head19("tmsp", "2020-01-01 00:00:00").is_ok());
        assert!(matches!(
            head19("tmsp", "2020-01-01"),
            Err(TempusError::TmspTooShort { .. })
        ));
    }
}
