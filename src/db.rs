use rusqlite::types::Value;
use rusqlite::Connection;

use crate::error::{EtlError, Result};

pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS property (
            prop_id   INTEGER PRIMARY KEY,
            address   TEXT NOT NULL,
            postcode  TEXT,
            latitude  REAL NOT NULL,
            longitude REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS price (
            prop_id INTEGER NOT NULL,
            date    TEXT NOT NULL,
            price   INTEGER NOT NULL,
            PRIMARY KEY (prop_id, date)
        );

        CREATE TABLE IF NOT EXISTS interest_rates (
            date TEXT PRIMARY KEY,
            rate REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS index_price (
            date  TEXT PRIMARY KEY,
            close REAL NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Idempotent merge ──

/// A target table, its column order, and the natural-key subset the
/// merge checks against. One primitive enforces key uniqueness for every
/// load in the pipeline.
pub struct MergeSpec<'a> {
    pub table: &'a str,
    pub columns: &'a [&'a str],
    pub key_columns: &'a [&'a str],
}

pub const PROPERTY_MERGE: MergeSpec<'static> = MergeSpec {
    table: "property",
    columns: &["prop_id", "address", "postcode", "latitude", "longitude"],
    key_columns: &["prop_id"],
};

pub const PRICE_MERGE: MergeSpec<'static> = MergeSpec {
    table: "price",
    columns: &["prop_id", "date", "price"],
    key_columns: &["prop_id", "date"],
};

pub const RATE_MERGE: MergeSpec<'static> = MergeSpec {
    table: "interest_rates",
    columns: &["date", "rate"],
    key_columns: &["date"],
};

pub const INDEX_MERGE: MergeSpec<'static> = MergeSpec {
    table: "index_price",
    columns: &["date", "close"],
    key_columns: &["date"],
};

/// Insert only the rows whose natural key is not already present, as one
/// set-based statement. Returns the number of rows actually inserted; an
/// empty batch returns 0 without touching the store.
pub fn merge_missing(
    conn: &Connection,
    spec: &MergeSpec,
    rows: &[Vec<Value>],
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != spec.columns.len() {
            return Err(EtlError::MalformedData(format!(
                "row {i} for {} has {} values, expected {}",
                spec.table,
                row.len(),
                spec.columns.len()
            )));
        }
    }

    let sql = merge_sql(spec, rows.len());
    let mut stmt = conn.prepare(&sql)?;
    let inserted = stmt.execute(rusqlite::params_from_iter(rows.iter().flatten()))?;
    Ok(inserted)
}

fn merge_sql(spec: &MergeSpec, row_count: usize) -> String {
    let columns = spec.columns.join(", ");
    let row_placeholder = format!("({})", vec!["?"; spec.columns.len()].join(", "));
    let values = vec![row_placeholder; row_count].join(", ");
    let selected = spec
        .columns
        .iter()
        .map(|c| format!("s.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let key_match = spec
        .key_columns
        .iter()
        .map(|k| format!("t.{k} = s.{k}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "WITH source({columns}) AS (VALUES {values}) \
         INSERT INTO {table} ({columns}) \
         SELECT {selected} FROM source s \
         WHERE NOT EXISTS (SELECT 1 FROM {table} t WHERE {key_match})",
        table = spec.table,
    )
}

// ── Probes ──

/// Row count for before/after delta logging. Informational only; no
/// isolation is assumed against concurrent writers.
pub fn table_count(conn: &Connection, table: &str) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

pub fn max_date(conn: &Connection, table: &str, column: &str) -> Result<Option<String>> {
    let max = conn.query_row(
        &format!("SELECT MAX({column}) FROM {table}"),
        [],
        |row| row.get(0),
    )?;
    Ok(max)
}

// ── Mart refresh ──

/// Run a downstream mart-refresh script as one opaque unit of work.
/// The script's content is the mart's concern; failure propagates.
pub fn refresh_mart(conn: &Connection, script: &str) -> Result<()> {
    conn.execute_batch(script)?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn rate_row(date: &str, rate: f64) -> Vec<Value> {
        vec![Value::Text(date.to_string()), Value::Real(rate)]
    }

    #[test]
    fn merge_sql_checks_every_key_column() {
        let sql = merge_sql(&PRICE_MERGE, 2);
        assert_eq!(
            sql,
            "WITH source(prop_id, date, price) AS (VALUES (?, ?, ?), (?, ?, ?)) \
             INSERT INTO price (prop_id, date, price) \
             SELECT s.prop_id, s.date, s.price FROM source s \
             WHERE NOT EXISTS (SELECT 1 FROM price t \
             WHERE t.prop_id = s.prop_id AND t.date = s.date)"
        );
    }

    #[test]
    fn second_load_of_the_same_batch_inserts_nothing() {
        let conn = test_conn();
        let batch = vec![rate_row("2023-08-01", 5.19), rate_row("2023-08-02", 5.20)];
        assert_eq!(merge_missing(&conn, &RATE_MERGE, &batch).unwrap(), 2);
        assert_eq!(merge_missing(&conn, &RATE_MERGE, &batch).unwrap(), 0);
        assert_eq!(table_count(&conn, "interest_rates").unwrap(), 2);
    }

    #[test]
    fn disjoint_batches_add_exactly_their_size() {
        let conn = test_conn();
        let first = vec![rate_row("2023-08-01", 5.19)];
        let second = vec![rate_row("2023-08-02", 5.20), rate_row("2023-08-03", 5.21)];
        merge_missing(&conn, &RATE_MERGE, &first).unwrap();
        let before = table_count(&conn, "interest_rates").unwrap();
        assert_eq!(merge_missing(&conn, &RATE_MERGE, &second).unwrap(), 2);
        assert_eq!(table_count(&conn, "interest_rates").unwrap(), before + 2);
    }

    #[test]
    fn overlapping_batch_inserts_only_the_new_keys() {
        let conn = test_conn();
        merge_missing(&conn, &RATE_MERGE, &[rate_row("2023-08-01", 5.19)]).unwrap();
        let batch = vec![rate_row("2023-08-01", 9.99), rate_row("2023-08-02", 5.20)];
        assert_eq!(merge_missing(&conn, &RATE_MERGE, &batch).unwrap(), 1);
        // the pre-existing key kept its original value
        let rate: f64 = conn
            .query_row(
                "SELECT rate FROM interest_rates WHERE date = '2023-08-01'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rate, 5.19);
    }

    #[test]
    fn composite_key_merge_is_idempotent() {
        let conn = test_conn();
        let batch = vec![vec![
            Value::Integer(1),
            Value::Text("2023-08-01".to_string()),
            Value::Integer(1200),
        ]];
        assert_eq!(merge_missing(&conn, &PRICE_MERGE, &batch).unwrap(), 1);
        assert_eq!(merge_missing(&conn, &PRICE_MERGE, &batch).unwrap(), 0);
        // same property on a new date is a new natural key
        let next_day = vec![vec![
            Value::Integer(1),
            Value::Text("2023-08-02".to_string()),
            Value::Integer(1200),
        ]];
        assert_eq!(merge_missing(&conn, &PRICE_MERGE, &next_day).unwrap(), 1);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let conn = test_conn();
        assert_eq!(merge_missing(&conn, &RATE_MERGE, &[]).unwrap(), 0);
    }

    #[test]
    fn ragged_row_is_rejected_before_touching_the_store() {
        let conn = test_conn();
        let bad = vec![vec![Value::Text("2023-08-01".to_string())]];
        assert!(matches!(
            merge_missing(&conn, &RATE_MERGE, &bad),
            Err(EtlError::MalformedData(_))
        ));
        assert_eq!(table_count(&conn, "interest_rates").unwrap(), 0);
    }

    #[test]
    fn max_date_is_none_on_an_empty_table() {
        let conn = test_conn();
        assert_eq!(max_date(&conn, "interest_rates", "date").unwrap(), None);
    }

    #[test]
    fn refresh_mart_runs_an_arbitrary_script() {
        let conn = test_conn();
        refresh_mart(
            &conn,
            "CREATE TABLE mart_rent (prop_id INTEGER, price INTEGER);
             INSERT INTO mart_rent VALUES (1, 1200);",
        )
        .unwrap();
        assert_eq!(table_count(&conn, "mart_rent").unwrap(), 1);
    }

    #[test]
    fn refresh_mart_propagates_failure() {
        let conn = test_conn();
        assert!(matches!(
            refresh_mart(&conn, "INSERT INTO does_not_exist VALUES (1)"),
            Err(EtlError::Store(_))
        ));
    }
}
