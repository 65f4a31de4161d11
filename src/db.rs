use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::query::{Filter, Operand, WhereClause};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One money movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// None until the row is stored
    #[serde(default)]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub category: String,
}

impl Record {
    pub fn new(
        date: NaiveDate,
        amount: f64,
        currency: &str,
        description: &str,
        category: &str,
    ) -> Self {
        Self {
            id: None,
            date,
            amount,
            currency: currency.to_string(),
            description: description.to_string(),
            category: category.to_string(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Record {
            id: row.get(0)?,
            date: row.get(1)?,
            amount: row.get(2)?,
            currency: row.get(3)?,
            description: row.get(4)?,
            category: row.get(5)?,
        })
    }

    /// Multi-line form shown before commits
    pub fn pretty(&self) -> String {
        let id = self
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "new".to_string());
        format!(
            "Record(\n\tid={},\n\tdate={},\n\tamount={:.2},\n\tcurrency={},\n\tdescription={:?},\n\tcategory={}\n)",
            id, self.date, self.amount, self.currency, self.description, self.category
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "#{} ", id)?,
            None => write!(f, "#- ")?,
        }
        write!(
            f,
            "{} {:.2} {} {:?} {}",
            self.date, self.amount, self.currency, self.description, self.category
        )
    }
}

/// A currency exchange the user made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    #[serde(default)]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub base_currency: String,
    pub base_amount: f64,
    pub target_currency: String,
    pub target_amount: f64,
    pub description: String,
}

impl Conversion {
    /// Units of target received per unit of base
    pub fn rate(&self) -> Option<f64> {
        if self.base_amount == 0.0 {
            None
        } else {
            Some(self.target_amount / self.base_amount)
        }
    }
}

/// Generic result of a passthrough SELECT
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Records(Vec<Record>),
    Table(QueryTable),
}

impl ReadResult {
    pub fn len(&self) -> usize {
        match self {
            ReadResult::Records(records) => records.len(),
            ReadResult::Table(table) => table.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub const RECORD_COLUMNS: [&str; 6] = ["id", "date", "amount", "currency", "description", "category"];

pub(crate) const SELECT_RECORD: &str = "SELECT id, date, amount, currency, description, category FROM records";

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// ============================================================================
// SETUP
// ============================================================================

/// Open (or create) the database at `path`, ready for use.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    register_functions(&conn)?;
    setup_database(&conn)?;

    tracing::debug!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    register_functions(&conn)?;
    setup_database(&conn)?;
    Ok(conn)
}

/// SQL `regexp(pattern, text)`, which backs `text REGEXP pattern`.
pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let text: Option<String> = ctx.get(1)?;
            Ok(text.map(|t| regex.is_match(&t)).unwrap_or(false))
        },
    )
    .context("Failed to register regexp function")?;
    Ok(())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Records
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL CHECK (length(currency) = 3),
            description TEXT NOT NULL,
            category TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Conversions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            base_currency TEXT NOT NULL,
            base_amount REAL NOT NULL,
            target_currency TEXT NOT NULL,
            target_amount REAL NOT NULL,
            description TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_date ON records(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_category ON records(category, currency)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// RECORDS
// ============================================================================

pub fn insert_record(conn: &Connection, record: &Record) -> Result<i64> {
    conn.execute(
        "INSERT INTO records (date, amount, currency, description, category)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.date,
            round_cents(record.amount),
            record.currency,
            record.description,
            record.category,
        ],
    )
    .context("Failed to insert record")?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, category = %record.category, "record written");
    Ok(id)
}

/// Insert many records in one transaction. Rows carrying an id replace
/// the stored row with that id.
pub fn insert_records(conn: &Connection, records: &[Record]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO records (id, date, amount, currency, description, category)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                amount = excluded.amount,
                currency = excluded.currency,
                description = excluded.description,
                category = excluded.category",
        )?;

        for record in records {
            stmt.execute(params![
                record.id,
                record.date,
                round_cents(record.amount),
                record.currency,
                record.description,
                record.category,
            ])
            .with_context(|| format!("Failed to store {}", record))?;
        }
    }
    tx.commit()?;

    tracing::info!(count = records.len(), "records stored");
    Ok(records.len())
}

pub fn get_record(conn: &Connection, id: i64) -> Result<Option<Record>> {
    let record = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_RECORD),
            [id],
            Record::from_row,
        )
        .optional()?;
    Ok(record)
}

/// Overwrite every column of a stored record. Returns false if the id is gone.
pub fn update_record(conn: &Connection, record: &Record) -> Result<bool> {
    let Some(id) = record.id else {
        bail!("Cannot update a record without an id");
    };

    let changed = conn.execute(
        "UPDATE records
         SET date = ?1, amount = ?2, currency = ?3, description = ?4, category = ?5
         WHERE id = ?6",
        params![
            record.date,
            round_cents(record.amount),
            record.currency,
            record.description,
            record.category,
            id,
        ],
    )?;

    tracing::info!(id, changed, "record updated");
    Ok(changed > 0)
}

pub fn delete_record(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM records WHERE id = ?1", [id])?;
    tracing::info!(id, changed, "record deleted");
    Ok(changed > 0)
}

/// Records by id list, or by inclusive range when `as_range` and two ids are given.
pub fn records_by_ids(conn: &Connection, ids: &[i64], as_range: bool) -> Result<Vec<Record>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let records = if as_range && ids.len() == 2 {
        let (low, high) = (ids[0].min(ids[1]), ids[0].max(ids[1]));
        let mut stmt = conn.prepare(&format!(
            "{} WHERE id BETWEEN ?1 AND ?2 ORDER BY id",
            SELECT_RECORD
        ))?;
        let rows = stmt.query_map([low, high], Record::from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    } else {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "{} WHERE id IN ({}) ORDER BY id",
            SELECT_RECORD, placeholders
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), Record::from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    Ok(records)
}

/// Apply a parsed filter.
///
/// Predicate filters get `date <= until`, newest id first, and `limit`.
/// A raw SELECT runs untouched.
pub fn read_records(
    conn: &Connection,
    filter: &Filter,
    limit: Option<usize>,
    until: Option<NaiveDate>,
) -> Result<ReadResult> {
    let predicates = match filter {
        Filter::RawSelect(sql) => return Ok(ReadResult::Table(run_select(conn, sql)?)),
        Filter::Where(predicates) => predicates,
    };

    let mut clause = WhereClause::from_predicates(predicates);
    if let Some(until) = until {
        clause = clause.and("date <= ?", vec![Operand::Text(until.to_string())]);
    }

    let mut sql = format!("{} WHERE {} ORDER BY id DESC", SELECT_RECORD, clause.sql);
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    tracing::debug!(%sql, filter = %filter, "reading records");

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(clause.params.iter()), Record::from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to run filter")?;

    Ok(ReadResult::Records(records))
}

/// Run a single read-only statement and stringify every cell.
pub fn run_select(conn: &Connection, sql: &str) -> Result<QueryTable> {
    let mut stmt = conn
        .prepare(sql)
        .with_context(|| format!("Failed to prepare '{}'", sql))?;
    if !stmt.readonly() {
        bail!("Only read-only statements can be passed through, got '{}'", sql);
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(cell_to_string(row.get_ref(i)?));
        }
        rows.push(cells);
    }

    tracing::debug!(rows = rows.len(), "passthrough query done");
    Ok(QueryTable { columns, rows })
}

fn cell_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

pub fn distinct_currencies(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT currency FROM records ORDER BY currency")?;
    let currencies = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(currencies)
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// CONVERSIONS
// ============================================================================

pub fn insert_conversion(conn: &Connection, conversion: &Conversion) -> Result<i64> {
    conn.execute(
        "INSERT INTO conversions (
            date, base_currency, base_amount, target_currency, target_amount, description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            conversion.date,
            conversion.base_currency,
            round_cents(conversion.base_amount),
            conversion.target_currency,
            round_cents(conversion.target_amount),
            conversion.description,
        ],
    )
    .context("Failed to insert conversion")?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, "conversion written");
    Ok(id)
}

pub fn get_conversions(conn: &Connection) -> Result<Vec<Conversion>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, base_currency, base_amount, target_currency, target_amount, description
         FROM conversions
         ORDER BY date DESC, id DESC",
    )?;

    let conversions = stmt
        .query_map([], |row| {
            Ok(Conversion {
                id: row.get(0)?,
                date: row.get(1)?,
                base_currency: row.get(2)?,
                base_amount: row.get(3)?,
                target_currency: row.get(4)?,
                target_amount: row.get(5)?,
                description: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(conversions)
}
