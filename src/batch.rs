// Batch sheets - write or edit many records through an external editor
//
// A sheet is CSV text with `#` comment lines. Write sheets carry a header
// of the columns that still need values; edit sheets carry every column
// including `id`.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::process::Command;

use crate::categories::CategoryBook;
use crate::db::{Record, RECORD_COLUMNS};
use crate::parser::{parse_category, parse_currency, parse_date, parse_expression};

pub const MARKER: &str = "# Now add your records in CSV format:";

/// Columns a user supplies when writing a record
pub const WRITABLE_COLUMNS: [&str; 5] = ["date", "amount", "currency", "description", "category"];

const RULE: &str = "# -----------------------------------------------------------------";

/// Values shared by every row of a write sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedFields {
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl FixedFields {
    pub fn is_fixed(&self, column: &str) -> bool {
        match column {
            "date" => self.date.is_some(),
            "amount" => self.amount.is_some(),
            "currency" => self.currency.is_some(),
            "description" => self.description.is_some(),
            "category" => self.category.is_some(),
            _ => false,
        }
    }

    /// Columns left for the sheet, in record order
    pub fn open_columns(&self) -> Vec<&'static str> {
        WRITABLE_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.is_fixed(c))
            .collect()
    }

    /// Overwrite the fields of `record` that are fixed here.
    pub fn apply_to(&self, record: &mut Record) {
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(amount) = self.amount {
            record.amount = amount;
        }
        if let Some(currency) = &self.currency {
            record.currency = currency.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(category) = &self.category {
            record.category = category.clone();
        }
    }

    fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(date) = self.date {
            lines.push(format!("date = {}", date));
        }
        if let Some(amount) = self.amount {
            lines.push(format!("amount = {:.2}", amount));
        }
        if let Some(currency) = &self.currency {
            lines.push(format!("currency = {}", currency));
        }
        if let Some(description) = &self.description {
            lines.push(format!("description = {}", description));
        }
        if let Some(category) = &self.category {
            lines.push(format!("category = {}", category));
        }
        lines
    }
}

/// Reference values for resolving sheet cells
#[derive(Debug, Clone, Copy)]
pub struct SheetContext<'a> {
    pub today: NaiveDate,
    pub default_currency: &'a str,
    pub categories: &'a CategoryBook,
}

// ============================================================================
// RENDERING
// ============================================================================

pub fn render_write_sheet(fixed: &FixedFields) -> String {
    let mut sheet = String::new();
    sheet.push_str(RULE);
    sheet.push('\n');
    let described = fixed.describe();
    if described.is_empty() {
        sheet.push_str("# No fixed fields.\n");
    } else {
        sheet.push_str("# Fixed fields, applied to every row:\n");
        for line in described {
            sheet.push_str(&format!("#   {}\n", line));
        }
    }
    sheet.push_str("# Amounts accept arithmetic (12+3 or =12+3). Empty currency uses the default.\n");
    sheet.push_str(RULE);
    sheet.push('\n');
    sheet.push_str(MARKER);
    sheet.push('\n');
    sheet.push_str(&fixed.open_columns().join(", "));
    sheet.push('\n');
    sheet
}

pub fn render_edit_sheet(records: &[Record]) -> Result<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(RECORD_COLUMNS)?;
    for record in records {
        let id = record.id.map(|id| id.to_string()).unwrap_or_default();
        writer.write_record([
            id,
            record.date.to_string(),
            format!("{:.2}", record.amount),
            record.currency.clone(),
            record.description.clone(),
            record.category.clone(),
        ])?;
    }
    let body = String::from_utf8(writer.into_inner().map_err(|e| anyhow!("{}", e))?)?;

    Ok(format!(
        "{rule}\n# Do not modify id!\n# However, for performance, you can delete the line you won't edit.\n{rule}\n{body}",
        rule = RULE,
        body = body
    ))
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a filled write sheet into new records.
pub fn parse_write_sheet(text: &str, fixed: &FixedFields, ctx: &SheetContext<'_>) -> Result<Vec<Record>> {
    let (_, body) = text
        .split_once(MARKER)
        .context("The sheet marker line was removed")?;
    parse_rows(body, fixed, ctx, false)
}

/// Parse an edit sheet; every row must keep its id.
pub fn parse_edit_sheet(text: &str, ctx: &SheetContext<'_>) -> Result<Vec<Record>> {
    parse_rows(text, &FixedFields::default(), ctx, true)
}

/// Parse a plain CSV file of records. An `id` column is optional.
pub fn parse_import(text: &str, ctx: &SheetContext<'_>) -> Result<Vec<Record>> {
    parse_rows(text, &FixedFields::default(), ctx, false)
}

fn parse_rows(
    text: &str,
    fixed: &FixedFields,
    ctx: &SheetContext<'_>,
    require_id: bool,
) -> Result<Vec<Record>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(skip_comment_header(text).as_bytes());

    let headers = reader.headers().context("Failed to read the sheet header")?.clone();
    let index = header_index(&headers)?;

    let mut missing: Vec<&str> = fixed
        .open_columns()
        .into_iter()
        .filter(|c| !index.contains_key(*c))
        .collect();
    if require_id && !index.contains_key("id") {
        missing.insert(0, "id");
    }
    if !missing.is_empty() {
        bail!("Sheet header is missing column(s): {}", missing.join(", "));
    }

    let mut records = Vec::new();
    for (row_number, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed CSV on data row {}", row_number + 1))?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        let record = parse_row(&row, &index, fixed, ctx)
            .with_context(|| format!("Data row {}: {:?}", row_number + 1, row.iter().collect::<Vec<_>>()))?;
        records.push(record);
    }

    tracing::debug!(rows = records.len(), "sheet parsed");
    Ok(records)
}

/// Drop the `#` and blank lines above the CSV header. Data rows are kept
/// as typed, so a description may start with `#`.
fn skip_comment_header(text: &str) -> &str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_text = line.trim();
        if !line_text.is_empty() && !line_text.starts_with('#') {
            break;
        }
        offset += line.len();
    }
    &text[offset..]
}

fn header_index(headers: &StringRecord) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::new();
    for (i, name) in headers.iter().enumerate() {
        let name = name.to_lowercase();
        if !RECORD_COLUMNS.contains(&name.as_str()) {
            bail!("Unknown sheet column '{}'", name);
        }
        if index.insert(name.clone(), i).is_some() {
            bail!("Sheet column '{}' appears twice", name);
        }
    }
    Ok(index)
}

fn parse_row(
    row: &StringRecord,
    index: &HashMap<String, usize>,
    fixed: &FixedFields,
    ctx: &SheetContext<'_>,
) -> Result<Record> {
    let cell = |column: &str| index.get(column).and_then(|i| row.get(*i));

    let id = match cell("id").filter(|c| !c.is_empty()) {
        Some(text) => Some(
            text.parse::<i64>()
                .with_context(|| format!("'{}' is not a valid id", text))?,
        ),
        None => None,
    };

    let date = match fixed.date {
        Some(date) => date,
        None => sheet_date(cell("date").unwrap_or_default(), ctx.today)?,
    };

    let amount = match fixed.amount {
        Some(amount) => amount,
        None => sheet_amount(cell("amount").unwrap_or_default())?,
    };

    let currency = match &fixed.currency {
        Some(currency) => currency.clone(),
        None => match cell("currency").filter(|c| !c.is_empty()) {
            Some(text) => parse_currency(text)?,
            None => parse_currency(ctx.default_currency)?,
        },
    };

    let description = match &fixed.description {
        Some(description) => description.clone(),
        None => cell("description").unwrap_or_default().to_string(),
    };

    let category = match &fixed.category {
        Some(category) => category.clone(),
        None => {
            let text = cell("category").unwrap_or_default();
            if text.is_empty() {
                bail!("category is empty");
            }
            parse_category(ctx.categories, text)?
        }
    };

    Ok(Record {
        id,
        date,
        amount,
        currency,
        description,
        category,
    })
}

/// ISO dates as rendered in edit sheets, otherwise the date expression grammar.
fn sheet_date(text: &str, today: NaiveDate) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    Ok(parse_date(text, today)?)
}

/// Cells are arithmetic even without the `=` sigil.
fn sheet_amount(text: &str) -> Result<f64> {
    let expression = if text.contains('=') {
        text.to_string()
    } else {
        format!("={}", text)
    };
    Ok(parse_expression(&expression, 0.0)?)
}

// ============================================================================
// EDITOR
// ============================================================================

/// Write `contents` to a temp file, open it in `editor`, return the saved text.
pub fn edit_in_editor(editor: &str, contents: &str, today: NaiveDate) -> Result<String> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("acc_sheet_{}_", today))
        .suffix(".csv")
        .tempfile()
        .context("Failed to create sheet file")?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .with_context(|| format!("Failed to write {}", file.path().display()))?;

    let mut words = shell_words::split(editor).context("Editor command is not valid shell syntax")?;
    if words.is_empty() {
        bail!("No editor configured");
    }
    let program = words.remove(0);

    tracing::info!(editor = %program, path = %file.path().display(), "launching editor");
    let status = Command::new(&program)
        .args(&words)
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to launch editor '{}'", program))?;
    if !status.success() {
        bail!("Editor exited with {}", status);
    }

    // Editors may replace the file, so read it back by path.
    fs::read_to_string(file.path()).with_context(|| format!("Failed to read back {}", file.path().display()))
}
