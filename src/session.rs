// Session - open database, config and category book, plus every user operation
//
// The shell and the one-shot CLI both drive a Session. Operations that change
// data preview the result and commit only after an explicit yes.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

use crate::batch::{
    edit_in_editor, parse_edit_sheet, parse_import, parse_write_sheet, render_edit_sheet,
    render_write_sheet, FixedFields, SheetContext, WRITABLE_COLUMNS,
};
use crate::categories::CategoryBook;
use crate::config::Config;
use crate::db::{
    delete_record, get_conversions, insert_conversion, insert_record, insert_records,
    open_database, read_records, records_by_ids, update_record, Conversion, ReadResult, Record,
};
use crate::parser::{parse_column, parse_currency, parse_filter, Period, COLUMN_KEYBINDS};
use crate::plot::{self, Chart};
use crate::prompt::{
    ask, confirm, prompt_category, prompt_columns, prompt_currency, prompt_date,
    prompt_double_currency, prompt_field, prompt_fixed_fields, prompt_record, prompt_record_by_id,
    prompt_text, LineReader,
};
use crate::report;

/// Opens a sheet for the user and returns the saved text.
pub trait SheetEditor {
    fn edit(&mut self, contents: &str) -> Result<String>;
}

/// The configured editor program on a temp file.
pub struct ExternalEditor {
    pub command: String,
    pub today: NaiveDate,
}

impl SheetEditor for ExternalEditor {
    fn edit(&mut self, contents: &str) -> Result<String> {
        edit_in_editor(&self.command, contents, self.today)
    }
}

impl<F> SheetEditor for F
where
    F: FnMut(&str) -> Result<String>,
{
    fn edit(&mut self, contents: &str) -> Result<String> {
        self(contents)
    }
}

pub struct Session {
    pub conn: Connection,
    pub config: Config,
    pub categories: CategoryBook,
    /// Period the plot commands work on.
    pub period: Period,
    pub today: NaiveDate,
    pub editor: Box<dyn SheetEditor>,
    /// Print charts as text even when the terminal UI is available.
    pub text_charts: bool,
}

impl Session {
    pub fn open(config: Config, today: NaiveDate) -> Result<Self> {
        let conn = open_database(&config.database)?;
        let categories = if config.categories.exists() {
            CategoryBook::load(&config.categories)?
        } else {
            tracing::warn!(
                path = %config.categories.display(),
                "category file missing, every category will be rejected"
            );
            CategoryBook::default()
        };
        tracing::info!(categories = categories.len(), "session opened");
        Ok(Self::new(conn, config, categories, today))
    }

    pub fn new(conn: Connection, config: Config, categories: CategoryBook, today: NaiveDate) -> Self {
        let editor = ExternalEditor {
            command: config.editor_command(),
            today,
        };
        Self {
            conn,
            config,
            categories,
            period: Period::from_date(today),
            today,
            editor: Box::new(editor),
            text_charts: false,
        }
    }

    pub fn sheet_context(&self) -> SheetContext<'_> {
        SheetContext {
            today: self.today,
            default_currency: &self.config.default_currency,
            categories: &self.categories,
        }
    }

    // ========================================================================
    // RECORDS
    // ========================================================================

    /// `w`: one record, field by field.
    pub fn write(&mut self, reader: &mut dyn LineReader) -> Result<Option<i64>> {
        let record = prompt_record(reader, &self.sheet_context())?;
        println!("{}", record.pretty());
        if !confirm(reader, "Confirm your commit")? {
            println!("Change uncommitted.");
            return Ok(None);
        }
        let id = insert_record(&self.conn, &record)?;
        println!("Record written with id {}.", id);
        Ok(Some(id))
    }

    /// `wl`: many records through a write sheet.
    pub fn write_list(&mut self, reader: &mut dyn LineReader) -> Result<usize> {
        let ctx = SheetContext {
            today: self.today,
            default_currency: &self.config.default_currency,
            categories: &self.categories,
        };
        let fixed = prompt_fixed_fields(reader, &ctx)?;
        let sheet = render_write_sheet(&fixed);
        let filled = self.editor.edit(&sheet)?;
        let records = parse_write_sheet(&filled, &fixed, &ctx)
            .context("Could not parse the sheet, review its content and write it again")?;
        self.commit_records(reader, &records)
    }

    /// `e`: change chosen columns of one record.
    pub fn edit(&mut self, reader: &mut dyn LineReader, id: Option<i64>, columns: Option<&str>) -> Result<bool> {
        let mut record = prompt_record_by_id(reader, &self.conn, id)?;
        println!("{}", record.pretty());

        let columns = match columns {
            Some(text) => text
                .split_whitespace()
                .map(|word| parse_column(word, &WRITABLE_COLUMNS, &COLUMN_KEYBINDS))
                .collect::<Result<Vec<_>, _>>()?,
            None => prompt_columns(reader, &WRITABLE_COLUMNS)?,
        };
        if columns.is_empty() {
            println!("Nothing to edit.");
            return Ok(false);
        }

        let ctx = self.sheet_context();
        let mut fields = FixedFields::default();
        for column in &columns {
            prompt_field(reader, column, &ctx, &mut fields)?;
        }
        fields.apply_to(&mut record);

        println!("{}", record.pretty());
        if !confirm(reader, "Confirm your commit")? {
            println!("Change uncommitted.");
            return Ok(false);
        }
        update_record(&self.conn, &record)?;
        println!("Record committed.");
        Ok(true)
    }

    /// `el`: edit records by id list, or by inclusive range of two ids.
    pub fn edit_list(&mut self, reader: &mut dyn LineReader, ids: &[i64], as_range: bool) -> Result<usize> {
        let records = records_by_ids(&self.conn, ids, as_range)?;
        if records.is_empty() {
            println!("No records found.");
            return Ok(0);
        }

        let sheet = render_edit_sheet(&records)?;
        let edited_text = self.editor.edit(&sheet)?;
        let edited = parse_edit_sheet(&edited_text, &self.sheet_context())
            .context("Could not parse the sheet, review its content and write it again")?;

        for record in &edited {
            if !records.iter().any(|r| r.id == record.id) {
                bail!(
                    "Row with id {:?} was not part of the sheet; ids must not be modified",
                    record.id
                );
            }
        }

        let changed: Vec<Record> = edited
            .into_iter()
            .filter(|e| !records.contains(e))
            .collect();
        if changed.is_empty() {
            println!("No changes.");
            return Ok(0);
        }
        self.commit_records(reader, &changed)
    }

    fn commit_records(&self, reader: &mut dyn LineReader, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            println!("No records in the sheet.");
            return Ok(0);
        }
        print!("{}", report::records_table(records));
        if !confirm(reader, "Confirm your commit")? {
            println!("Change uncommitted.");
            return Ok(0);
        }
        let count = insert_records(&self.conn, records)?;
        println!("{} records committed.", count);
        Ok(count)
    }

    /// `d`: delete one record after showing it.
    pub fn delete(&mut self, reader: &mut dyn LineReader, id: Option<i64>, assume_yes: bool) -> Result<bool> {
        let record = prompt_record_by_id(reader, &self.conn, id)?;
        println!("\nWarning. You can lose data permanently.\n");
        println!("{}", record.pretty());

        if !assume_yes && !confirm(reader, "Confirm your commit")? {
            println!("Change uncommitted.");
            return Ok(false);
        }
        let Some(id) = record.id else {
            bail!("Stored record has no id");
        };
        delete_record(&self.conn, id)?;
        println!("Record {} deleted.", id);
        Ok(true)
    }

    /// Filtered read; predicate filters are capped at `limit` and, unless
    /// `all_dates`, at today.
    pub fn query(&self, filter: &str, limit: Option<usize>, all_dates: bool) -> Result<ReadResult> {
        let filter = parse_filter(filter)?;
        let limit = limit.unwrap_or(self.config.read_limit);
        let until = if all_dates { None } else { Some(self.today) };
        read_records(&self.conn, &filter, Some(limit), until)
    }

    /// `r`: prompt for a filter when none is given and print the rows.
    pub fn read(&self, reader: &mut dyn LineReader, filter: Option<&str>, limit: Option<usize>) -> Result<ReadResult> {
        let filter = match filter {
            Some(text) => text.to_string(),
            None => ask(reader, "Filter (empty for all): ", |s| {
                parse_filter(s).map(|_| s.to_string())
            })?,
        };
        let result = self.query(&filter, limit, false)?;
        if result.is_empty() {
            println!("No records.");
        } else {
            print!("{}", report::read_result(&result));
        }
        Ok(result)
    }

    // ========================================================================
    // CONVERSIONS
    // ========================================================================

    /// `cv`: record a currency exchange.
    pub fn write_conversion(&mut self, reader: &mut dyn LineReader) -> Result<Option<i64>> {
        let date = prompt_date(reader, self.today)?;
        println!("Base:");
        let (base_amount, base_currency) = prompt_double_currency(reader, &self.config.default_currency, 0.0)?;
        println!("Target:");
        let (target_amount, target_currency) =
            prompt_double_currency(reader, &self.config.default_currency, 0.0)?;
        let description = prompt_text(reader, "Description: ")?;

        let conversion = Conversion {
            id: None,
            date,
            base_currency,
            base_amount,
            target_currency,
            target_amount,
            description,
        };
        print!("{}", report::conversions_table(std::slice::from_ref(&conversion)));
        if !confirm(reader, "Confirm your commit")? {
            println!("Change uncommitted.");
            return Ok(None);
        }
        let id = insert_conversion(&self.conn, &conversion)?;
        println!("Conversion written with id {}.", id);
        Ok(Some(id))
    }

    /// `rc`
    pub fn read_conversions(&self) -> Result<Vec<Conversion>> {
        let conversions = get_conversions(&self.conn)?;
        if conversions.is_empty() {
            println!("No conversions.");
        } else {
            print!("{}", report::conversions_table(&conversions));
        }
        Ok(conversions)
    }

    /// Bulk load a CSV file of records, no confirmation.
    pub fn import(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let records = parse_import(&text, &self.sheet_context())
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let count = insert_records(&self.conn, &records)?;
        tracing::info!(count, path = %path.display(), "imported records");
        Ok(count)
    }

    // ========================================================================
    // PLOTS
    // ========================================================================

    pub fn categories_chart(&self) -> Result<Chart> {
        let breakdown = plot::categories_per_period(&self.conn, self.period, &self.config)?;
        Ok(Chart::Breakdown(breakdown))
    }

    pub fn expenses_chart(&self) -> Result<Chart> {
        let series = plot::expenses_series(&self.conn, &self.config.income_categories, self.period)?;
        Ok(Chart::Monthly {
            title: "Expenses".to_string(),
            series,
            focus: self.period,
        })
    }

    pub fn category_chart(&self, category: &str) -> Result<Chart> {
        let series = plot::category_series(&self.conn, category, self.period)?;
        Ok(Chart::Monthly {
            title: category.to_string(),
            series,
            focus: self.period,
        })
    }

    pub fn daily_chart(&self, currency: &str) -> Result<Chart> {
        let currency = parse_currency(currency)?;
        let months = plot::daily_series(&self.conn, &currency, self.period, &self.config.income_categories)?;
        Ok(Chart::Daily {
            currency,
            months,
            today: self.today,
        })
    }

    /// p3 with the category asked when not given.
    pub fn prompt_category_chart(&self, reader: &mut dyn LineReader, category: Option<&str>) -> Result<Chart> {
        let category = match category {
            Some(c) => c.to_uppercase(),
            None => prompt_category(reader, &self.categories)?,
        };
        self.category_chart(&category)
    }

    /// p4 with the currency asked when not given.
    pub fn prompt_daily_chart(&self, reader: &mut dyn LineReader, currency: Option<&str>) -> Result<Chart> {
        let currency = match currency {
            Some(c) => c.to_string(),
            None => prompt_currency(reader)?,
        };
        self.daily_chart(&currency)
    }

    /// Terminal chart window, or text when the UI is unavailable.
    pub fn show(&self, chart: Chart) -> Result<()> {
        #[cfg(feature = "tui")]
        {
            if !self.text_charts {
                let mut app = crate::ui::App::new(chart);
                return crate::ui::run_ui(&mut app, &self.conn);
            }
        }
        print!("{}", report::chart_text(&chart));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_records, get_record, open_in_memory};
    use crate::prompt::{is_aborted, ScriptedReader};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session() -> Session {
        let categories = CategoryBook::from_json(
            r#"[
                {"key": "f", "shortname": "FOOD", "description": "Groceries"},
                {"key": "t", "shortname": "TRAVEL", "description": "Trips"}
            ]"#,
        )
        .unwrap();
        let mut session = Session::new(open_in_memory().unwrap(), Config::default(), categories, ymd(2025, 9, 10));
        session.text_charts = true;
        session
    }

    fn seed(session: &Session) -> Vec<i64> {
        [
            Record::new(ymd(2025, 9, 1), 10.0, "EUR", "Bakery", "FOOD"),
            Record::new(ymd(2025, 9, 2), 25.0, "EUR", "Train", "TRAVEL"),
            Record::new(ymd(2025, 9, 30), 7.0, "EUR", "Future lunch", "FOOD"),
        ]
        .iter()
        .map(|r| insert_record(&session.conn, r).unwrap())
        .collect()
    }

    #[test]
    fn test_write_commits_on_yes() {
        let mut session = session();
        let mut reader = ScriptedReader::new(["0", "=4*3", "Cheese", "f", "y"]);
        let id = session.write(&mut reader).unwrap().unwrap();

        let record = get_record(&session.conn, id).unwrap().unwrap();
        assert_eq!(record.amount, 12.0);
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.category, "FOOD");
        assert_eq!(record.date, ymd(2025, 9, 10));

        println!("✅ Write test PASSED");
    }

    #[test]
    fn test_write_declined_or_aborted() {
        let mut session = session();
        let mut reader = ScriptedReader::new(["0", "3", "Tea", "f", "n"]);
        assert_eq!(session.write(&mut reader).unwrap(), None);

        let mut reader = ScriptedReader::new(["0", "3"]);
        assert!(is_aborted(&session.write(&mut reader).unwrap_err()));
        assert_eq!(count_records(&session.conn).unwrap(), 0);
    }

    #[test]
    fn test_write_list_through_sheet() {
        let mut session = session();
        session.editor = Box::new(|sheet: &str| -> Result<String> {
            assert!(sheet.contains("category = FOOD"));
            Ok(format!("{}1, 5+5, , Market\n2, 3, usd, Coffee\n", sheet))
        });

        let mut reader = ScriptedReader::new(["c", "f", "yes"]);
        assert_eq!(session.write_list(&mut reader).unwrap(), 2);

        let result = session.query("cur usd", None, true).unwrap();
        let ReadResult::Records(records) = result else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, ymd(2025, 9, 2));
        assert_eq!(records[0].category, "FOOD");
    }

    #[test]
    fn test_edit_columns() {
        let mut session = session();
        let ids = seed(&session);

        let mut reader = ScriptedReader::new(Vec::<String>::new());
        assert!(session.edit(&mut reader, Some(ids[0]), Some("zz")).is_err());

        let mut reader = ScriptedReader::new(["=2*10", "t", "y"]);
        assert!(session.edit(&mut reader, Some(ids[0]), Some("am cat")).unwrap());
        let record = get_record(&session.conn, ids[0]).unwrap().unwrap();
        assert_eq!(record.amount, 20.0);
        assert_eq!(record.category, "TRAVEL");
        assert_eq!(record.description, "Bakery");
    }

    #[test]
    fn test_edit_list_upserts_changed_rows() {
        let mut session = session();
        let ids = seed(&session);
        session.editor = Box::new(|sheet: &str| -> Result<String> { Ok(sheet.replace("Train", "Night train")) });

        let mut reader = ScriptedReader::new(["y"]);
        let changed = session.edit_list(&mut reader, &[ids[0], ids[2]], true).unwrap();
        assert_eq!(changed, 1);
        let record = get_record(&session.conn, ids[1]).unwrap().unwrap();
        assert_eq!(record.description, "Night train");
    }

    #[test]
    fn test_edit_list_rejects_foreign_id() {
        let mut session = session();
        let ids = seed(&session);
        let foreign = ids[2] + 100;
        session.editor = Box::new(move |sheet: &str| -> Result<String> {
            Ok(format!("{}{},2025-09-05,1.00,EUR,Ghost,FOOD\n", sheet, foreign))
        });

        let mut reader = ScriptedReader::new(["y"]);
        assert!(session.edit_list(&mut reader, &[ids[0]], false).is_err());
        assert_eq!(count_records(&session.conn).unwrap(), 3);
    }

    #[test]
    fn test_delete() {
        let mut session = session();
        let ids = seed(&session);

        let mut reader = ScriptedReader::new([""]);
        assert!(!session.delete(&mut reader, Some(ids[0]), false).unwrap());

        let mut reader = ScriptedReader::new([ids[0].to_string(), "y".to_string()]);
        assert!(session.delete(&mut reader, None, false).unwrap());
        assert!(get_record(&session.conn, ids[0]).unwrap().is_none());

        let mut reader = ScriptedReader::new(Vec::<String>::new());
        assert!(session.delete(&mut reader, Some(ids[1]), true).unwrap());
        assert_eq!(count_records(&session.conn).unwrap(), 1);
    }

    #[test]
    fn test_query_stops_at_today() {
        let session = session();
        seed(&session);

        assert_eq!(session.query("cat food", None, false).unwrap().len(), 1);
        assert_eq!(session.query("cat food", None, true).unwrap().len(), 2);
        assert_eq!(session.query("", Some(1), true).unwrap().len(), 1);
        assert!(session.query("amount between 1", None, false).is_err());
    }

    #[test]
    fn test_read_prompts_for_filter() {
        let session = session();
        seed(&session);
        let mut reader = ScriptedReader::new(["amount between", "amount between 5 and 15"]);
        let result = session.read(&mut reader, None, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(reader.prompts.len(), 2);
    }

    #[test]
    fn test_conversion_flow() {
        let mut session = session();
        let mut reader = ScriptedReader::new(["0", "100", "=108.5 usd", "Cash", "y"]);
        session.write_conversion(&mut reader).unwrap().unwrap();

        let conversions = session.read_conversions().unwrap();
        assert_eq!(conversions.len(), 1);
        assert_eq!(conversions[0].base_currency, "EUR");
        assert_eq!(conversions[0].target_currency, "USD");
        assert_eq!(conversions[0].rate(), Some(1.085));
    }

    #[test]
    fn test_import() {
        let mut session = session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        fs::write(
            &path,
            "date,amount,currency,description,category\n2025-08-01,12.5,EUR,Books,food\n2025-08-02,3,,Bus,t\n",
        )
        .unwrap();

        assert!(session.import(&path).is_err());
        assert_eq!(count_records(&session.conn).unwrap(), 0);

        fs::write(
            &path,
            "date,amount,currency,description,category\n2025-08-01,12.5,EUR,Books,food\n2025-08-02,3,,Bus,travel\n",
        )
        .unwrap();
        assert_eq!(session.import(&path).unwrap(), 2);
    }

    #[test]
    fn test_charts() {
        let mut session = session();
        seed(&session);
        session.period = Period::new(2025, 9).unwrap();

        let Chart::Breakdown(breakdown) = session.categories_chart().unwrap() else {
            panic!("expected breakdown");
        };
        assert_eq!(breakdown.currencies[0].total, 42.0);

        assert!(session.daily_chart("euro").is_err());
        let Chart::Daily { months, .. } = session.daily_chart("eur").unwrap() else {
            panic!("expected daily series");
        };
        assert_eq!(months[1].points.len(), 3);

        let mut reader = ScriptedReader::new(["t"]);
        let chart = session.prompt_category_chart(&mut reader, None).unwrap();
        assert!(matches!(chart, Chart::Monthly { ref title, .. } if title == "TRAVEL"));
        session.show(chart).unwrap();
    }
}
