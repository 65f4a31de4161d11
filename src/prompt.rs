// Prompt loops - ask until the parser accepts, abort at end of input
//
// Every loop reads through a LineReader so the shell runs on rustyline and
// the tests run on a scripted queue of answers.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::VecDeque;

use crate::batch::{FixedFields, SheetContext, WRITABLE_COLUMNS};
use crate::categories::{CategoryBook, Keybind};
use crate::db::{get_record, Record};
use crate::error::{ParseError, ParseResult};
use crate::parser::{
    parse_category, parse_column, parse_currency, parse_date, parse_double_currency,
    parse_expression, parse_keybind, parse_period, Period, COLUMN_KEYBINDS,
};

/// Input ended (Ctrl-D / Ctrl-C) in the middle of an operation.
#[derive(Debug, thiserror::Error)]
#[error("operation aborted")]
pub struct Aborted;

pub fn is_aborted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Aborted>().is_some()
}

pub trait LineReader {
    /// Next line of input, `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Terminal input with line editing and history.
pub struct EditorReader {
    editor: DefaultEditor,
}

impl EditorReader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineReader for EditorReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fixed answers, consumed in order.
#[derive(Debug, Default)]
pub struct ScriptedReader {
    answers: VecDeque<String>,
    /// Every prompt shown so far.
    pub prompts: Vec<String>,
}

impl ScriptedReader {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front())
    }
}

fn read(reader: &mut dyn LineReader, prompt: &str) -> Result<String> {
    match reader.read_line(prompt)? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(Aborted.into()),
    }
}

/// Re-ask until `parse` accepts the answer.
pub fn ask<T>(
    reader: &mut dyn LineReader,
    prompt: &str,
    mut parse: impl FnMut(&str) -> ParseResult<T>,
) -> Result<T> {
    loop {
        let line = read(reader, prompt)?;
        match parse(&line) {
            Ok(value) => return Ok(value),
            Err(e) => println!("'{}' could not be parsed: {}", line, e),
        }
    }
}

pub fn prompt_text(reader: &mut dyn LineReader, prompt: &str) -> Result<String> {
    read(reader, prompt)
}

/// `y`/`yes` confirms; empty, `n` and `no` decline; anything else asks again.
pub fn confirm(reader: &mut dyn LineReader, question: &str) -> Result<bool> {
    let prompt = format!("{} [y/N]: ", question);
    loop {
        match read(reader, &prompt)?.to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            _ => println!("Could not parse your answer, please try again."),
        }
    }
}

pub fn prompt_date(reader: &mut dyn LineReader, today: NaiveDate) -> Result<NaiveDate> {
    let date = ask(reader, "Date (0, +n, -n, D, D M, Y M D): ", |s| parse_date(s, today))?;
    println!("Date: {}", date.format("%a %d %b %Y"));
    Ok(date)
}

pub fn prompt_amount(reader: &mut dyn LineReader, lower_bound: f64) -> Result<f64> {
    ask(reader, "Amount (number or =expression): ", |s| parse_expression(s, lower_bound))
}

pub fn prompt_currency(reader: &mut dyn LineReader) -> Result<String> {
    ask(reader, "Currency (3 letters): ", parse_currency)
}

pub fn prompt_double_currency(
    reader: &mut dyn LineReader,
    default_currency: &str,
    lower_bound: f64,
) -> Result<(f64, String)> {
    let prompt = format!("Amount [currency, default {}] (e.g. =9+9 usd): ", default_currency);
    let (amount, currency) = ask(reader, &prompt, |s| {
        parse_double_currency(s, default_currency, lower_bound)
    })?;
    println!("Amount: {:.2} {}", amount, currency);
    Ok((amount, currency))
}

pub fn prompt_period(reader: &mut dyn LineReader, default: Period) -> Result<Period> {
    let prompt = format!("Period (YYYY-MM, YY/MM, M, 0 for {}): ", default);
    ask(reader, &prompt, |s| parse_period(s, default))
}

fn print_keybinds(book: &CategoryBook) {
    for (key, bind) in book.keybinds() {
        match bind {
            Keybind::Leaf(shortname) => println!("  {:<4} {}", key, shortname),
            Keybind::Group(group) => {
                let inner: Vec<String> = group.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                println!("  {:<4} [{}]", key, inner.join(" "));
            }
        }
    }
}

/// Accepts `key`, `key subkey`, a shortname, or nothing for a random pick.
pub fn prompt_category(reader: &mut dyn LineReader, book: &CategoryBook) -> Result<String> {
    print_keybinds(book);
    loop {
        let line = read(reader, "Category (keybind, name, empty for random): ")?;
        let mut words = line.split_whitespace();
        let first = words.next().unwrap_or("");

        let parsed = match book.keybind(first) {
            Some(Keybind::Group(group)) if words.clone().next().is_none() => {
                let inner: Vec<String> = group.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                println!("  {}", inner.join(" "));
                let prompt = format!("Second key for '{}': ", first);
                return ask(reader, &prompt, |s| parse_keybind(book, first, Some(s)));
            }
            Some(_) => parse_keybind(book, first, words.next()),
            None => parse_category(book, &line),
        };

        match parsed {
            Ok(category) => {
                println!("Category: {}", category);
                return Ok(category);
            }
            Err(e) => println!("'{}' could not be parsed: {}", line, e),
        }
    }
}

fn parse_id(text: &str) -> ParseResult<i64> {
    text.parse::<i64>()
        .map_err(|_| ParseError::syntax(format!("'{}' is not a record id", text)))
}

/// Space separated ids, at least one.
pub fn parse_ids(text: &str) -> ParseResult<Vec<i64>> {
    let ids = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(parse_id)
        .collect::<ParseResult<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(ParseError::syntax("no ids given"));
    }
    Ok(ids)
}

/// Ask until the id names a stored record; `id` is tried first when given.
pub fn prompt_record_by_id(reader: &mut dyn LineReader, conn: &Connection, id: Option<i64>) -> Result<Record> {
    let mut candidate = id;
    loop {
        let id = match candidate.take() {
            Some(id) => id,
            None => ask(reader, "Record id: ", parse_id)?,
        };
        match get_record(conn, id)? {
            Some(record) => return Ok(record),
            None => println!("Id '{}' doesn't exist in the database.", id),
        }
    }
}

/// Columns picked by keybind, name or position; empty answer picks none.
pub fn prompt_columns(reader: &mut dyn LineReader, columns: &[&str]) -> Result<Vec<String>> {
    let listing: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}={}", i, c))
        .collect();
    let prompt = format!("Columns ({}; keybinds d a cur desc c): ", listing.join(" "));

    ask(reader, &prompt, |line| {
        let mut picked: Vec<String> = Vec::new();
        for word in line.split_whitespace() {
            let column = parse_column(word, columns, &COLUMN_KEYBINDS)?;
            if !picked.contains(&column) {
                picked.push(column);
            }
        }
        Ok(picked)
    })
}

/// Ask for one writable column's value and store it in `fields`.
pub fn prompt_field(
    reader: &mut dyn LineReader,
    column: &str,
    ctx: &SheetContext<'_>,
    fields: &mut FixedFields,
) -> Result<()> {
    match column {
        "date" => fields.date = Some(prompt_date(reader, ctx.today)?),
        "amount" => fields.amount = Some(prompt_amount(reader, 0.0)?),
        "currency" => fields.currency = Some(prompt_currency(reader)?),
        "description" => fields.description = Some(prompt_text(reader, "Description: ")?),
        "category" => fields.category = Some(prompt_category(reader, ctx.categories)?),
        other => bail!("Column '{}' cannot be set", other),
    }
    Ok(())
}

/// Pick columns, then ask a value for each.
pub fn prompt_fixed_fields(reader: &mut dyn LineReader, ctx: &SheetContext<'_>) -> Result<FixedFields> {
    let mut fields = FixedFields::default();
    for column in prompt_columns(reader, &WRITABLE_COLUMNS)? {
        prompt_field(reader, &column, ctx, &mut fields)?;
    }
    Ok(fields)
}

/// A complete new record, field by field.
pub fn prompt_record(reader: &mut dyn LineReader, ctx: &SheetContext<'_>) -> Result<Record> {
    let date = prompt_date(reader, ctx.today)?;
    let (amount, currency) = prompt_double_currency(reader, ctx.default_currency, 0.0)?;
    let description = prompt_text(reader, "Description: ")?;
    let category = prompt_category(reader, ctx.categories)?;
    Ok(Record {
        id: None,
        date,
        amount,
        currency,
        description,
        category,
    })
}
