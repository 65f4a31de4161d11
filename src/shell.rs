// Interactive shell - `db` mode for records, `plot` mode for charts
//
// The first word picks the command. `r` hands the rest of the line to the
// filter parser untouched; every other command splits it shell-style.

use anyhow::{bail, Result};
use shell_words::split;

use crate::parser::{parse_period, Period};
use crate::plot::drilldown;
use crate::prompt::{is_aborted, parse_ids, prompt_period, EditorReader, LineReader};
use crate::report;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Db,
    Plot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Switch(Mode),
    Exit,
}

const DB_HELP: &str = "
Record commands:
    w               write one record
    wl              write several records through a sheet
    e [id] [cols]   edit columns of a record (cols: d a cur desc c)
    el ids.. [-l]   edit records in a sheet; two ids are a range unless -l
    d [id]          delete a record
    r [n] [filter]  read the last n records matching a filter
    cv              write a currency conversion
    rc              read conversions
    plot            switch to plot commands
    h               print this message
    q               quit
";

const PLOT_HELP: &str = "
Plot commands:
    p1              spending by category in the period
    p2              monthly spending per currency
    p3 [category]   monthly totals of one category
    p4 [currency]   daily spending around the period
    dd cat cur      records behind one category of p1
    period [text]   change the period (YYYY-MM, YY/MM, M, 0)
    db              switch to record commands
    h               print this message
    q               quit
";

pub fn help(mode: Mode) -> &'static str {
    match mode {
        Mode::Db => DB_HELP,
        Mode::Plot => PLOT_HELP,
    }
}

/// Shell on the terminal.
pub fn run_shell(session: &mut Session, mode: Mode) -> Result<()> {
    let mut reader = EditorReader::new()?;
    run(session, mode, &mut reader)
}

pub fn run(session: &mut Session, mode: Mode, reader: &mut dyn LineReader) -> Result<()> {
    let mut mode = mode;
    println!("{}", help(mode));

    loop {
        let prompt = match mode {
            Mode::Db => "acc> ".to_string(),
            Mode::Plot => format!("acc plot {}> ", session.period),
        };
        let Some(line) = reader.read_line(&prompt)? else {
            println!("Exiting shell.");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match handle_line(session, mode, reader, line) {
            Ok(LoopControl::Continue) => {}
            Ok(LoopControl::Switch(next)) => {
                mode = next;
                println!("{}", help(mode));
            }
            Ok(LoopControl::Exit) => break,
            Err(err) if is_aborted(&err) => println!("Aborted."),
            Err(err) => {
                tracing::debug!(error = ?err, command = line, "command failed");
                println!("Error: {:#}", err);
            }
        }
    }

    Ok(())
}

fn split_command(line: &str) -> (String, &str) {
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    }
}

fn parse_id_arg(arg: Option<&String>) -> Result<Option<i64>> {
    match arg {
        Some(text) => match text.parse::<i64>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => bail!("'{}' is not a record id", text),
        },
        None => Ok(None),
    }
}

pub fn handle_line(
    session: &mut Session,
    mode: Mode,
    reader: &mut dyn LineReader,
    line: &str,
) -> Result<LoopControl> {
    let (command, rest) = split_command(line);

    match command.as_str() {
        "q" | "quit" | "exit" => return Ok(LoopControl::Exit),
        "h" | "help" => {
            println!("{}", help(mode));
            return Ok(LoopControl::Continue);
        }
        _ => {}
    }

    match mode {
        Mode::Db => db_command(session, reader, &command, rest),
        Mode::Plot => plot_command(session, reader, &command, rest),
    }
}

fn db_command(
    session: &mut Session,
    reader: &mut dyn LineReader,
    command: &str,
    rest: &str,
) -> Result<LoopControl> {
    if command == "r" {
        let (limit, filter) = match rest.split_once(char::is_whitespace) {
            Some((first, filter)) if first.parse::<usize>().is_ok() => (first.parse().ok(), filter.trim()),
            _ if rest.parse::<usize>().is_ok() => (rest.parse().ok(), ""),
            _ => (None, rest),
        };
        let filter = if filter.is_empty() && limit.is_none() { None } else { Some(filter) };
        session.read(reader, filter, limit)?;
        return Ok(LoopControl::Continue);
    }

    let args = split(rest)?;
    match command {
        "w" => {
            session.write(reader)?;
        }
        "wl" => {
            session.write_list(reader)?;
        }
        "e" => {
            let id = parse_id_arg(args.first())?;
            let columns = args.get(1..).filter(|c| !c.is_empty()).map(|c| c.join(" "));
            session.edit(reader, id, columns.as_deref())?;
        }
        "el" => {
            let as_list = args.iter().any(|a| a == "-l" || a == "--list");
            let ids: Vec<&str> = args
                .iter()
                .map(String::as_str)
                .filter(|a| !a.starts_with('-'))
                .collect();
            let ids = parse_ids(&ids.join(" "))?;
            session.edit_list(reader, &ids, !as_list)?;
        }
        "d" => {
            let id = parse_id_arg(args.first())?;
            session.delete(reader, id, false)?;
        }
        "cv" => {
            session.write_conversion(reader)?;
        }
        "rc" => {
            session.read_conversions()?;
        }
        "plot" => return Ok(LoopControl::Switch(Mode::Plot)),
        other => println!("Unknown command '{}'. Type h for help.", other),
    }
    Ok(LoopControl::Continue)
}

fn plot_command(
    session: &mut Session,
    reader: &mut dyn LineReader,
    command: &str,
    rest: &str,
) -> Result<LoopControl> {
    let args = split(rest)?;
    let default = Period::from_date(session.today);

    match command {
        "p1" => session.show(session.categories_chart()?)?,
        "p2" => session.show(session.expenses_chart()?)?,
        "p3" => {
            let chart = session.prompt_category_chart(reader, args.first().map(String::as_str))?;
            session.show(chart)?;
        }
        "p4" => {
            let chart = session.prompt_daily_chart(reader, args.first().map(String::as_str))?;
            session.show(chart)?;
        }
        "dd" => {
            let [category, currency] = args.as_slice() else {
                bail!("usage: dd CATEGORY CURRENCY");
            };
            let records = drilldown(
                &session.conn,
                session.period,
                &category.to_uppercase(),
                &currency.to_uppercase(),
            )?;
            print!("{}", report::records_table(&records));
        }
        "period" => {
            session.period = if rest.is_empty() {
                prompt_period(reader, default)?
            } else {
                parse_period(rest, default)?
            };
            println!("Period set to {}.", session.period);
        }
        "db" => return Ok(LoopControl::Switch(Mode::Db)),
        other => println!("Unknown command '{}'. Type h for help.", other),
    }
    Ok(LoopControl::Continue)
}
