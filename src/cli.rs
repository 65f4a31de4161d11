// Command-line interface.
//
// Without a subcommand `acc` opens the interactive shell. The one-shot
// subcommands cover the common non-interactive uses: reading with a filter,
// importing a CSV file and showing one chart.

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::config::Config;
use crate::db::{QueryTable, ReadResult};
use crate::logging::init_tracing;
use crate::parser::parse_period;
use crate::prompt::{is_aborted, EditorReader};
use crate::report;
use crate::session::Session;
use crate::shell::{run_shell, Mode};

/// acc - personal finance records in SQLite
#[derive(Parser, Debug)]
#[command(name = "acc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true, env = "ACC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive shell (default)
    Shell {
        /// Start with the plot commands
        #[arg(long)]
        plot: bool,

        /// Print charts as text tables
        #[arg(long)]
        text: bool,
    },

    /// Print records matching a filter
    #[command(alias = "r")]
    Read {
        /// Rows to show (default: read_limit from the config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Include records dated after today
        #[arg(long)]
        all_dates: bool,

        /// JSON output
        #[arg(long)]
        json: bool,

        /// Filter, e.g. "amount between 10 and 25 and cat food"
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        filter: Vec<String>,
    },

    /// Write one record interactively
    #[command(alias = "w")]
    Write,

    /// Delete one record
    #[command(alias = "d")]
    Delete {
        id: i64,

        /// Skip the confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Insert every row of a CSV file (header: date, amount, currency, description, category)
    Import { file: PathBuf },

    /// Show one chart
    Plot {
        /// Period (default: current month)
        #[arg(short, long)]
        period: Option<String>,

        /// Print the chart as text tables
        #[arg(long)]
        text: bool,

        #[command(subcommand)]
        chart: PlotCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PlotCommand {
    /// Spending by category in the period
    P1,
    /// Monthly spending per currency
    P2,
    /// Monthly totals of one category
    P3 { category: Option<String> },
    /// Daily spending around the period
    P4 { currency: Option<String> },
}

/// Load config and session, then run the chosen command.
pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let config = Config::load(&path)?;
    tracing::debug!(config = %path.display(), database = %config.database.display(), "configuration loaded");

    let today = Local::now().date_naive();
    let mut session = Session::open(config, today)?;

    let result = dispatch(&mut session, cli.command);
    match result {
        Err(err) if is_aborted(&err) => {
            println!("Aborted.");
            Ok(())
        }
        other => other,
    }
}

fn dispatch(session: &mut Session, command: Option<Commands>) -> Result<()> {
    match command.unwrap_or(Commands::Shell {
        plot: false,
        text: false,
    }) {
        Commands::Shell { plot, text } => {
            session.text_charts = text;
            let mode = if plot { Mode::Plot } else { Mode::Db };
            run_shell(session, mode)
        }
        Commands::Read {
            limit,
            all_dates,
            json,
            filter,
        } => {
            let result = session.query(&filter.join(" "), limit, all_dates)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&read_result_json(&result)?)?);
            } else if result.is_empty() {
                println!("No records.");
            } else {
                print!("{}", report::read_result(&result));
            }
            Ok(())
        }
        Commands::Write => {
            let mut reader = EditorReader::new()?;
            session.write(&mut reader)?;
            Ok(())
        }
        Commands::Delete { id, yes } => {
            let mut reader = EditorReader::new()?;
            session.delete(&mut reader, Some(id), yes)?;
            Ok(())
        }
        Commands::Import { file } => {
            let count = session.import(&file)?;
            println!("Imported {} records from {}.", count, file.display());
            Ok(())
        }
        Commands::Plot {
            period,
            text,
            chart,
        } => {
            session.text_charts = text;
            if let Some(period) = period {
                session.period = parse_period(&period, session.period)?;
            }
            let chart = match chart {
                PlotCommand::P1 => session.categories_chart()?,
                PlotCommand::P2 => session.expenses_chart()?,
                PlotCommand::P3 { category } => {
                    let mut reader = EditorReader::new()?;
                    session.prompt_category_chart(&mut reader, category.as_deref())?
                }
                PlotCommand::P4 { currency } => {
                    let mut reader = EditorReader::new()?;
                    session.prompt_daily_chart(&mut reader, currency.as_deref())?
                }
            };
            session.show(chart)
        }
    }
}

fn table_json(table: &QueryTable) -> Value {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(|cell| Value::String(cell.clone())))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

/// Records serialize as they are; passthrough rows become column-keyed objects.
pub fn read_result_json(result: &ReadResult) -> Result<Value> {
    match result {
        ReadResult::Records(records) => Ok(serde_json::to_value(records)?),
        ReadResult::Table(table) => Ok(table_json(table)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Record;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_read() {
        let cli = Cli::try_parse_from(["acc", "read", "-n", "5", "amount", "between", "10", "and", "25"]).unwrap();
        match cli.command {
            Some(Commands::Read { limit, filter, json, .. }) => {
                assert_eq!(limit, Some(5));
                assert!(!json);
                assert_eq!(filter.join(" "), "amount between 10 and 25");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_globals_and_plot() {
        let cli = Cli::try_parse_from(["acc", "plot", "--period", "2025-08", "p4", "usd", "-v", "--config", "/tmp/acc.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/acc.toml")));
        match cli.command {
            Some(Commands::Plot { period, chart, .. }) => {
                assert_eq!(period.as_deref(), Some("2025-08"));
                assert_eq!(chart, PlotCommand::P4 { currency: Some("usd".to_string()) });
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_is_shell() {
        let cli = Cli::try_parse_from(["acc"]).unwrap();
        assert!(cli.command.is_none());
        assert!(Cli::try_parse_from(["acc", "delete"]).is_err());
    }

    #[test]
    fn test_read_result_json() {
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let records = ReadResult::Records(vec![Record::new(date, 2.5, "EUR", "Tea", "FOOD").with_id(4)]);
        let value = read_result_json(&records).unwrap();
        assert_eq!(value[0]["id"], 4);
        assert_eq!(value[0]["date"], "2025-09-01");
        assert_eq!(value[0]["amount"], 2.5);

        let table = ReadResult::Table(QueryTable {
            columns: vec!["category".to_string(), "n".to_string()],
            rows: vec![vec!["FOOD".to_string(), "3".to_string()]],
        });
        let value = read_result_json(&table).unwrap();
        assert_eq!(value[0]["category"], "FOOD");
        assert_eq!(value[0]["n"], "3");
    }
}
