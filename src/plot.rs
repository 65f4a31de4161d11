// Plot data - aggregation queries behind the charts
//
// p1  category totals for one period, per currency
// p2  monthly spending per currency
// p3  monthly totals of one category per currency
// p4  daily and cumulative spending around one period, one currency
//
// Income categories are left out of every spending aggregate.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db::{Record, SELECT_RECORD};
use crate::parser::{parse_period, Period};

const PERIOD_SQL: &str = "strftime('%Y-%m', date)";

// ============================================================================
// TYPES
// ============================================================================

/// Spending of one currency in a period, largest category first.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyBreakdown {
    pub currency: String,
    pub categories: Vec<(String, f64)>,
    pub total: f64,
}

/// Output of p1.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodBreakdown {
    pub period: Period,
    pub currencies: Vec<CurrencyBreakdown>,
    /// Grand total of all currencies expressed in each currency.
    pub converted: BTreeMap<String, f64>,
}

/// One line of a monthly chart.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    pub currency: String,
    pub points: Vec<(Period, f64)>,
}

impl MonthlySeries {
    pub fn value_at(&self, period: Period) -> Option<f64> {
        self.points
            .iter()
            .find(|(p, _)| *p == period)
            .map(|(_, v)| *v)
    }
}

/// A day of p4: spent that day and running total within the month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub total: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub period: Period,
    /// The period the chart is centred on.
    pub focus: bool,
    pub points: Vec<DailyPoint>,
}

/// Everything one chart window shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    Breakdown(PeriodBreakdown),
    Monthly {
        title: String,
        series: Vec<MonthlySeries>,
        focus: Period,
    },
    Daily {
        currency: String,
        months: Vec<DailySeries>,
        today: NaiveDate,
    },
}

// ============================================================================
// QUERIES
// ============================================================================

/// `category NOT IN (...)` over the income list, `1 = 1` when empty.
fn excluding(income: &[String]) -> String {
    if income.is_empty() {
        "1 = 1".to_string()
    } else {
        format!("category NOT IN ({})", vec!["?"; income.len()].join(", "))
    }
}

fn bind<'a>(head: &'a [&'a dyn ToSql], income: &'a [String]) -> Vec<&'a dyn ToSql> {
    let mut params: Vec<&dyn ToSql> = head.to_vec();
    params.extend(income.iter().map(|c| c as &dyn ToSql));
    params
}

fn to_period(text: &str, fallback: Period) -> Result<Period> {
    parse_period(text, fallback).with_context(|| format!("Stored date has a bad period '{}'", text))
}

/// Currencies with spending in `period`.
pub fn currencies_in_period(conn: &Connection, period: Period, income: &[String]) -> Result<Vec<String>> {
    let like = format!("{}%", period);
    let sql = format!(
        "SELECT DISTINCT currency FROM records WHERE date LIKE ? AND {} ORDER BY currency",
        excluding(income)
    );
    let mut stmt = conn.prepare(&sql)?;
    let currencies = stmt
        .query_map(params_from_iter(bind(&[&like], income)), |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(currencies)
}

/// p1
pub fn categories_per_period(conn: &Connection, period: Period, config: &Config) -> Result<PeriodBreakdown> {
    let like = format!("{}%", period);
    let sql = format!(
        "SELECT currency, category, SUM(amount) AS total
         FROM records
         WHERE date LIKE ? AND {}
         GROUP BY currency, category
         ORDER BY currency, total DESC, category",
        excluding(&config.income_categories)
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params_from_iter(bind(&[&like], &config.income_categories)),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut currencies: Vec<CurrencyBreakdown> = Vec::new();
    for (currency, category, total) in rows {
        match currencies.last_mut() {
            Some(last) if last.currency == currency => {
                last.total += total;
                last.categories.push((category, total));
            }
            _ => currencies.push(CurrencyBreakdown {
                currency,
                categories: vec![(category, total)],
                total,
            }),
        }
    }

    let totals: BTreeMap<String, f64> = currencies
        .iter()
        .map(|c| (c.currency.clone(), c.total))
        .collect();
    let converted = sum_currencies(&totals, config)?;

    tracing::debug!(%period, currencies = currencies.len(), "category breakdown");
    Ok(PeriodBreakdown {
        period,
        currencies,
        converted,
    })
}

/// Express the sum of every currency's amount in each of those currencies.
pub fn sum_currencies(totals: &BTreeMap<String, f64>, config: &Config) -> Result<BTreeMap<String, f64>> {
    let mut converted = BTreeMap::new();
    for target in totals.keys() {
        let mut sum = 0.0;
        for (source, amount) in totals {
            let rate = config.exchange_rate(source, target).with_context(|| {
                format!(
                    "No exchange rate from {} to {}; add it under [exchange.{}] in the config",
                    source, target, source
                )
            })?;
            sum += amount * rate;
        }
        converted.insert(target.clone(), sum);
    }
    Ok(converted)
}

/// Records behind one p1 bar, largest amount first.
pub fn drilldown(conn: &Connection, period: Period, category: &str, currency: &str) -> Result<Vec<Record>> {
    let like = format!("{}%", period);
    let mut stmt = conn.prepare(&format!(
        "{} WHERE date LIKE ?1 AND category = ?2 AND currency = ?3 ORDER BY amount DESC, date DESC",
        SELECT_RECORD
    ))?;
    let records = stmt
        .query_map([like.as_str(), category, currency], Record::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn monthly(conn: &Connection, sql: &str, params: Vec<&dyn ToSql>, fallback: Period) -> Result<Vec<MonthlySeries>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut series: Vec<MonthlySeries> = Vec::new();
    for (currency, period, total) in rows {
        let period = to_period(&period, fallback)?;
        match series.last_mut() {
            Some(last) if last.currency == currency => last.points.push((period, total)),
            _ => series.push(MonthlySeries {
                currency,
                points: vec![(period, total)],
            }),
        }
    }
    Ok(series)
}

/// p2
pub fn expenses_series(conn: &Connection, income: &[String], fallback: Period) -> Result<Vec<MonthlySeries>> {
    let sql = format!(
        "SELECT currency, {p} AS period, SUM(amount)
         FROM records
         WHERE {}
         GROUP BY currency, period
         ORDER BY currency, period",
        excluding(income),
        p = PERIOD_SQL
    );
    monthly(conn, &sql, bind(&[], income), fallback)
}

/// p3
pub fn category_series(conn: &Connection, category: &str, fallback: Period) -> Result<Vec<MonthlySeries>> {
    let sql = format!(
        "SELECT currency, {p} AS period, SUM(amount)
         FROM records
         WHERE category = ?
         GROUP BY currency, period
         ORDER BY currency, period",
        p = PERIOD_SQL
    );
    monthly(conn, &sql, vec![&category as &dyn ToSql], fallback)
}

/// p4: previous, current and next month around `period`.
pub fn daily_series(conn: &Connection, currency: &str, period: Period, income: &[String]) -> Result<Vec<DailySeries>> {
    let sql = format!(
        "SELECT date, SUM(amount)
         FROM records
         WHERE currency = ? AND {p} = ? AND {}
         GROUP BY date
         ORDER BY date",
        excluding(income),
        p = PERIOD_SQL
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut months = Vec::with_capacity(3);
    for month in [period.pred(), period, period.succ()] {
        let label = month.to_string();
        let rows = stmt
            .query_map(params_from_iter(bind(&[&currency, &label], income)), |row| {
                Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut cumulative = 0.0;
        let points = rows
            .into_iter()
            .map(|(date, total)| {
                cumulative += total;
                DailyPoint {
                    date,
                    total,
                    cumulative,
                }
            })
            .collect();

        months.push(DailySeries {
            period: month,
            focus: month == period,
            points,
        });
    }

    Ok(months)
}
