// Plain-text rendering of records, query results and plot data
//
// Used by `read`, by the shell previews, and for charts when the `tui`
// feature is off.

use std::fmt::Write;

use crate::db::{Conversion, QueryTable, ReadResult, Record, RECORD_COLUMNS};
use crate::plot::{Chart, DailySeries, MonthlySeries, PeriodBreakdown};
use crate::parser::Period;

const DESCRIPTION_WIDTH: usize = 32;
const BAR_WIDTH: usize = 40;

/// Cut `s` to `max_len` characters, marking the cut with `...`.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep = max_len.saturating_sub(3);
        format!("{}...", s.chars().take(keep).collect::<String>())
    }
}

/// Left-aligned columns sized to their widest cell.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(columns));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", line(&rule));
    for row in rows {
        let _ = writeln!(out, "{}", line(row));
    }
    out
}

pub fn records_table(records: &[Record]) -> String {
    let columns: Vec<String> = RECORD_COLUMNS.iter().map(|c| c.to_string()).collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.id.map(|id| id.to_string()).unwrap_or_default(),
                r.date.to_string(),
                format!("{:.2}", r.amount),
                r.currency.clone(),
                truncate(&r.description, DESCRIPTION_WIDTH),
                r.category.clone(),
            ]
        })
        .collect();
    render_table(&columns, &rows)
}

pub fn query_table(table: &QueryTable) -> String {
    render_table(&table.columns, &table.rows)
}

pub fn read_result(result: &ReadResult) -> String {
    match result {
        ReadResult::Records(records) => records_table(records),
        ReadResult::Table(table) => query_table(table),
    }
}

pub fn conversions_table(conversions: &[Conversion]) -> String {
    let columns: Vec<String> = ["id", "date", "from", "to", "rate", "description"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows: Vec<Vec<String>> = conversions
        .iter()
        .map(|c| {
            vec![
                c.id.map(|id| id.to_string()).unwrap_or_default(),
                c.date.to_string(),
                format!("{:.2} {}", c.base_amount, c.base_currency),
                format!("{:.2} {}", c.target_amount, c.target_currency),
                c.rate().map(|r| format!("{:.4}", r)).unwrap_or_default(),
                truncate(&c.description, DESCRIPTION_WIDTH),
            ]
        })
        .collect();
    render_table(&columns, &rows)
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(len.max(1))
}

/// p1 as one block of horizontal bars per currency.
pub fn breakdown_text(breakdown: &PeriodBreakdown) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Categories for {}", breakdown.period);

    if breakdown.currencies.is_empty() {
        let _ = writeln!(out, "(no spending)");
        return out;
    }

    for currency in &breakdown.currencies {
        let _ = writeln!(out, "\n{}  total {:.2}", currency.currency, currency.total);
        let max = currency
            .categories
            .iter()
            .map(|(_, v)| *v)
            .fold(0.0_f64, f64::max);
        let name_width = currency
            .categories
            .iter()
            .map(|(c, _)| c.chars().count())
            .max()
            .unwrap_or(0);
        for (category, total) in &currency.categories {
            let _ = writeln!(
                out,
                "  {:<w$}  {:>10.2}  {}",
                category,
                total,
                bar(*total, max),
                w = name_width
            );
        }
    }

    let _ = writeln!(out, "\nAll currencies");
    for (currency, total) in &breakdown.converted {
        let _ = writeln!(out, "  {:.2} {}", total, currency);
    }
    out
}

/// p2 / p3 as one column per currency; the focus period is starred.
pub fn monthly_text(title: &str, series: &[MonthlySeries], focus: Period) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", title);
    if series.is_empty() {
        let _ = writeln!(out, "(no data)");
        return out;
    }

    let mut periods: Vec<Period> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|(p, _)| *p))
        .collect();
    periods.sort();
    periods.dedup();

    let mut columns = vec!["period".to_string()];
    columns.extend(series.iter().map(|s| s.currency.clone()));

    let rows: Vec<Vec<String>> = periods
        .iter()
        .map(|p| {
            let mark = if *p == focus { "*" } else { "" };
            let mut row = vec![format!("{}{}", p, mark)];
            row.extend(
                series
                    .iter()
                    .map(|s| s.value_at(*p).map(|v| format!("{:.2}", v)).unwrap_or_default()),
            );
            row
        })
        .collect();

    out.push_str(&render_table(&columns, &rows));
    out
}

/// p4 as one table per month.
pub fn daily_text(currency: &str, months: &[DailySeries]) -> String {
    let mut out = String::new();
    let columns: Vec<String> = ["date", "day", "cumulative"].iter().map(|c| c.to_string()).collect();

    for month in months {
        let mark = if month.focus { " *" } else { "" };
        let _ = writeln!(out, "{} {}{}", currency, month.period, mark);
        let rows: Vec<Vec<String>> = month
            .points
            .iter()
            .map(|p| {
                vec![
                    p.date.to_string(),
                    format!("{:.2}", p.total),
                    format!("{:.2}", p.cumulative),
                ]
            })
            .collect();
        out.push_str(&render_table(&columns, &rows));
        out.push('\n');
    }
    out
}

pub fn chart_text(chart: &Chart) -> String {
    match chart {
        Chart::Breakdown(breakdown) => breakdown_text(breakdown),
        Chart::Monthly {
            title,
            series,
            focus,
        } => monthly_text(title, series, *focus),
        Chart::Daily { currency, months, .. } => daily_text(currency, months),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::{CurrencyBreakdown, DailyPoint};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn period(y: i32, m: u32) -> Period {
        Period::new(y, m).unwrap()
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a rather long description", 10), "a rathe...");
        assert_eq!(truncate("café crème brûlée", 8), "café ...");
    }

    #[test]
    fn test_render_table_alignment() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec!["1".to_string(), "FOOD".to_string()],
            vec!["120".to_string(), "X".to_string()],
        ];
        let text = render_table(&columns, &rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id   name");
        assert_eq!(lines[1], "---  ----");
        assert_eq!(lines[2], "1    FOOD");
        assert_eq!(lines[3], "120  X");
    }

    #[test]
    fn test_records_table() {
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let records = vec![Record::new(date, 12.5, "EUR", "Bakery", "FOOD").with_id(7)];
        let text = records_table(&records);
        assert!(text.starts_with("id"));
        assert!(text.contains("7   2025-09-01  12.50   EUR"));
    }

    #[test]
    fn test_breakdown_text() {
        let breakdown = PeriodBreakdown {
            period: period(2025, 9),
            currencies: vec![CurrencyBreakdown {
                currency: "EUR".to_string(),
                categories: vec![("RENT".to_string(), 800.0), ("FOOD".to_string(), 20.0)],
                total: 820.0,
            }],
            converted: BTreeMap::from([("EUR".to_string(), 820.0)]),
        };
        let text = breakdown_text(&breakdown);
        assert!(text.contains("Categories for 2025-09"));
        assert!(text.contains(&format!("RENT      800.00  {}", "#".repeat(BAR_WIDTH))));
        assert!(text.contains("820.00 EUR"));
    }

    #[test]
    fn test_monthly_text_marks_focus() {
        let series = vec![MonthlySeries {
            currency: "EUR".to_string(),
            points: vec![(period(2025, 8), 50.0), (period(2025, 9), 70.0)],
        }];
        let text = monthly_text("Expenses", &series, period(2025, 9));
        assert!(text.contains("2025-09*"));
        assert!(text.contains("2025-08 "));
    }

    #[test]
    fn test_daily_text() {
        let months = vec![DailySeries {
            period: period(2025, 9),
            focus: true,
            points: vec![DailyPoint {
                date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
                total: 4.0,
                cumulative: 4.0,
            }],
        }];
        let text = daily_text("EUR", &months);
        assert!(text.starts_with("EUR 2025-09 *"));
        assert!(text.contains("2025-09-02  4.00  4.00"));
    }
}
