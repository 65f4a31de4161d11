// Date and period expressions
//
// Dates are relative to a reference day the caller captures once.
// Periods are (year, month) buckets relative to a default period.

use crate::error::{ParseError, ParseResult};
use chrono::{Datelike, Days, NaiveDate};
use std::fmt;

// ============================================================================
// PERIOD
// ============================================================================

/// A calendar month, displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> ParseResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(ParseError::value(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        Ok(Period { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Period {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Period {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.succ().first_day()?.pred_opt()
    }

    /// Every day of the month, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        match (self.first_day(), self.last_day()) {
            (Some(first), Some(last)) => first.iter_days().take_while(|d| *d <= last).collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// PARSERS
// ============================================================================

fn is_digits(text: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&text.len()) && text.chars().all(|c| c.is_ascii_digit())
}

fn number<T: std::str::FromStr>(text: &str) -> ParseResult<T> {
    text.parse::<T>()
        .map_err(|_| ParseError::value(format!("'{}' is out of range", text)))
}

fn impossible(text: &str) -> ParseError {
    ParseError::value(format!("'{}' is not a valid calendar date", text))
}

/// Resolve a date expression against `reference`.
///
/// Accepted, in order: empty / `0` / `today`, `+N` / `-N` days, a day of
/// the reference month, `D M` in the reference year, `Y M D` with a 4- or
/// 2-digit year.
pub fn parse_date(text: &str, reference: NaiveDate) -> ParseResult<NaiveDate> {
    let text = text.trim();

    if text.is_empty() || text == "0" || text.eq_ignore_ascii_case("today") {
        return Ok(reference);
    }

    if let Some(sign) = text.chars().next().filter(|c| *c == '+' || *c == '-') {
        let digits = &text[1..];
        if is_digits(digits, 1, usize::MAX) {
            let days = Days::new(number::<u64>(digits)?);
            let shifted = if sign == '+' {
                reference.checked_add_days(days)
            } else {
                reference.checked_sub_days(days)
            };
            return shifted.ok_or_else(|| impossible(text));
        }
    }

    // The day is substituted as-is; an impossible day is the date library's error
    if is_digits(text, 1, 2) {
        return reference.with_day(number(text)?).ok_or_else(|| impossible(text));
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    match parts.as_slice() {
        [day, month] if is_digits(day, 1, 2) && is_digits(month, 1, 2) => {
            NaiveDate::from_ymd_opt(reference.year(), number(month)?, number(day)?)
                .ok_or_else(|| impossible(text))
        }
        [year, month, day] if is_digits(month, 1, 2) && is_digits(day, 1, 2) => {
            let year = if is_digits(year, 4, 4) {
                number::<i32>(year)?
            } else if is_digits(year, 2, 2) {
                // Same pivot as strptime's %y
                let short = number::<i32>(year)?;
                if short < 69 {
                    2000 + short
                } else {
                    1900 + short
                }
            } else {
                return Err(unparseable_date(text));
            };
            NaiveDate::from_ymd_opt(year, number(month)?, number(day)?)
                .ok_or_else(|| unparseable_date(text))
        }
        _ => Err(unparseable_date(text)),
    }
}

fn unparseable_date(text: &str) -> ParseError {
    ParseError::syntax(format!("'{}' can't be parsed as a valid date", text))
}

/// Resolve a period expression against `default`.
///
/// Accepted: empty / `0`, a month number in the default year, or
/// `Y<sep>M` with `sep` one of space, `-`, `/` and a 2- or 4-digit year.
pub fn parse_period(text: &str, default: Period) -> ParseResult<Period> {
    let text = text.trim();

    if text.is_empty() || text == "0" {
        return Ok(default);
    }

    if is_digits(text, 1, 2) {
        return Period::new(default.year, number(text)?);
    }

    let split = text
        .char_indices()
        .find(|(_, c)| matches!(c, ' ' | '-' | '/'))
        .map(|(i, c)| (&text[..i], &text[i + c.len_utf8()..]));

    match split {
        Some((year, month))
            if (is_digits(year, 2, 2) || is_digits(year, 4, 4)) && is_digits(month, 1, 2) =>
        {
            let mut year = number::<i32>(year)?;
            if year < 100 {
                year += 2000;
            }
            Period::new(year, number(month)?)
        }
        _ => Err(ParseError::syntax(format!(
            "'{}' can't be parsed as a valid period",
            text
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_reference_forms() {
        let reference = ymd(2025, 1, 15);
        assert_eq!(parse_date("", reference).unwrap(), reference);
        assert_eq!(parse_date("0", reference).unwrap(), reference);
        assert_eq!(parse_date("today", reference).unwrap(), reference);
    }

    #[test]
    fn test_date_day_arithmetic() {
        let reference = ymd(2025, 1, 15);
        assert_eq!(parse_date("+5", reference).unwrap(), ymd(2025, 1, 20));
        assert_eq!(parse_date("-20", reference).unwrap(), ymd(2024, 12, 26));
        assert_eq!(parse_date("+0", reference).unwrap(), reference);
        assert!(parse_date("+99999999999999999999", reference).unwrap_err().is_value());
    }

    #[test]
    fn test_date_day_substitution() {
        let reference = ymd(2025, 1, 15);
        assert_eq!(parse_date("20", reference).unwrap(), ymd(2025, 1, 20));
        assert_eq!(parse_date("3", reference).unwrap(), ymd(2025, 1, 3));

        let february = ymd(2025, 2, 10);
        assert!(parse_date("31", february).unwrap_err().is_value());
        assert!(parse_date("00", february).unwrap_err().is_value());
    }

    #[test]
    fn test_date_day_month() {
        let reference = ymd(2025, 1, 15);
        assert_eq!(parse_date("10 8", reference).unwrap(), ymd(2025, 8, 10));
        assert_eq!(parse_date("31 12", reference).unwrap(), ymd(2025, 12, 31));
        assert!(parse_date("30 2", reference).unwrap_err().is_value());
        assert!(parse_date("1 13", reference).unwrap_err().is_value());
    }

    #[test]
    fn test_date_absolute() {
        let reference = ymd(2025, 1, 15);
        assert_eq!(parse_date("2024 2 29", reference).unwrap(), ymd(2024, 2, 29));
        assert_eq!(parse_date("24 2 29", reference).unwrap(), ymd(2024, 2, 29));
        assert_eq!(parse_date("99 12 31", reference).unwrap(), ymd(1999, 12, 31));
        assert_eq!(parse_date("68 1 1", reference).unwrap(), ymd(2068, 1, 1));
        assert!(parse_date("2025 2 30", reference).unwrap_err().is_syntax());
    }

    #[test]
    fn test_date_syntax_errors() {
        let reference = ymd(2025, 1, 15);
        for input in ["yesterday", "123", "2025-01-01", "1 2 3 4", "+x", "202 1 1"] {
            assert!(parse_date(input, reference).unwrap_err().is_syntax(), "'{}' should fail", input);
        }
    }

    #[test]
    fn test_period_forms() {
        let default = Period::new(2025, 6).unwrap();
        assert_eq!(parse_period("0", default).unwrap(), default);
        assert_eq!(parse_period("", default).unwrap(), default);
        assert_eq!(parse_period("8", default).unwrap(), Period::new(2025, 8).unwrap());
        assert_eq!(parse_period("25-08", default).unwrap(), Period::new(2025, 8).unwrap());
        assert_eq!(parse_period("2024/1", default).unwrap(), Period::new(2024, 1).unwrap());
        assert_eq!(parse_period("2023 12", default).unwrap(), Period::new(2023, 12).unwrap());
    }

    #[test]
    fn test_period_errors() {
        let default = Period::new(2025, 6).unwrap();
        assert!(parse_period("13", default).unwrap_err().is_value());
        assert!(parse_period("2025-13", default).unwrap_err().is_value());
        assert!(parse_period("2025.08", default).unwrap_err().is_syntax());
        assert!(parse_period("202-08", default).unwrap_err().is_syntax());
        assert!(parse_period("august", default).unwrap_err().is_syntax());
    }

    #[test]
    fn test_period_navigation() {
        let january = Period::new(2025, 1).unwrap();
        assert_eq!(january.pred(), Period::new(2024, 12).unwrap());
        assert_eq!(january.pred().succ(), january);
        assert_eq!(january.to_string(), "2025-01");

        let february = Period::new(2024, 2).unwrap();
        assert_eq!(february.last_day(), Some(ymd(2024, 2, 29)));
        assert_eq!(february.days().len(), 29);
        assert!(february.contains(ymd(2024, 2, 10)));
        assert!(!february.contains(ymd(2025, 2, 10)));
    }
}
