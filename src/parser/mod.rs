// Pure parsers for everything the user types.
//
// Each parser is a function of its input text plus explicit reference
// values (today's date, the default period, the default currency, a lower
// bound, the category book). None of them do I/O, log or retry; failures
// come back as a `ParseError` for the caller
// to report and re-ask.
//
// Filters:
// - `amount between 10 and 25`, `am b 10 25`, `amount = 9.5`
// - `id range 40 5`, `id between 3 and 9`, `id = 12`
// - `date like 2025-09%`, `date = 2025-09-01`, `date regex ^2025`
// - `category food`, `cat like HOME%`, `cat regex ^HO`
// - `currency = eur`, `cur usd`
// - `desc like %coffee%`, `desc = "coffee and cake"`, `desc r ^Uber`
// - `sql: SELECT ...` for a read-only query run as-is
//
// Clauses are joined with `and`.
//
// Amounts: `=120+35 usd`, `+12*3`, `-5`, `42.5`
//
// Dates: `0`, `today`, `+3`, `-1`, `15`, `15 8`, `2025 8 15`, `25 8 15`.
// Periods: `0`, `8`, `2025-08`, `25/8`, `2025 8`.

mod amount;
pub mod arithmetic;
mod calendar;
mod filter;
mod lookup;

pub use amount::{parse_currency, parse_double_currency, parse_expression};
pub use calendar::{parse_date, parse_period, Period};
pub use filter::{parse_filter, parse_predicate};
pub use lookup::{parse_category, parse_category_with, parse_column, parse_keybind, COLUMN_KEYBINDS};
