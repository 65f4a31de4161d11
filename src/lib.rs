// acc - personal finance records CLI
// Exposes all modules for use in the binary and the integration tests

pub mod batch;
pub mod categories;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod parser;
pub mod plot;
pub mod prompt;
pub mod query;
pub mod report;
pub mod session;
pub mod shell;

// Only compile the chart window when the TUI feature is enabled
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use categories::CategoryBook;
pub use config::Config;
pub use db::{
    open_database, open_in_memory, read_records, Conversion, QueryTable, ReadResult, Record,
};
pub use error::{ParseError, ParseResult};
pub use parser::{
    parse_currency, parse_date, parse_double_currency, parse_expression, parse_filter,
    parse_period, Period,
};
pub use query::{Field, Filter, Operand, Operator, Predicate};
pub use session::Session;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
