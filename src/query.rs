// Query model - structured predicates produced by the filter parser
//
// A predicate is (field, operator, operands). It renders two ways:
// a parameterised SQL fragment for the storage layer, and a canonical
// filter string that parses back to the same predicate.

use crate::error::{ParseError, ParseResult};
use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;
use std::fmt;

// ============================================================================
// FIELDS & OPERATORS
// ============================================================================

/// Columns of the records table a filter may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Date,
    Amount,
    Currency,
    Category,
    Description,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Id,
        Field::Date,
        Field::Amount,
        Field::Currency,
        Field::Category,
        Field::Description,
    ];

    /// Resolve a field keyword or its short synonym (case-insensitive).
    pub fn from_keyword(word: &str) -> Option<Field> {
        match word.to_lowercase().as_str() {
            "id" => Some(Field::Id),
            "date" => Some(Field::Date),
            "amount" | "am" => Some(Field::Amount),
            "currency" | "cur" => Some(Field::Currency),
            "category" | "cat" => Some(Field::Category),
            "description" | "desc" => Some(Field::Description),
            _ => None,
        }
    }

    /// Column name in the records table. Doubles as the canonical keyword.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Date => "date",
            Field::Amount => "amount",
            Field::Currency => "currency",
            Field::Category => "category",
            Field::Description => "description",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Field::Id | Field::Amount)
    }

    /// Numeric fields take equals/between, text fields equals/like/regex.
    pub fn accepts(&self, operator: Operator) -> bool {
        match operator {
            Operator::Equals => true,
            Operator::Between => self.is_numeric(),
            Operator::Like | Operator::Regex => !self.is_numeric(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    Like,
    Regex,
    Between,
}

impl Operator {
    pub fn arity(&self) -> usize {
        match self {
            Operator::Between => 2,
            _ => 1,
        }
    }
}

/// A typed operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Operand {
    fn is_numeric(&self) -> bool {
        matches!(self, Operand::Integer(_) | Operand::Number(_))
    }

    /// Render for a filter string, quoting text the tokenizer would split.
    fn canonical(&self) -> String {
        match self {
            Operand::Integer(i) => i.to_string(),
            Operand::Number(n) => n.to_string(),
            Operand::Text(s) => quote_if_needed(s),
        }
    }
}

impl ToSql for Operand {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Operand::Integer(i) => i.to_sql(),
            Operand::Number(n) => n.to_sql(),
            Operand::Text(s) => s.to_sql(),
        }
    }
}

fn quote_if_needed(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.chars().any(char::is_whitespace)
        || text.eq_ignore_ascii_case("and")
        || text.starts_with('"')
        || text.starts_with('\'');

    if !needs_quotes {
        text.to_string()
    } else if text.contains('"') {
        format!("'{}'", text)
    } else {
        format!("\"{}\"", text)
    }
}

// ============================================================================
// PREDICATE
// ============================================================================

/// One field-scoped condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    field: Field,
    operator: Operator,
    operands: Vec<Operand>,
}

impl Predicate {
    /// Build a predicate, enforcing field/operator compatibility and arity.
    pub fn new(field: Field, operator: Operator, operands: Vec<Operand>) -> ParseResult<Self> {
        if !field.accepts(operator) {
            return Err(ParseError::syntax(format!(
                "operator {:?} is not valid for field '{}'",
                operator, field
            )));
        }
        if operands.len() != operator.arity() {
            return Err(ParseError::syntax(format!(
                "operator {:?} takes {} operand(s), got {}",
                operator,
                operator.arity(),
                operands.len()
            )));
        }
        if field.is_numeric() && !operands.iter().all(Operand::is_numeric) {
            return Err(ParseError::syntax(format!(
                "field '{}' needs numeric operands",
                field
            )));
        }

        Ok(Predicate {
            field,
            operator,
            operands,
        })
    }

    pub fn equals(field: Field, operand: Operand) -> ParseResult<Self> {
        Self::new(field, Operator::Equals, vec![operand])
    }

    pub fn like(field: Field, pattern: impl Into<String>) -> ParseResult<Self> {
        Self::new(field, Operator::Like, vec![Operand::Text(pattern.into())])
    }

    pub fn regex(field: Field, pattern: impl Into<String>) -> ParseResult<Self> {
        Self::new(field, Operator::Regex, vec![Operand::Text(pattern.into())])
    }

    pub fn between(field: Field, low: Operand, high: Operand) -> ParseResult<Self> {
        Self::new(field, Operator::Between, vec![low, high])
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// SQL fragment over a fixed column name; operands stay as parameters.
    pub fn sql_fragment(&self) -> String {
        let column = self.field.column();
        match self.operator {
            Operator::Equals => format!("{} = ?", column),
            Operator::Like => format!("{} LIKE ?", column),
            Operator::Regex => format!("{} REGEXP ?", column),
            Operator::Between => format!("{} BETWEEN ? AND ?", column),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.field.column();
        match self.operator {
            Operator::Equals => write!(f, "{} = {}", keyword, self.operands[0].canonical()),
            Operator::Like => write!(f, "{} like {}", keyword, self.operands[0].canonical()),
            Operator::Regex => write!(f, "{} regex {}", keyword, self.operands[0].canonical()),
            Operator::Between => write!(
                f,
                "{} between {} and {}",
                keyword,
                self.operands[0].canonical(),
                self.operands[1].canonical()
            ),
        }
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Result of parsing a whole filter line.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// AND of predicates. Empty means no filtering.
    Where(Vec<Predicate>),
    /// Text after `sql:`, a single SELECT statement run as-is.
    RawSelect(String),
}

impl Filter {
    pub fn always() -> Self {
        Filter::Where(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Filter::Where(predicates) if predicates.is_empty())
    }

    pub fn predicates(&self) -> &[Predicate] {
        match self {
            Filter::Where(predicates) => predicates,
            Filter::RawSelect(_) => &[],
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Where(predicates) => {
                let clauses: Vec<String> = predicates.iter().map(|p| p.to_string()).collect();
                f.write_str(&clauses.join(" and "))
            }
            Filter::RawSelect(sql) => write!(f, "sql: {}", sql),
        }
    }
}

/// A rendered WHERE clause with its bound parameters, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<Operand>,
}

impl WhereClause {
    /// AND the predicates together; `1 = 1` when there are none.
    pub fn from_predicates(predicates: &[Predicate]) -> Self {
        if predicates.is_empty() {
            return WhereClause {
                sql: "1 = 1".to_string(),
                params: Vec::new(),
            };
        }

        let fragments: Vec<String> = predicates.iter().map(Predicate::sql_fragment).collect();
        let params = predicates
            .iter()
            .flat_map(|p| p.operands.iter().cloned())
            .collect();

        WhereClause {
            sql: fragments.join(" AND "),
            params,
        }
    }

    /// Append one more condition with its parameters.
    pub fn and(mut self, sql: &str, params: Vec<Operand>) -> Self {
        self.sql = format!("({}) AND {}", self.sql, sql);
        self.params.extend(params);
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_keywords() {
        assert_eq!(Field::from_keyword("am"), Some(Field::Amount));
        assert_eq!(Field::from_keyword("CAT"), Some(Field::Category));
        assert_eq!(Field::from_keyword("Desc"), Some(Field::Description));
        assert_eq!(Field::from_keyword("cur"), Some(Field::Currency));
        assert_eq!(Field::from_keyword("merchant"), None);
    }

    #[test]
    fn test_operator_compatibility() {
        assert!(Predicate::like(Field::Amount, "1%").is_err());
        assert!(Predicate::regex(Field::Id, "^1").is_err());
        assert!(Predicate::between(
            Field::Date,
            Operand::Text("a".into()),
            Operand::Text("b".into())
        )
        .is_err());
        assert!(Predicate::equals(Field::Amount, Operand::Text("ten".into())).is_err());
        assert!(Predicate::new(Field::Amount, Operator::Between, vec![Operand::Number(1.0)]).is_err());
    }

    #[test]
    fn test_sql_fragment() {
        let p = Predicate::between(Field::Amount, Operand::Number(10.0), Operand::Number(25.0)).unwrap();
        assert_eq!(p.sql_fragment(), "amount BETWEEN ? AND ?");

        let p = Predicate::regex(Field::Date, "^2025-09").unwrap();
        assert_eq!(p.sql_fragment(), "date REGEXP ?");
    }

    #[test]
    fn test_where_clause() {
        let clause = WhereClause::from_predicates(&[]);
        assert_eq!(clause.sql, "1 = 1");
        assert!(clause.params.is_empty());

        let predicates = vec![
            Predicate::like(Field::Category, "HOME%").unwrap(),
            Predicate::between(Field::Id, Operand::Integer(3), Operand::Integer(7)).unwrap(),
        ];
        let clause = WhereClause::from_predicates(&predicates);
        assert_eq!(clause.sql, "category LIKE ? AND id BETWEEN ? AND ?");
        assert_eq!(
            clause.params,
            vec![
                Operand::Text("HOME%".into()),
                Operand::Integer(3),
                Operand::Integer(7)
            ]
        );

        let clause = clause.and("date <= ?", vec![Operand::Text("2025-01-01".into())]);
        assert!(clause.sql.ends_with("AND date <= ?"));
        assert_eq!(clause.params.len(), 4);
    }

    #[test]
    fn test_canonical_display() {
        let p = Predicate::between(Field::Amount, Operand::Number(10.0), Operand::Number(25.5)).unwrap();
        assert_eq!(p.to_string(), "amount between 10 and 25.5");

        let p = Predicate::equals(Field::Description, Operand::Text("coffee and cake".into())).unwrap();
        assert_eq!(p.to_string(), "description = \"coffee and cake\"");

        let p = Predicate::like(Field::Date, "2025-09%").unwrap();
        assert_eq!(p.to_string(), "date like 2025-09%");
    }
}
