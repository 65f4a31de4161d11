// Semantic filter parser.
//
// Turns short typed filters into predicates:
//
// amount between 10 and 25
// category like HOME% and date regex ^2025-09
// description = "coffee and cake"
// sql: SELECT category, SUM(amount) FROM records GROUP BY category
//
// Clauses are joined by the keyword `and` only. A clause is matched by
// token count and keywords against a fixed, ordered list of shapes; the
// first shape that fits wins.

use crate::error::{ParseError, ParseResult};
use crate::query::{Field, Filter, Operand, Predicate};

const SQL_PREFIX: &str = "sql:";

/// A whitespace-separated word, or a quoted run with its quotes stripped.
#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    /// Lower-cased text when the token can act as a keyword.
    fn keyword(&self) -> Option<String> {
        if self.quoted {
            None
        } else {
            Some(self.text.to_lowercase())
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(word)
    }

    fn is_any_keyword(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.is_keyword(w))
    }
}

const REGEX_WORDS: [&str; 3] = ["r", "regex", "regexp"];
const BETWEEN_WORDS: [&str; 2] = ["between", "b"];
const OPERATOR_WORDS: [&str; 8] = ["=", "like", "r", "regex", "regexp", "range", "between", "b"];

/// Parse a full filter line into predicates or a raw SELECT passthrough.
pub fn parse_filter(text: &str) -> ParseResult<Filter> {
    let trimmed = text.trim();

    if let Some(rest) = strip_prefix_ignore_case(trimmed, SQL_PREFIX) {
        let statement = rest.trim();
        if !statement.starts_with("SELECT") {
            return Err(ParseError::syntax(format!(
                "only SELECT statements are allowed after '{}', got '{}'",
                SQL_PREFIX, statement
            )));
        }
        return Ok(Filter::RawSelect(statement.to_string()));
    }

    if trimmed.is_empty() {
        return Ok(Filter::always());
    }

    let tokens = tokenize(trimmed)?;
    let mut predicates = Vec::new();
    for segment in split_clauses(tokens) {
        if segment.is_empty() {
            return Err(ParseError::syntax(format!(
                "empty clause in '{}': 'and' must join two clauses",
                trimmed
            )));
        }
        if let Some(predicate) = parse_clause(&segment)? {
            predicates.push(predicate);
        }
    }

    Ok(Filter::Where(predicates))
}

/// Parse a single clause. `Ok(None)` is the always-true clause.
pub fn parse_predicate(clause: &str) -> ParseResult<Option<Predicate>> {
    let tokens = tokenize(clause.trim())?;
    parse_clause(&tokens)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == c {
                    closed = true;
                    break;
                }
                text.push(ch);
            }
            if !closed {
                return Err(ParseError::syntax(format!(
                    "unterminated quote in '{}'",
                    input
                )));
            }
            tokens.push(Token { text, quoted: true });
            continue;
        }

        let mut text = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            text.push(ch);
            chars.next();
        }
        tokens.push(Token {
            text,
            quoted: false,
        });
    }

    Ok(tokens)
}

/// Split on unquoted `and`, except the one separating between-bounds.
fn split_clauses(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut segments = Vec::new();
    let mut current: Vec<Token> = Vec::new();

    for token in tokens {
        if token.is_keyword("and") && !awaiting_upper_bound(&current) {
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(token);
        }
    }
    segments.push(current);

    segments
}

fn awaiting_upper_bound(segment: &[Token]) -> bool {
    segment.len() == 3
        && segment[0]
            .keyword()
            .and_then(|w| Field::from_keyword(&w))
            .map(|f| f.is_numeric())
            .unwrap_or(false)
        && segment[1].is_any_keyword(&BETWEEN_WORDS)
}

fn clause_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| {
            if t.quoted {
                format!("\"{}\"", t.text)
            } else {
                t.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn invalid_clause(tokens: &[Token]) -> ParseError {
    ParseError::syntax(format!(
        "could not parse '{}' as a valid semantic filter",
        clause_text(tokens)
    ))
}

fn parse_float(token: &Token) -> ParseResult<Operand> {
    match token.text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Operand::Number(value)),
        _ => Err(ParseError::syntax(format!(
            "'{}' is not a valid number",
            token.text
        ))),
    }
}

fn parse_int(token: &Token) -> ParseResult<i64> {
    token
        .text
        .parse::<i64>()
        .map_err(|_| ParseError::syntax(format!("'{}' is not a valid integer", token.text)))
}

fn text(token: &Token) -> Operand {
    Operand::Text(token.text.clone())
}

fn upper(token: &Token) -> Operand {
    Operand::Text(token.text.to_uppercase())
}

fn parse_clause(tokens: &[Token]) -> ParseResult<Option<Predicate>> {
    if tokens.is_empty() {
        return Ok(None);
    }

    let field = tokens[0]
        .keyword()
        .and_then(|w| Field::from_keyword(&w))
        .ok_or_else(|| invalid_clause(tokens))?;

    // A lone operand must not be an operator keyword (`category like`)
    let bare_operand = tokens.len() == 2 && !tokens[1].is_any_keyword(&OPERATOR_WORDS);
    let op = tokens.get(1);
    let is = |word: &str| op.map(|t| t.is_keyword(word)).unwrap_or(false);
    let is_regex = op.map(|t| t.is_any_keyword(&REGEX_WORDS)).unwrap_or(false);
    let is_between = op.map(|t| t.is_any_keyword(&BETWEEN_WORDS)).unwrap_or(false);

    let predicate = match (field, tokens.len()) {
        // id
        (Field::Id, 4) if is("range") => {
            let center = parse_int(&tokens[2])?;
            let radius = parse_int(&tokens[3])?;
            let low = center.checked_sub(radius);
            let high = center.checked_add(radius);
            match (low, high) {
                (Some(low), Some(high)) => Predicate::between(
                    Field::Id,
                    Operand::Integer(low),
                    Operand::Integer(high),
                )?,
                _ => {
                    return Err(ParseError::value(format!(
                        "id range {} {} overflows",
                        center, radius
                    )))
                }
            }
        }
        (Field::Id, 5) if is_between && tokens[3].is_keyword("and") => Predicate::between(
            Field::Id,
            Operand::Integer(parse_int(&tokens[2])?),
            Operand::Integer(parse_int(&tokens[4])?),
        )?,
        (Field::Id, 3) if is("=") => {
            Predicate::equals(Field::Id, Operand::Integer(parse_int(&tokens[2])?))?
        }

        // amount
        (Field::Amount, 5) if is_between && tokens[3].is_keyword("and") => {
            Predicate::between(Field::Amount, parse_float(&tokens[2])?, parse_float(&tokens[4])?)?
        }
        (Field::Amount, 4) if is_between => {
            Predicate::between(Field::Amount, parse_float(&tokens[2])?, parse_float(&tokens[3])?)?
        }
        (Field::Amount, 3) if is("=") => Predicate::equals(Field::Amount, parse_float(&tokens[2])?)?,

        // date
        (Field::Date, 3) if is("like") => Predicate::like(Field::Date, tokens[2].text.clone())?,
        (Field::Date, 3) if is("=") => Predicate::equals(Field::Date, text(&tokens[2]))?,
        (Field::Date, 3) if is_regex => Predicate::regex(Field::Date, tokens[2].text.clone())?,
        (Field::Date, 2) if bare_operand => Predicate::like(Field::Date, tokens[1].text.clone())?,

        // category
        (Field::Category, 2) if bare_operand => Predicate::equals(Field::Category, upper(&tokens[1]))?,
        (Field::Category, 3) if is("=") => Predicate::equals(Field::Category, upper(&tokens[2]))?,
        (Field::Category, 3) if is("like") => {
            Predicate::like(Field::Category, tokens[2].text.to_uppercase())?
        }
        (Field::Category, 3) if is_regex => {
            Predicate::regex(Field::Category, tokens[2].text.to_uppercase())?
        }

        // currency
        (Field::Currency, 3) if is("=") => Predicate::equals(Field::Currency, upper(&tokens[2]))?,
        (Field::Currency, 2) if bare_operand => Predicate::equals(Field::Currency, upper(&tokens[1]))?,

        // description
        (Field::Description, 3) if is("like") => {
            Predicate::like(Field::Description, tokens[2].text.clone())?
        }
        (Field::Description, 3) if is("=") => Predicate::equals(Field::Description, text(&tokens[2]))?,
        (Field::Description, 3) if is_regex => {
            Predicate::regex(Field::Description, tokens[2].text.clone())?
        }

        _ => return Err(invalid_clause(tokens)),
    };

    Ok(Some(predicate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operator;

    fn single(text: &str) -> Predicate {
        let filter = parse_filter(text).unwrap();
        assert_eq!(filter.predicates().len(), 1, "expected one clause in '{}'", text);
        filter.predicates()[0].clone()
    }

    fn assert_shape(text: &str, field: Field, operator: Operator, operands: Vec<Operand>) {
        let p = single(text);
        assert_eq!(p.field(), field, "field of '{}'", text);
        assert_eq!(p.operator(), operator, "operator of '{}'", text);
        assert_eq!(p.operands(), operands.as_slice(), "operands of '{}'", text);
    }

    fn t(s: &str) -> Operand {
        Operand::Text(s.to_string())
    }

    #[test]
    fn test_empty_filter_is_always_true() {
        assert!(parse_filter("").unwrap().is_always());
        assert!(parse_filter("   \t ").unwrap().is_always());
    }

    #[test]
    fn test_id_shapes() {
        assert_shape(
            "id range 10 3",
            Field::Id,
            Operator::Between,
            vec![Operand::Integer(7), Operand::Integer(13)],
        );
        assert_shape("id = 42", Field::Id, Operator::Equals, vec![Operand::Integer(42)]);
        assert_shape(
            "id between 3 and 9",
            Field::Id,
            Operator::Between,
            vec![Operand::Integer(3), Operand::Integer(9)],
        );
        assert!(parse_filter("id range 10 x").unwrap_err().is_syntax());
        assert!(parse_filter("id range 1.5 2").unwrap_err().is_syntax());
    }

    #[test]
    fn test_amount_shapes() {
        let expected = vec![Operand::Number(10.0), Operand::Number(25.0)];
        assert_shape("amount between 10 and 25", Field::Amount, Operator::Between, expected.clone());
        assert_shape("am between 10 and 25", Field::Amount, Operator::Between, expected.clone());
        assert_shape("AMOUNT BETWEEN 10 AND 25", Field::Amount, Operator::Between, expected.clone());
        assert_shape("amount between 10 25", Field::Amount, Operator::Between, expected.clone());
        assert_shape("am b 10 25", Field::Amount, Operator::Between, expected);
        assert_shape("amount = 9.5", Field::Amount, Operator::Equals, vec![Operand::Number(9.5)]);

        assert!(parse_filter("amount between ten and 25").unwrap_err().is_syntax());
        assert!(parse_filter("amount like 10%").unwrap_err().is_syntax());
    }

    #[test]
    fn test_date_shapes() {
        assert_shape("date like 2025-09%", Field::Date, Operator::Like, vec![t("2025-09%")]);
        assert_shape("date 2025-09%", Field::Date, Operator::Like, vec![t("2025-09%")]);
        assert_shape("date = 2025-09-01", Field::Date, Operator::Equals, vec![t("2025-09-01")]);
        for word in ["r", "regex", "regexp", "REGEX"] {
            let text = format!("date {} ^2025-09", word);
            assert_shape(&text, Field::Date, Operator::Regex, vec![t("^2025-09")]);
        }
    }

    #[test]
    fn test_category_shapes() {
        assert_shape("category food", Field::Category, Operator::Equals, vec![t("FOOD")]);
        assert_shape("cat = food", Field::Category, Operator::Equals, vec![t("FOOD")]);
        assert_shape("cat like home%", Field::Category, Operator::Like, vec![t("HOME%")]);
        assert_shape("category regex ^HO", Field::Category, Operator::Regex, vec![t("^HO")]);
        assert!(parse_filter("category like").unwrap_err().is_syntax());
    }

    #[test]
    fn test_currency_shapes() {
        assert_shape("currency = eur", Field::Currency, Operator::Equals, vec![t("EUR")]);
        assert_shape("cur usd", Field::Currency, Operator::Equals, vec![t("USD")]);
        assert!(parse_filter("currency like e%").unwrap_err().is_syntax());
    }

    #[test]
    fn test_description_shapes() {
        assert_shape("description like %coffee%", Field::Description, Operator::Like, vec![t("%coffee%")]);
        assert_shape("desc = Rent", Field::Description, Operator::Equals, vec![t("Rent")]);
        assert_shape("desc regex ^Uber", Field::Description, Operator::Regex, vec![t("^Uber")]);
    }

    #[test]
    fn test_quoted_operands_keep_and() {
        assert_shape(
            "description = \"coffee and cake\"",
            Field::Description,
            Operator::Equals,
            vec![t("coffee and cake")],
        );
        assert_shape(
            "desc like '%bread and butter%'",
            Field::Description,
            Operator::Like,
            vec![t("%bread and butter%")],
        );
        assert!(parse_filter("desc = \"open").unwrap_err().is_syntax());
    }

    #[test]
    fn test_compound_filter() {
        let filter = parse_filter("amount between 10 and 25 and category like HOME% and cur eur").unwrap();
        let predicates = filter.predicates();
        assert_eq!(predicates.len(), 3);
        assert_eq!(predicates[0].field(), Field::Amount);
        assert_eq!(predicates[1].field(), Field::Category);
        assert_eq!(predicates[2].field(), Field::Currency);

        let filter = parse_filter("date regex ^2025 AND desc like %a%").unwrap();
        assert_eq!(filter.predicates().len(), 2);
    }

    #[test]
    fn test_compound_filter_rejects_whole_line() {
        let err = parse_filter("cat food and merchant starbucks").unwrap_err();
        assert!(err.is_syntax());
        assert!(err.to_string().contains("merchant starbucks"));

        assert!(parse_filter("cat food and").unwrap_err().is_syntax());
        assert!(parse_filter("and cat food").unwrap_err().is_syntax());
    }

    #[test]
    fn test_unknown_shapes() {
        for text in ["hello", "amount", "amount 10", "id range 1", "date like a b", "description coffee"] {
            assert!(parse_filter(text).unwrap_err().is_syntax(), "'{}' should fail", text);
        }
    }

    #[test]
    fn test_sql_passthrough() {
        let filter = parse_filter("sql: SELECT * FROM records WHERE amount > 10 and id < 5").unwrap();
        assert_eq!(
            filter,
            Filter::RawSelect("SELECT * FROM records WHERE amount > 10 and id < 5".to_string())
        );

        assert!(parse_filter("sql: DELETE FROM records").unwrap_err().is_syntax());
        assert!(parse_filter("sql: select * from records").unwrap_err().is_syntax());
    }

    #[test]
    fn test_parse_predicate() {
        assert_eq!(parse_predicate("  ").unwrap(), None);
        let p = parse_predicate("cat food").unwrap().unwrap();
        assert_eq!(p.operands(), &[t("FOOD")]);
    }

    #[test]
    fn test_canonical_form_reparses() {
        let inputs = [
            "id range 10 3",
            "id = 4",
            "amount between -5 and 12.25",
            "amount = 3",
            "date like 2025-09%",
            "date = 2025-09-01",
            "date r ^2025",
            "cat food",
            "cat like ho%",
            "cat regex ^HO",
            "cur usd",
            "desc like '%coffee and cake%'",
            "desc = \"say \"",
            "desc regex ^Uber",
        ];

        for input in inputs {
            let filter = parse_filter(input).unwrap();
            let canonical = filter.to_string();
            let reparsed = parse_filter(&canonical).unwrap();
            assert_eq!(filter, reparsed, "'{}' -> '{}'", input, canonical);
        }
    }
}
