// Amounts and currency codes
//
// `=120+35 usd` -> (155.0, "USD"). A lead `=`, `+` or `-` switches to
// arithmetic; anything else must be a plain number.

use super::arithmetic;
use crate::error::{ParseError, ParseResult};

/// Evaluate an amount expression and check it against `lower_bound`.
pub fn parse_expression(text: &str, lower_bound: f64) -> ParseResult<f64> {
    let text = text.trim();

    let value = match text.chars().next() {
        Some('=') => evaluate_words_free(&text[1..], text)?,
        // The sign is part of the expression
        Some('+') | Some('-') => evaluate_words_free(text, text)?,
        _ => text
            .parse::<f64>()
            .map_err(|_| ParseError::syntax(format!("'{}' is not a number or an arithmetic expression", text)))?,
    };

    if !value.is_finite() {
        return Err(ParseError::value(format!("'{}' is not a finite amount", text)));
    }
    if value < lower_bound {
        return Err(ParseError::value(format!(
            "'{}' must be >= '{}'",
            value, lower_bound
        )));
    }

    Ok(value)
}

fn evaluate_words_free(expression: &str, original: &str) -> ParseResult<f64> {
    if expression.chars().any(|c| c.is_alphabetic() || c == '_') {
        return Err(ParseError::syntax(format!(
            "input can't contain words, got '{}'",
            original
        )));
    }
    arithmetic::evaluate(expression)
}

/// Validate and upper-case a 3-letter currency code.
pub fn parse_currency(text: &str) -> ParseResult<String> {
    let code = text.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(ParseError::value(format!("'{}' is not a valid currency", code)))
    }
}

/// Parse `<expression> [currency]`, falling back to `default_currency`.
pub fn parse_double_currency(
    text: &str,
    default_currency: &str,
    lower_bound: f64,
) -> ParseResult<(f64, String)> {
    let text = text.trim();

    let (expression, currency) = match text.rsplit_once(char::is_whitespace) {
        Some((head, tail)) if tail.chars().all(char::is_alphabetic) => {
            (head.trim_end(), parse_currency(tail)?)
        }
        _ => (text, parse_currency(default_currency)?),
    };

    if expression.is_empty() {
        return Err(ParseError::syntax(format!("'{}' has no amount", text)));
    }

    let amount = parse_expression(expression, lower_bound)?;
    Ok((amount, currency))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_modes() {
        assert_eq!(parse_expression("=1+1", 0.0).unwrap(), 2.0);
        assert_eq!(parse_expression("+1+1", 0.0).unwrap(), 2.0);
        assert_eq!(parse_expression("10", 0.0).unwrap(), 10.0);
        assert_eq!(parse_expression("  12.5  ", 0.0).unwrap(), 12.5);
        assert_eq!(parse_expression("=(3+4)*2", 0.0).unwrap(), 14.0);
    }

    #[test]
    fn test_negative_sigil_checks_bound() {
        assert!(parse_expression("-5", 0.0).unwrap_err().is_value());
        assert_eq!(parse_expression("-5", -10.0).unwrap(), -5.0);
    }

    #[test]
    fn test_lower_bound() {
        let err = parse_expression("=2+2", 10.0).unwrap_err();
        assert!(err.is_value());
        assert!(err.to_string().contains("10"));
        assert_eq!(parse_expression("=0", 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_words_rejected() {
        let err = parse_expression("=abs(1)", 0.0).unwrap_err();
        assert!(err.is_syntax());
        assert!(err.to_string().contains("can't contain words"));
        assert!(parse_expression("=__import__", 0.0).unwrap_err().is_syntax());
        assert!(parse_expression("ten", 0.0).unwrap_err().is_syntax());
        assert!(parse_expression("", 0.0).unwrap_err().is_syntax());
        assert!(parse_expression("=", 0.0).unwrap_err().is_syntax());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(parse_expression("inf", 0.0).unwrap_err().is_value());
        assert!(parse_expression("=2**2000", 0.0).unwrap_err().is_value());
        assert!(parse_expression("=1/0", 0.0).unwrap_err().is_value());
    }

    #[test]
    fn test_deeply_nested_amount_is_an_error() {
        let parens = format!("={}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(parse_expression(&parens, 0.0).unwrap_err().is_syntax());
        let signs = format!("={}1", "-".repeat(200_000));
        assert!(parse_expression(&signs, 0.0).unwrap_err().is_syntax());
        let cell = format!("={}2{} eur", "(".repeat(100), ")".repeat(100));
        assert!(parse_double_currency(&cell, "EUR", 0.0).unwrap_err().is_syntax());
    }

    #[test]
    fn test_currency() {
        assert_eq!(parse_currency("usd").unwrap(), "USD");
        assert_eq!(parse_currency("Eur").unwrap(), "EUR");
        assert!(parse_currency("us").unwrap_err().is_value());
        assert!(parse_currency("usdx").unwrap_err().is_value());
        assert!(parse_currency("u5d").unwrap_err().is_value());
    }

    #[test]
    fn test_double_currency() {
        assert_eq!(
            parse_double_currency("=9+9 usd", "EUR", 0.0).unwrap(),
            (18.0, "USD".to_string())
        );
        assert_eq!(
            parse_double_currency("=120+35", "eur", 0.0).unwrap(),
            (155.0, "EUR".to_string())
        );
        assert_eq!(
            parse_double_currency("42   pen", "EUR", 0.0).unwrap(),
            (42.0, "PEN".to_string())
        );
        assert!(parse_double_currency("=9+9 dollars", "EUR", 0.0).unwrap_err().is_value());
        assert!(parse_double_currency("=9+9usd", "EUR", 0.0).unwrap_err().is_syntax());
        assert!(parse_double_currency("=2 usd", "EUR", 5.0).unwrap_err().is_value());
        assert!(parse_double_currency("usd", "EUR", 0.0).unwrap_err().is_syntax());
    }
}
