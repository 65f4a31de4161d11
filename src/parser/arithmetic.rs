// Arithmetic over numeric literals.
//
// A dedicated recursive-descent evaluator. There are no identifiers, so
// nothing but `+ - * / // % **`, parentheses and numbers can reach it.
//
// expr   := term (("+" | "-") term)*
// term   := unary (("*" | "/" | "//" | "%") unary)*
// unary  := ("+" | "-") unary | power
// power  := atom ("**" unary)?
// atom   := number | "(" expr ")"
//
// `**` is right-associative and binds tighter than a unary sign on its
// left, so `-2**2` is `-4`. `//` and `%` floor toward negative infinity.

use crate::error::{ParseError, ParseResult};

/// Nesting allowed for parentheses, unary signs and `**` exponents.
const MAX_DEPTH: usize = 64;
/// Tokens allowed in one expression; bounds the height of operator chains.
const MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unary {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binary {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// Syntax tree of an arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    UnaryExpr {
        op: Unary,
        child: Box<Node>,
    },
    BinaryExpr {
        op: Binary,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

/// Parse and evaluate `input` in one step.
pub fn evaluate(input: &str) -> ParseResult<f64> {
    let root = build_ast(input)?;
    eval(&root)
}

/// Parse `input` into a syntax tree without evaluating it.
pub fn build_ast(input: &str) -> ParseResult<Node> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::syntax("empty arithmetic expression"));
    }
    if tokens.len() > MAX_TOKENS {
        return Err(ParseError::syntax(format!(
            "expression is too long ({} tokens, at most {})",
            tokens.len(),
            MAX_TOKENS
        )));
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let node = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::syntax(format!(
            "unexpected {:?} in '{}'",
            token,
            input.trim()
        )));
    }
    Ok(node)
}

pub fn eval(node: &Node) -> ParseResult<f64> {
    match node {
        Node::Number(n) => Ok(*n),
        Node::UnaryExpr { op, child } => {
            let value = eval(child)?;
            Ok(match op {
                Unary::Plus => value,
                Unary::Neg => -value,
            })
        }
        Node::BinaryExpr { op, lhs, rhs } => {
            let left = eval(lhs)?;
            let right = eval(rhs)?;
            apply(*op, left, right)
        }
    }
}

fn apply(op: Binary, left: f64, right: f64) -> ParseResult<f64> {
    let division_by_zero = || ParseError::value(format!("division by zero in {} {:?} {}", left, op, right));

    match op {
        Binary::Add => Ok(left + right),
        Binary::Sub => Ok(left - right),
        Binary::Mul => Ok(left * right),
        Binary::Div => {
            if right == 0.0 {
                return Err(division_by_zero());
            }
            Ok(left / right)
        }
        Binary::FloorDiv => {
            if right == 0.0 {
                return Err(division_by_zero());
            }
            Ok((left / right).floor())
        }
        Binary::Mod => {
            if right == 0.0 {
                return Err(division_by_zero());
            }
            // Result takes the sign of the divisor
            Ok(left - right * (left / right).floor())
        }
        Binary::Pow => {
            if left == 0.0 && right < 0.0 {
                return Err(division_by_zero());
            }
            Ok(left.powf(right))
        }
    }
}

// ============================================================================
// TOKENIZER
// ============================================================================

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if next == Some('*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ParseError::syntax(format!("invalid number '{}'", literal)))?;
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(ParseError::syntax(format!(
                    "unexpected character '{}' in '{}'",
                    other,
                    input.trim()
                )));
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::syntax("expression nests too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> ParseResult<Node> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Binary::Add,
                Some(Token::Minus) => Binary::Sub,
                _ => return Ok(node),
            };
            self.advance();
            let rhs = self.term()?;
            node = binary(op, node, rhs);
        }
    }

    fn term(&mut self) -> ParseResult<Node> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Binary::Mul,
                Some(Token::Slash) => Binary::Div,
                Some(Token::DoubleSlash) => Binary::FloorDiv,
                Some(Token::Percent) => Binary::Mod,
                _ => return Ok(node),
            };
            self.advance();
            let rhs = self.unary()?;
            node = binary(op, node, rhs);
        }
    }

    fn unary(&mut self) -> ParseResult<Node> {
        let op = match self.peek() {
            Some(Token::Plus) => Unary::Plus,
            Some(Token::Minus) => Unary::Neg,
            _ => return self.power(),
        };
        self.advance();
        let child = self.nested(Self::unary)?;
        Ok(Node::UnaryExpr {
            op,
            child: Box::new(child),
        })
    }

    fn power(&mut self) -> ParseResult<Node> {
        let base = self.atom()?;
        if self.peek() == Some(Token::DoubleStar) {
            self.advance();
            let exponent = self.nested(Self::unary)?;
            return Ok(binary(Binary::Pow, base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> ParseResult<Node> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Node::Number(n)),
            Some(Token::LParen) => {
                let node = self.nested(Self::expr)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err(ParseError::syntax("missing closing parenthesis")),
                }
            }
            Some(token) => Err(ParseError::syntax(format!("unexpected {:?}", token))),
            None => Err(ParseError::syntax("expression ends early")),
        }
    }
}

fn binary(op: Binary, lhs: Node, rhs: Node) -> Node {
    Node::BinaryExpr {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operators() {
        assert_eq!(evaluate("1+1").unwrap(), 2.0);
        assert_eq!(evaluate("120 + 35").unwrap(), 155.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("2*3+4").unwrap(), 10.0);
        assert_eq!(evaluate("2*(3+4)").unwrap(), 14.0);
        assert_eq!(evaluate("7/2").unwrap(), 3.5);
        assert_eq!(evaluate("0.5 + .25").unwrap(), 0.75);
    }

    #[test]
    fn test_floor_division_and_modulo() {
        assert_eq!(evaluate("7//2").unwrap(), 3.0);
        assert_eq!(evaluate("-7//2").unwrap(), -4.0);
        assert_eq!(evaluate("7%3").unwrap(), 1.0);
        assert_eq!(evaluate("-7%3").unwrap(), 2.0);
        assert_eq!(evaluate("7%-3").unwrap(), -2.0);
    }

    #[test]
    fn test_power() {
        assert_eq!(evaluate("2**10").unwrap(), 1024.0);
        assert_eq!(evaluate("2**3**2").unwrap(), 512.0);
        assert_eq!(evaluate("-2**2").unwrap(), -4.0);
        assert_eq!(evaluate("2**-1").unwrap(), 0.5);
    }

    #[test]
    fn test_unary_signs() {
        assert_eq!(evaluate("-5").unwrap(), -5.0);
        assert_eq!(evaluate("+5").unwrap(), 5.0);
        assert_eq!(evaluate("--5").unwrap(), 5.0);
        assert_eq!(evaluate("3 - -2").unwrap(), 5.0);
    }

    #[test]
    fn test_division_by_zero_is_value_error() {
        assert!(evaluate("1/0").unwrap_err().is_value());
        assert!(evaluate("1//0").unwrap_err().is_value());
        assert!(evaluate("1%0").unwrap_err().is_value());
        assert!(evaluate("0**-1").unwrap_err().is_value());
    }

    #[test]
    fn test_malformed_is_syntax_error() {
        for input in ["", "   ", "1+", "(1+2", "1+2)", "1 2", "1..2", "*3", "()", "1 ^ 2", "abs(1)"] {
            assert!(evaluate(input).unwrap_err().is_syntax(), "'{}' should fail", input);
        }
    }

    #[test]
    fn test_deep_nesting_is_syntax_error() {
        let shallow = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);

        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(evaluate(&deep).unwrap_err().is_syntax());

        let parens = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(evaluate(&parens).unwrap_err().is_syntax());

        let signs = format!("{}1", "-".repeat(200_000));
        assert!(evaluate(&signs).unwrap_err().is_syntax());
        assert!(evaluate(&format!("{}1", "-".repeat(40))).is_ok());

        let powers = vec!["1"; 100].join("**");
        assert!(evaluate(&powers).unwrap_err().is_syntax());
    }

    #[test]
    fn test_long_chain_is_syntax_error() {
        let short = vec!["1"; 200].join("+");
        assert_eq!(evaluate(&short).unwrap(), 200.0);

        let long = vec!["1"; 100_000].join("+");
        assert!(evaluate(&long).unwrap_err().is_syntax());
    }

    #[test]
    fn test_ast_shape() {
        let node = build_ast("1+2*3").unwrap();
        match node {
            Node::BinaryExpr { op, rhs, .. } => {
                assert_eq!(op, Binary::Add);
                assert!(matches!(*rhs, Node::BinaryExpr { op: Binary::Mul, .. }));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }
}
