//! User-supplied cost formula: an arithmetic expression over the pricing inputs.
//!
//! Supported syntax: numbers, `+ - * /`, parentheses, comparisons (`< <= > >= == !=`),
//! `and`, `or`, `not`, and the functions `if(condition, then, else)`, `min(…)`, `max(…)`
//! and `round(value, digits)`. Variables:
//!
//! - `current_price`: price before tariffs, in the display currency and unit
//! - `current_tariff`: sum of all tariffs for the hour
//! - `el_afgift`: the electricity duty component of `current_tariff`
//! - `chargeowner_tariff`: the grid operator component of `current_tariff`
//! - `hour`, `minute`, `weekday` (Monday is 0), `day`, `month`, `year`: derived from the
//!   interval timestamp

use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;

/// Named inputs a cost formula may refer to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FormulaInputs {
    pub current_price: f64,
    pub current_tariff: f64,
    pub el_afgift: f64,
    pub chargeowner_tariff: f64,
    pub now: DateTime<Tz>,
}

impl FormulaInputs {
    fn variable(&self, name: &str) -> Option<f64> {
        let value = match name {
            "current_price" => self.current_price,
            "current_tariff" => self.current_tariff,
            "el_afgift" => self.el_afgift,
            "chargeowner_tariff" => self.chargeowner_tariff,
            "hour" => f64::from(self.now.hour()),
            "minute" => f64::from(self.now.minute()),
            "weekday" => f64::from(self.now.weekday().num_days_from_monday()),
            "day" => f64::from(self.now.day()),
            "month" => f64::from(self.now.month()),
            "year" => f64::from(self.now.year()),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Clone, Debug, PartialEq, derive_more::Display, derive_more::Error)]
pub enum FormulaError {
    #[display("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[display("unknown variable `{_0}`")]
    UnknownVariable(#[error(not(source))] String),

    #[display("unknown function `{_0}`")]
    UnknownFunction(#[error(not(source))] String),

    #[display("`{name}` expects {expected} argument(s), got {actual}")]
    Arity { name: String, expected: &'static str, actual: usize },

    #[display("formula evaluated to a non-numeric value ({_0})")]
    NotANumber(#[error(not(source))] f64),
}

/// Pluggable evaluator of the per-unit additional cost.
pub trait CostFormula: Send + Sync {
    fn evaluate(&self, inputs: &FormulaInputs) -> Result<f64, FormulaError>;
}

/// Parsed arithmetic expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    root: Node,
}

impl Default for Expression {
    fn default() -> Self {
        Self { root: Node::Number(0.0) }
    }
}

impl FromStr for Expression {
    type Err = FormulaError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens: &tokens, position: 0 };
        let root = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(FormulaError::Syntax {
                position: token.position,
                message: format!("unexpected `{}`", token.kind),
            });
        }
        root.check_names()?;
        Ok(Self { root })
    }
}

impl CostFormula for Expression {
    fn evaluate(&self, inputs: &FormulaInputs) -> Result<f64, FormulaError> {
        let value = self.root.evaluate(inputs)?;
        if value.is_finite() { Ok(value) } else { Err(FormulaError::NotANumber(value)) }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinaryOperator {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Subtract => lhs - rhs,
            Self::Multiply => lhs * rhs,
            Self::Divide => lhs / rhs,
            Self::Less => truth(lhs < rhs),
            Self::LessOrEqual => truth(lhs <= rhs),
            Self::Greater => truth(lhs > rhs),
            Self::GreaterOrEqual => truth(lhs >= rhs),
            Self::Equal => truth((lhs - rhs).abs() < f64::EPSILON),
            Self::NotEqual => truth((lhs - rhs).abs() >= f64::EPSILON),
            Self::And => truth(is_true(lhs) && is_true(rhs)),
            Self::Or => truth(is_true(lhs) || is_true(rhs)),
        }
    }
}

const fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn is_true(value: f64) -> bool {
    value != 0.0
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Number(f64),
    Variable(String),
    Negate(Box<Self>),
    Not(Box<Self>),
    Binary(BinaryOperator, Box<Self>, Box<Self>),
    Call(String, Vec<Self>),
}

impl Node {
    fn check_names(&self) -> Result<(), FormulaError> {
        match self {
            Self::Number(_) => Ok(()),
            Self::Variable(name) => {
                const KNOWN: [&str; 10] = [
                    "current_price",
                    "current_tariff",
                    "el_afgift",
                    "chargeowner_tariff",
                    "hour",
                    "minute",
                    "weekday",
                    "day",
                    "month",
                    "year",
                ];
                if KNOWN.contains(&name.as_str()) {
                    Ok(())
                } else {
                    Err(FormulaError::UnknownVariable(name.clone()))
                }
            }
            Self::Negate(inner) | Self::Not(inner) => inner.check_names(),
            Self::Binary(_, lhs, rhs) => {
                lhs.check_names()?;
                rhs.check_names()
            }
            Self::Call(name, arguments) => {
                let expected = match name.as_str() {
                    "if" => (arguments.len() == 3).then_some(()).ok_or("3"),
                    "round" => (arguments.len() == 2).then_some(()).ok_or("2"),
                    "min" | "max" => (!arguments.is_empty()).then_some(()).ok_or("1 or more"),
                    _ => return Err(FormulaError::UnknownFunction(name.clone())),
                };
                if let Err(expected) = expected {
                    return Err(FormulaError::Arity {
                        name: name.clone(),
                        expected,
                        actual: arguments.len(),
                    });
                }
                arguments.iter().try_for_each(Self::check_names)
            }
        }
    }

    fn evaluate(&self, inputs: &FormulaInputs) -> Result<f64, FormulaError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Variable(name) => {
                inputs.variable(name).ok_or_else(|| FormulaError::UnknownVariable(name.clone()))
            }
            Self::Negate(inner) => Ok(-inner.evaluate(inputs)?),
            Self::Not(inner) => Ok(truth(!is_true(inner.evaluate(inputs)?))),
            Self::Binary(operator, lhs, rhs) => {
                Ok(operator.apply(lhs.evaluate(inputs)?, rhs.evaluate(inputs)?))
            }
            Self::Call(name, arguments) => match (name.as_str(), arguments.as_slice()) {
                ("if", [condition, then, otherwise]) => {
                    if is_true(condition.evaluate(inputs)?) {
                        then.evaluate(inputs)
                    } else {
                        otherwise.evaluate(inputs)
                    }
                }
                ("round", [value, digits]) => {
                    let scale = 10_f64.powf(digits.evaluate(inputs)?.trunc());
                    Ok((value.evaluate(inputs)? * scale).round() / scale)
                }
                ("min", arguments) => Self::fold(arguments, inputs, f64::min),
                ("max", arguments) => Self::fold(arguments, inputs, f64::max),
                _ => Err(FormulaError::UnknownFunction(name.clone())),
            },
        }
    }

    fn fold(
        arguments: &[Self],
        inputs: &FormulaInputs,
        f: fn(f64, f64) -> f64,
    ) -> Result<f64, FormulaError> {
        let mut values = arguments.iter().map(|argument| argument.evaluate(inputs));
        let first = values.next().ok_or_else(|| FormulaError::Arity {
            name: "min/max".to_string(),
            expected: "1 or more",
            actual: 0,
        })??;
        values.try_fold(first, |accumulator, value| Ok(f(accumulator, value?)))
    }
}

#[derive(Clone, Debug, PartialEq, derive_more::Display)]
enum TokenKind {
    #[display("{_0}")]
    Number(f64),

    #[display("{_0}")]
    Identifier(String),

    #[display("{_0}")]
    Symbol(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

const SYMBOLS: [&str; 14] =
    ["<=", ">=", "==", "!=", "+", "-", "*", "/", "(", ")", ",", "<", ">", "!"];

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut rest = source.char_indices().peekable();
    while let Some(&(position, character)) = rest.peek() {
        if character.is_whitespace() {
            rest.next();
        } else if character.is_ascii_digit() || character == '.' {
            let mut end = position;
            while let Some(&(index, character)) = rest.peek()
                && (character.is_ascii_digit() || character == '.')
            {
                end = index + character.len_utf8();
                rest.next();
            }
            let literal = &source[position..end];
            let value = literal.parse().map_err(|_| FormulaError::Syntax {
                position,
                message: format!("invalid number `{literal}`"),
            })?;
            tokens.push(Token { kind: TokenKind::Number(value), position });
        } else if character.is_alphabetic() || character == '_' {
            let mut end = position;
            while let Some(&(index, character)) = rest.peek()
                && (character.is_alphanumeric() || character == '_')
            {
                end = index + character.len_utf8();
                rest.next();
            }
            tokens.push(Token {
                kind: TokenKind::Identifier(source[position..end].to_string()),
                position,
            });
        } else {
            let symbol = SYMBOLS
                .into_iter()
                .find(|symbol| source[position..].starts_with(symbol))
                .ok_or_else(|| FormulaError::Syntax {
                    position,
                    message: format!("unexpected character `{character}`"),
                })?;
            for _ in 0..symbol.len() {
                rest.next();
            }
            tokens.push(Token { kind: TokenKind::Symbol(symbol), position });
        }
    }
    Ok(tokens)
}

/// Recursive descent over the token list, lowest precedence first.
struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map_or(0, |token| token.position + 1)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if let Some(Token { kind: TokenKind::Symbol(next), .. }) = self.peek()
            && *next == symbol
        {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if let Some(Token { kind: TokenKind::Identifier(next), .. }) = self.peek()
            && next == keyword
        {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), FormulaError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(FormulaError::Syntax {
                position: self.peek().map_or_else(|| self.end_position(), |token| token.position),
                message: format!("expected `{symbol}`"),
            })
        }
    }

    fn parse_or(&mut self) -> Result<Node, FormulaError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            lhs = Node::Binary(BinaryOperator::Or, Box::new(lhs), Box::new(self.parse_and()?));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, FormulaError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            lhs = Node::Binary(BinaryOperator::And, Box::new(lhs), Box::new(self.parse_not()?));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Node, FormulaError> {
        if self.eat_keyword("not") || self.eat_symbol("!") {
            Ok(Node::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Node, FormulaError> {
        let lhs = self.parse_sum()?;
        let operators = [
            ("<=", BinaryOperator::LessOrEqual),
            (">=", BinaryOperator::GreaterOrEqual),
            ("==", BinaryOperator::Equal),
            ("!=", BinaryOperator::NotEqual),
            ("<", BinaryOperator::Less),
            (">", BinaryOperator::Greater),
        ];
        for (symbol, operator) in operators {
            if self.eat_symbol(symbol) {
                return Ok(Node::Binary(operator, Box::new(lhs), Box::new(self.parse_sum()?)));
            }
        }
        Ok(lhs)
    }

    fn parse_sum(&mut self) -> Result<Node, FormulaError> {
        let mut lhs = self.parse_term()?;
        loop {
            let operator = if self.eat_symbol("+") {
                BinaryOperator::Add
            } else if self.eat_symbol("-") {
                BinaryOperator::Subtract
            } else {
                return Ok(lhs);
            };
            lhs = Node::Binary(operator, Box::new(lhs), Box::new(self.parse_term()?));
        }
    }

    fn parse_term(&mut self) -> Result<Node, FormulaError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let operator = if self.eat_symbol("*") {
                BinaryOperator::Multiply
            } else if self.eat_symbol("/") {
                BinaryOperator::Divide
            } else {
                return Ok(lhs);
            };
            lhs = Node::Binary(operator, Box::new(lhs), Box::new(self.parse_unary()?));
        }
    }

    fn parse_unary(&mut self) -> Result<Node, FormulaError> {
        if self.eat_symbol("-") {
            Ok(Node::Negate(Box::new(self.parse_unary()?)))
        } else if self.eat_symbol("+") {
            self.parse_unary()
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Node, FormulaError> {
        let Some(token) = self.peek().cloned() else {
            return Err(FormulaError::Syntax {
                position: self.end_position(),
                message: "unexpected end of formula".to_string(),
            });
        };
        self.position += 1;
        match token.kind {
            TokenKind::Number(value) => Ok(Node::Number(value)),
            TokenKind::Identifier(name) if self.eat_symbol("(") => {
                let mut arguments = Vec::new();
                if !self.eat_symbol(")") {
                    loop {
                        arguments.push(self.parse_or()?);
                        if self.eat_symbol(")") {
                            break;
                        }
                        self.expect_symbol(",")?;
                    }
                }
                Ok(Node::Call(name, arguments))
            }
            TokenKind::Identifier(name) => Ok(Node::Variable(name)),
            TokenKind::Symbol("(") => {
                let inner = self.parse_or()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            TokenKind::Symbol(symbol) => Err(FormulaError::Syntax {
                position: token.position,
                message: format!("unexpected `{symbol}`"),
            }),
        }
    }
}
