//! A small expression language for filtering sites, samples and annotation rows.
//!
//! Expressions combine numbers, quoted strings and variables with `|| && ! == != < <= > >= + - * /`
//! and parentheses. A single `=` is accepted as equality. Variables are resolved by the caller;
//! unknown variables evaluate to null, and null never compares equal to anything.
//!

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::ops::Range;
use std::str::FromStr;

use chumsky::Stream;
use chumsky::prelude::*;
use thiserror::Error;

/// An expression parsing error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid expression `{expression}`: {message}")]
pub struct ExprError {
  expression: String,
  message: String,
}

impl ExprError {
  fn new(expression: &str, message: impl Into<String>) -> Self {
    Self {
      expression: expression.to_string(),
      message: message.into(),
    }
  }

  fn from_errors<T>(expression: &str, errors: Vec<Simple<T>>) -> Self
  where
    T: Hash + Eq,
    Simple<T>: fmt::Display,
  {
    let message = errors
      .iter()
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join("; ");
    Self::new(expression, message)
  }
}

/// The value of an evaluated expression or variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Num(f64),
  Str(String),
}

impl Value {
  /// Truthiness of a value: non-zero numbers and non-empty strings are true.
  pub fn is_true(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Num(num) => *num != 0.0,
      Value::Str(s) => !s.is_empty(),
    }
  }

  fn from_bool(value: bool) -> Self {
    Value::Num(if value { 1.0 } else { 0.0 })
  }

  fn compare(&self, other: &Value) -> Option<Ordering> {
    match (self, other) {
      (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
      (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
      _ => None,
    }
  }
}

impl From<u32> for Value {
  fn from(value: u32) -> Self {
    Value::Num(value.into())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
  Or,
  And,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Add,
  Sub,
  Mul,
  Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
  Num(f64),
  Str(String),
  Var(String),
  Not(Box<Node>),
  Neg(Box<Node>),
  Binary(BinaryOp, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Token {
  Num(String),
  Str(String),
  Ident(String),
  Or,
  And,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Not,
  Plus,
  Minus,
  Star,
  Slash,
  LParen,
  RParen,
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Num(text) | Token::Ident(text) => write!(f, "{text}"),
      Token::Str(text) => write!(f, "\"{text}\""),
      Token::Or => write!(f, "||"),
      Token::And => write!(f, "&&"),
      Token::Eq => write!(f, "=="),
      Token::Ne => write!(f, "!="),
      Token::Lt => write!(f, "<"),
      Token::Le => write!(f, "<="),
      Token::Gt => write!(f, ">"),
      Token::Ge => write!(f, ">="),
      Token::Not => write!(f, "!"),
      Token::Plus => write!(f, "+"),
      Token::Minus => write!(f, "-"),
      Token::Star => write!(f, "*"),
      Token::Slash => write!(f, "/"),
      Token::LParen => write!(f, "("),
      Token::RParen => write!(f, ")"),
    }
  }
}

type Span = Range<usize>;

fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
  let number = filter(|c: &char| c.is_ascii_digit() || *c == '.')
    .repeated()
    .at_least(1)
    .collect::<String>()
    .map(Token::Num);

  let string = just('"')
    .ignore_then(none_of('"').repeated())
    .then_ignore(just('"'))
    .or(
      just('\'')
        .ignore_then(none_of('\'').repeated())
        .then_ignore(just('\'')),
    )
    .collect::<String>()
    .map(Token::Str);

  let ident = text::ident().map(Token::Ident);

  // Two-character operators come before their one-character prefixes.
  let operator = choice((
    just("||").to(Token::Or),
    just("&&").to(Token::And),
    just("==").to(Token::Eq),
    just("!=").to(Token::Ne),
    just("<=").to(Token::Le),
    just(">=").to(Token::Ge),
    just('<').to(Token::Lt),
    just('>').to(Token::Gt),
    just('!').to(Token::Not),
    just('=').to(Token::Eq),
    just('+').to(Token::Plus),
    just('-').to(Token::Minus),
    just('*').to(Token::Star),
    just('/').to(Token::Slash),
    just('(').to(Token::LParen),
    just(')').to(Token::RParen),
  ));

  choice((number, string, ident, operator))
    .map_with_span(|token, span| (token, span))
    .padded()
    .repeated()
    .then_ignore(end())
}

/// A left-associative chain of `operand (op operand)*`.
fn binary<P, O>(operand: P, op: O) -> impl Parser<Token, Node, Error = Simple<Token>> + Clone
where
  P: Parser<Token, Node, Error = Simple<Token>> + Clone,
  O: Parser<Token, BinaryOp, Error = Simple<Token>> + Clone,
{
  operand
    .clone()
    .then(op.then(operand).repeated())
    .foldl(|left, (op, right)| Node::Binary(op, Box::new(left), Box::new(right)))
}

fn parser() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
  recursive(|expr| {
    let number = select! { Token::Num(text) => text }.try_map(|text: String, span| {
      text
        .parse::<f64>()
        .map(Node::Num)
        .map_err(|_| Simple::custom(span, format!("invalid number `{text}`")))
    });

    let atom = choice((
      number,
      select! {
        Token::Str(s) => Node::Str(s),
        Token::Ident(name) => Node::Var(name),
      },
      expr.delimited_by(just(Token::LParen), just(Token::RParen)),
    ));

    let unary = just(Token::Not)
      .or(just(Token::Minus))
      .repeated()
      .then(atom)
      .foldr(|op, node| match op {
        Token::Not => Node::Not(Box::new(node)),
        _ => Node::Neg(Box::new(node)),
      });

    let product = binary(
      unary,
      choice((
        just(Token::Star).to(BinaryOp::Mul),
        just(Token::Slash).to(BinaryOp::Div),
      )),
    );
    let sum = binary(
      product,
      choice((
        just(Token::Plus).to(BinaryOp::Add),
        just(Token::Minus).to(BinaryOp::Sub),
      )),
    );
    let comparison = binary(
      sum,
      choice((
        just(Token::Le).to(BinaryOp::Le),
        just(Token::Ge).to(BinaryOp::Ge),
        just(Token::Lt).to(BinaryOp::Lt),
        just(Token::Gt).to(BinaryOp::Gt),
      )),
    );
    let equality = binary(
      comparison,
      choice((
        just(Token::Eq).to(BinaryOp::Eq),
        just(Token::Ne).to(BinaryOp::Ne),
      )),
    );
    let conjunction = binary(equality, just(Token::And).to(BinaryOp::And));

    binary(conjunction, just(Token::Or).to(BinaryOp::Or))
  })
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
  source: String,
  root: Node,
}

impl Expr {
  /// Get the text the expression was parsed from.
  pub fn source(&self) -> &str {
    &self.source
  }

  /// Evaluate the expression, resolving variables with `lookup`.
  pub fn eval<F>(&self, lookup: &F) -> Value
  where
    F: Fn(&str) -> Option<Value>,
  {
    eval_node(&self.root, lookup)
  }

  /// Evaluate the expression and test its truthiness.
  pub fn test<F>(&self, lookup: &F) -> bool
  where
    F: Fn(&str) -> Option<Value>,
  {
    self.eval(lookup).is_true()
  }
}

impl FromStr for Expr {
  type Err = ExprError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.trim().is_empty() {
      return Err(ExprError::new(s, "empty expression"));
    }

    let tokens = lexer()
      .parse(s)
      .map_err(|errors| ExprError::from_errors(s, errors))?;

    let len = s.chars().count();
    let root = parser()
      .then_ignore(end())
      .parse(Stream::from_iter(len..len + 1, tokens.into_iter()))
      .map_err(|errors| ExprError::from_errors(s, errors))?;

    Ok(Self {
      source: s.to_string(),
      root,
    })
  }
}

fn eval_node<F>(node: &Node, lookup: &F) -> Value
where
  F: Fn(&str) -> Option<Value>,
{
  match node {
    Node::Num(num) => Value::Num(*num),
    Node::Str(s) => Value::Str(s.clone()),
    Node::Var(name) => lookup(name).unwrap_or(Value::Null),
    Node::Not(node) => Value::from_bool(!eval_node(node, lookup).is_true()),
    Node::Neg(node) => match eval_node(node, lookup) {
      Value::Num(num) => Value::Num(-num),
      _ => Value::Null,
    },
    Node::Binary(BinaryOp::Or, left, right) => {
      Value::from_bool(eval_node(left, lookup).is_true() || eval_node(right, lookup).is_true())
    }
    Node::Binary(BinaryOp::And, left, right) => {
      Value::from_bool(eval_node(left, lookup).is_true() && eval_node(right, lookup).is_true())
    }
    Node::Binary(op, left, right) => {
      let left = eval_node(left, lookup);
      let right = eval_node(right, lookup);

      match op {
        BinaryOp::Eq => Value::from_bool(left.compare(&right) == Some(Ordering::Equal)),
        BinaryOp::Ne => Value::from_bool(left.compare(&right) != Some(Ordering::Equal)),
        BinaryOp::Lt => Value::from_bool(left.compare(&right) == Some(Ordering::Less)),
        BinaryOp::Le => Value::from_bool(matches!(
          left.compare(&right),
          Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::from_bool(left.compare(&right) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::from_bool(matches!(
          left.compare(&right),
          Some(Ordering::Greater | Ordering::Equal)
        )),
        _ => arithmetic(*op, left, right),
      }
    }
  }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Value {
  let (Value::Num(a), Value::Num(b)) = (left, right) else {
    return Value::Null;
  };

  match op {
    BinaryOp::Add => Value::Num(a + b),
    BinaryOp::Sub => Value::Num(a - b),
    BinaryOp::Mul => Value::Num(a * b),
    BinaryOp::Div if b != 0.0 => Value::Num(a / b),
    _ => Value::Null,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vars(name: &str) -> Option<Value> {
    match name {
      "AC" => Some(Value::Num(3.0)),
      "AN" => Some(Value::Num(10.0)),
      "population" => Some(Value::Str("FIN".to_string())),
      "gender" => Some(Value::Num(2.0)),
      _ => None,
    }
  }

  fn test(expression: &str) -> bool {
    expression.parse::<Expr>().unwrap().test(&vars)
  }

  #[test]
  fn numeric_comparisons() {
    assert!(test("AC > 2"));
    assert!(test("AC >= 3"));
    assert!(!test("AC < 3"));
    assert!(test("AC <= 3"));
    assert!(test("AC == 3"));
    assert!(test("AC = 3"));
    assert!(test("AC != 4"));
  }

  #[test]
  fn arithmetic_precedence() {
    assert!(test("AC / AN > .25"));
    assert!(test("AC + 1 * 2 == 5"));
    assert!(test("(AC + 1) * 2 == 8"));
    assert!(test("-AC < 0"));
  }

  #[test]
  fn logical_operators() {
    assert!(test("AC > 2 && AN == 10"));
    assert!(!test("AC > 5 && AN == 10"));
    assert!(test("AC > 5 || AN == 10"));
    assert!(test("!(AC > 5)"));
    assert!(test("population == \"FIN\" && gender == 2"));
  }

  #[test]
  fn string_comparisons() {
    assert!(test("population == 'FIN'"));
    assert!(test("population != \"CEU\""));
    assert!(!test("population == 1"));
  }

  #[test]
  fn unknown_variables_are_null() {
    assert!(!test("missing == 1"));
    assert!(test("missing != 1"));
    assert!(!test("missing"));
    assert!(test("!missing"));
  }

  #[test]
  fn division_by_zero_is_null() {
    assert!(!test("AC / 0 > 0"));
  }

  #[test]
  fn invalid_expressions() {
    for expression in ["", "AC >", "(AC > 1", "AC > 1)", "AC # 1", "\"FIN", "AC 1", "AC % 2"] {
      assert!(expression.parse::<Expr>().is_err(), "{expression}");
    }
  }

  #[test]
  fn source_is_kept() {
    assert_eq!("AC>1".parse::<Expr>().unwrap().source(), "AC>1");
  }

  #[test]
  fn prefix_operators_nest() {
    assert!(test("!!(AC > 2)"));
    assert!(test("- -AC == 3"));
    assert!(test("!AC == 0"));
  }

  #[test]
  fn comparison_binds_tighter_than_equality() {
    assert!(test("AC > 2 == 1"));
    assert!(test("1 == AC < AN"));
  }

  #[test]
  fn whitespace_is_ignored() {
    assert!(test("  AC>2&&AN==10  "));
    assert!(test("population=='FIN'"));
  }

  #[test]
  fn malformed_numbers() {
    assert!("AC > 1.2.3".parse::<Expr>().is_err());
    assert!("AC > .".parse::<Expr>().is_err());
  }

  #[test]
  fn errors_name_the_expression() {
    let error = "AC >".parse::<Expr>().unwrap_err();

    assert!(error.to_string().starts_with("invalid expression `AC >`: "));
  }
}
