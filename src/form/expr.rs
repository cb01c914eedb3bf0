//! A small, side-effect free expression language for node conditions.
//!
//! ```text
//! expr     := or
//! or       := and ("||" and)*
//! and      := equality ("&&" equality)*
//! equality := relation (("==" | "!=" | "===" | "!==") relation)*
//! relation := unary (("<" | "<=" | ">" | ">=") unary)*
//! unary    := "!" unary | primary
//! primary  := literal | path | "(" expr ")"
//! path     := ident ("." ident)*
//! ```

use std::{cmp::Ordering, collections::BTreeSet, fmt, str::FromStr};

use serde_json::Value;

use crate::{domain::Record, error::ExprError};

/// Name lookup used while evaluating an expression.
pub trait Scope {
    fn get(&self, name: &str) -> Option<&Value>;
}

impl Scope for Record {
    fn get(&self, name: &str) -> Option<&Value> {
        serde_json::Map::get(self, name)
    }
}

/// Looks names up in `first`, then in `second`.
pub struct Layered<'a, A: ?Sized, B: ?Sized> {
    pub first: &'a A,
    pub second: &'a B,
}

impl<A: Scope + ?Sized, B: Scope + ?Sized> Scope for Layered<'_, A, B> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.first.get(name).or_else(|| self.second.get(name))
    }
}

/// A runtime value. `Undefined` is kept apart from JSON `null` so that strict
/// equality can tell them apart.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Undefined,
    Value(Value),
}

impl Operand {
    pub fn truthy(&self) -> bool {
        match self {
            Operand::Undefined => false,
            Operand::Value(value) => match value {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
                Value::String(s) => !s.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }

    fn is_nullish(&self) -> bool {
        matches!(self, Operand::Undefined | Operand::Value(Value::Null))
    }

    fn to_number(&self) -> f64 {
        match self {
            Operand::Undefined => f64::NAN,
            Operand::Value(value) => match value {
                Value::Null => 0.0,
                Value::Bool(b) => f64::from(u8::from(*b)),
                Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
                Value::String(s) => string_to_number(s),
                Value::Array(_) | Value::Object(_) => f64::NAN,
            },
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::LooseEq => "==",
            CompareOp::LooseNe => "!=",
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Undefined,
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// Root names this expression reads.
    pub fn collect_identifiers(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::Path(segments) => {
                if let Some(root) = segments.first() {
                    out.insert(root.clone());
                }
            }
            Expression::Not(inner) => inner.collect_identifiers(out),
            Expression::And(l, r) | Expression::Or(l, r) | Expression::Compare(_, l, r) => {
                l.collect_identifiers(out);
                r.collect_identifiers(out);
            }
            Expression::Undefined | Expression::Literal(_) => {}
        }
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Operand, ExprError> {
        match self {
            Expression::Undefined => Ok(Operand::Undefined),
            Expression::Literal(value) => Ok(Operand::Value(value.clone())),
            Expression::Path(segments) => resolve_path(segments, scope),
            Expression::Not(inner) => Ok(Operand::Value(Value::Bool(
                !inner.evaluate(scope)?.truthy(),
            ))),
            Expression::And(l, r) => {
                let left = l.evaluate(scope)?;
                if left.truthy() { r.evaluate(scope) } else { Ok(left) }
            }
            Expression::Or(l, r) => {
                let left = l.evaluate(scope)?;
                if left.truthy() { Ok(left) } else { r.evaluate(scope) }
            }
            Expression::Compare(op, l, r) => {
                let left = l.evaluate(scope)?;
                let right = r.evaluate(scope)?;
                Ok(Operand::Value(Value::Bool(compare(*op, &left, &right))))
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Undefined => write!(f, "undefined"),
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::Path(segments) => write!(f, "{}", segments.join(".")),
            Expression::Not(inner) => write!(f, "!{inner}"),
            Expression::And(l, r) => write!(f, "({l} && {r})"),
            Expression::Or(l, r) => write!(f, "({l} || {r})"),
            Expression::Compare(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
        }
    }
}

fn resolve_path(segments: &[String], scope: &dyn Scope) -> Result<Operand, ExprError> {
    let Some((root, members)) = segments.split_first() else {
        return Ok(Operand::Undefined);
    };
    let mut current = match scope.get(root) {
        Some(value) => Operand::Value(value.clone()),
        None => return Err(ExprError::UnknownIdentifier(root.clone())),
    };
    for member in members {
        current = match current {
            Operand::Undefined => {
                return Err(ExprError::NullMember {
                    member: member.clone(),
                    target: "undefined",
                });
            }
            Operand::Value(Value::Null) => {
                return Err(ExprError::NullMember {
                    member: member.clone(),
                    target: "null",
                });
            }
            Operand::Value(Value::Object(map)) => map
                .get(member)
                .cloned()
                .map_or(Operand::Undefined, Operand::Value),
            Operand::Value(Value::Array(items)) => member_of_array(&items, member),
            Operand::Value(Value::String(s)) if member == "length" => {
                Operand::Value(Value::from(s.chars().count()))
            }
            Operand::Value(_) => Operand::Undefined,
        };
    }
    Ok(current)
}

fn member_of_array(items: &[Value], member: &str) -> Operand {
    if member == "length" {
        return Operand::Value(Value::from(items.len()));
    }
    member
        .parse::<usize>()
        .ok()
        .and_then(|index| items.get(index).cloned())
        .map_or(Operand::Undefined, Operand::Value)
}

fn compare(op: CompareOp, left: &Operand, right: &Operand) -> bool {
    match op {
        CompareOp::LooseEq => loose_eq(left, right),
        CompareOp::LooseNe => !loose_eq(left, right),
        CompareOp::StrictEq => strict_eq(left, right),
        CompareOp::StrictNe => !strict_eq(left, right),
        CompareOp::Less => relation(left, right) == Some(Ordering::Less),
        CompareOp::LessOrEqual => matches!(
            relation(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Greater => relation(left, right) == Some(Ordering::Greater),
        CompareOp::GreaterOrEqual => matches!(
            relation(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn strict_eq(left: &Operand, right: &Operand) -> bool {
    match (left, right) {
        (Operand::Undefined, Operand::Undefined) => true,
        (Operand::Value(Value::Number(a)), Operand::Value(Value::Number(b))) => {
            a.as_f64() == b.as_f64()
        }
        (Operand::Value(a), Operand::Value(b)) => a == b,
        _ => false,
    }
}

fn loose_eq(left: &Operand, right: &Operand) -> bool {
    if left.is_nullish() || right.is_nullish() {
        return left.is_nullish() && right.is_nullish();
    }
    let (Operand::Value(a), Operand::Value(b)) = (left, right) else {
        return false;
    };
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => left.to_number() == right.to_number(),
    }
}

fn relation(left: &Operand, right: &Operand) -> Option<Ordering> {
    if let (Operand::Value(Value::String(a)), Operand::Value(Value::String(b))) = (left, right) {
        return Some(a.cmp(b));
    }
    left.to_number().partial_cmp(&right.to_number())
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Expression,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.or()?;
        if let Some(token) = parser.peek() {
            return Err(token.unexpected());
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expression {
        &self.root
    }

    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.root.collect_identifiers(&mut out);
        out
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Operand, ExprError> {
        self.root.evaluate(scope)
    }

    /// Truthiness of the result.
    pub fn test(&self, scope: &dyn Scope) -> Result<bool, ExprError> {
        self.evaluate(scope).map(|value| value.truthy())
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Expr::parse(source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    Dot,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

impl Token {
    fn unexpected(&self) -> ExprError {
        let found = match &self.kind {
            TokenKind::Number(n) => n.to_string(),
            TokenKind::Str(s) => format!("{s:?}"),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Op(op) => op.to_string(),
            TokenKind::Dot => ".".to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
        };
        ExprError::UnexpectedToken {
            found,
            offset: self.offset,
        }
    }
}

/// Longest operators first.
const OPERATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!",
];

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let kind = match ch {
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            '.' => {
                chars.next();
                TokenKind::Dot
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(ExprError::UnterminatedString(offset));
                }
                TokenKind::Str(text)
            }
            c if c.is_ascii_digit() => {
                let mut end = offset;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &source[offset..end];
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedToken {
                        found: literal.to_string(),
                        offset,
                    })?;
                TokenKind::Number(number)
            }
            c if is_ident_start(c) => {
                let mut end = offset;
                while let Some(&(i, c)) = chars.peek() {
                    if is_ident_continue(c) {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(source[offset..end].to_string())
            }
            _ => {
                let rest = &source[offset..];
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(ExprError::UnexpectedChar { ch, offset });
                };
                for _ in 0..op.len() {
                    chars.next();
                }
                TokenKind::Op(*op)
            }
        };
        tokens.push(Token { kind, offset });
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_op(&mut self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) if candidates.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let right = self.and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.equality()?;
        while self.eat_op(&["&&"]).is_some() {
            let right = self.equality()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.relation()?;
        while let Some(op) = self.eat_op(&["==", "!=", "===", "!=="]) {
            let op = match op {
                "==" => CompareOp::LooseEq,
                "!=" => CompareOp::LooseNe,
                "===" => CompareOp::StrictEq,
                _ => CompareOp::StrictNe,
            };
            let right = self.relation()?;
            left = Expression::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn relation(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["<", "<=", ">", ">="]) {
            let op = match op {
                "<" => CompareOp::Less,
                "<=" => CompareOp::LessOrEqual,
                ">" => CompareOp::Greater,
                _ => CompareOp::GreaterOrEqual,
            };
            let right = self.unary()?;
            left = Expression::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, ExprError> {
        if self.eat_op(&["!"]).is_some() {
            return Ok(Expression::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, ExprError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expression::Literal(Value::from(n))),
            TokenKind::Str(s) => Ok(Expression::Literal(Value::String(s))),
            TokenKind::LParen => {
                let inner = self.or()?;
                match self.next()? {
                    Token {
                        kind: TokenKind::RParen,
                        ..
                    } => Ok(inner),
                    other => Err(other.unexpected()),
                }
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expression::Literal(Value::Bool(true))),
                "false" => Ok(Expression::Literal(Value::Bool(false))),
                "null" => Ok(Expression::Literal(Value::Null)),
                "undefined" => Ok(Expression::Undefined),
                _ => self.path(name),
            },
            TokenKind::Op(_) | TokenKind::Dot | TokenKind::RParen => Err(token.unexpected()),
        }
    }

    fn path(&mut self, root: String) -> Result<Expression, ExprError> {
        let mut segments = vec![root];
        while matches!(
            self.peek(),
            Some(Token {
                kind: TokenKind::Dot,
                ..
            })
        ) {
            self.pos += 1;
            let token = self.next()?;
            match token.kind {
                TokenKind::Ident(member) => segments.push(member),
                TokenKind::Number(n) if n.fract() == 0.0 => segments.push(format!("{n}")),
                _ => return Err(token.unexpected()),
            }
        }
        Ok(Expression::Path(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(raw: Value) -> Record {
        raw.as_object().cloned().unwrap()
    }

    fn eval(source: &str, values: &Record) -> bool {
        Expr::parse(source).unwrap().test(values).unwrap()
    }

    #[test]
    fn loose_and_strict_equality() {
        let values = scope(json!({"n": 1, "s": "1", "empty": "", "nothing": null}));
        assert!(eval("n == s", &values));
        assert!(!eval("n === s", &values));
        assert!(eval("n === 1", &values));
        assert!(eval("nothing == undefined", &values));
        assert!(!eval("nothing === undefined", &values));
        assert!(eval("empty == 0", &values));
        assert!(eval("empty != 'x'", &values));
    }

    #[test]
    fn truthiness_and_short_circuit() {
        let values = scope(json!({"role": "admin", "count": 0, "tags": []}));
        assert!(eval("role && !count", &values));
        assert!(eval("tags", &values));
        assert!(!eval("count || ''", &values));
        // the right side is never evaluated, so the unknown name is fine
        assert!(eval("role || missing", &values));
    }

    #[test]
    fn relations_on_numbers_and_strings() {
        let values = scope(json!({"age": 17, "name": "b"}));
        assert!(eval("age < 18 && age >= 17", &values));
        assert!(eval("name > 'a'", &values));
        assert!(!eval("age > '20'", &values));
        assert!(eval("!(age > 20)", &values));
    }

    #[test]
    fn dotted_member_access() {
        let values = scope(json!({"user": {"roles": ["a", "b"], "name": "x"}}));
        assert!(eval("user.name == 'x'", &values));
        assert!(eval("user.roles.length == 2", &values));
        assert!(eval("user.roles.1 === 'b'", &values));
        assert!(eval("user.missing === undefined", &values));
    }

    #[test]
    fn layered_scope_prefers_first() {
        let deps = scope(json!({"mode": "edit"}));
        let context = scope(json!({"mode": "view", "locale": "de"}));
        let layered = Layered {
            first: &deps,
            second: &context,
        };
        let expr = Expr::parse("mode == 'edit' && locale == 'de'").unwrap();
        assert!(expr.test(&layered).unwrap());
        assert_eq!(
            expr.identifiers().into_iter().collect::<Vec<_>>(),
            vec!["locale", "mode"]
        );
    }

    #[test]
    fn reports_errors() {
        let empty = Record::new();
        assert_eq!(
            Expr::parse("a ==").unwrap_err(),
            ExprError::UnexpectedEnd
        );
        assert!(matches!(
            Expr::parse("a = b").unwrap_err(),
            ExprError::UnexpectedChar { ch: '=', offset: 2 }
        ));
        assert_eq!(
            Expr::parse("'open").unwrap_err(),
            ExprError::UnterminatedString(0)
        );
        assert!(matches!(
            Expr::parse("(a b)").unwrap_err(),
            ExprError::UnexpectedToken { .. }
        ));
        assert_eq!(
            Expr::parse("ghost").unwrap().test(&empty).unwrap_err(),
            ExprError::UnknownIdentifier("ghost".to_string())
        );
        let nulls = scope(json!({"a": null}));
        assert!(matches!(
            Expr::parse("a.b").unwrap().test(&nulls).unwrap_err(),
            ExprError::NullMember { target: "null", .. }
        ));
    }

    #[test]
    fn code_is_never_executed() {
        assert!(Expr::parse("alert(1)").is_err());
        assert!(Expr::parse("a; b").is_err());
        assert!(Expr::parse("x = 1").is_err());
    }
}
