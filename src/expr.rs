//! Transform expression language
//!
//! A constrained, directly-interpreted expression language for data
//! reshaping — field access, arithmetic, list/object literals, and a fixed
//! set of utility functions. No general-purpose scripting VM; the grammar is
//! parsed by a small recursive-descent parser and evaluated against a JSON
//! scope.
//!
//! ```text
//! expr     := additive
//! additive := multiplicative (("+" | "-") multiplicative)*
//! multiplicative := unary (("*" | "/" | "%") unary)*
//! unary    := "-" unary | postfix
//! postfix  := primary ("." segment)*        segment := ident | integer | "*"
//! primary  := number | string | true | false | null
//!           | ident | ident "(" args ")" | object | array | "(" expr ")"
//! ```
//!
//! Utility functions: `compact`, `sortBy`, `groupBy`, `sum`, `average`,
//! `median`. Paths that miss resolve to `null`; arithmetic on non-numbers is
//! an error.

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::reference::{walk, Segment};

/// Evaluation or parse failure, with a message naming the construct.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError(pub String);

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ExprError {}

fn err<T>(msg: impl Into<String>) -> Result<T, ExprError> {
    Err(ExprError(msg.into()))
}

/// Parse and evaluate a script against a scope object.
pub fn evaluate(script: &str, scope: &Value) -> Result<Value, ExprError> {
    let tokens = lex(script)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    parser.expect_end()?;
    eval(&expr, scope)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Num(f64),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

fn lex(src: &str) -> Result<Vec<Tok>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {}
            '{' => tokens.push(Tok::LBrace),
            '}' => tokens.push(Tok::RBrace),
            '[' => tokens.push(Tok::LBracket),
            ']' => tokens.push(Tok::RBracket),
            '(' => tokens.push(Tok::LParen),
            ')' => tokens.push(Tok::RParen),
            ',' => tokens.push(Tok::Comma),
            ':' => tokens.push(Tok::Colon),
            '.' => tokens.push(Tok::Dot),
            '+' => tokens.push(Tok::Plus),
            '-' => tokens.push(Tok::Minus),
            '*' => tokens.push(Tok::Star),
            '/' => tokens.push(Tok::Slash),
            '%' => tokens.push(Tok::Percent),
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, ch)) if ch == quote => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, esc)) => s.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            }),
                            None => return err("unterminated string literal"),
                        },
                        Some((_, ch)) => s.push(ch),
                        None => return err("unterminated string literal"),
                    }
                }
                tokens.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut end = i + c.len_utf8();
                while let Some(&(j, ch)) = chars.peek() {
                    if ch.is_ascii_digit() {
                        chars.next();
                        end = j + 1;
                    } else if ch == '.' {
                        // Only part of the number when a digit follows;
                        // otherwise it is a path dot (e.g. 0.name is not valid
                        // anyway, but items.0.x must lex as Dot Num Dot Ident)
                        let mut ahead = chars.clone();
                        ahead.next();
                        match ahead.peek() {
                            Some((_, d)) if d.is_ascii_digit() => {
                                chars.next();
                                end = j + 1;
                                while let Some(&(k, d2)) = chars.peek() {
                                    if d2.is_ascii_digit() {
                                        chars.next();
                                        end = k + 1;
                                    } else {
                                        break;
                                    }
                                }
                                break;
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                let text = &src[start..end];
                match text.parse::<f64>() {
                    Ok(n) => tokens.push(Tok::Num(n)),
                    Err(_) => return err(format!("invalid number '{}'", text)),
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                let mut end = i + c.len_utf8();
                while let Some(&(j, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        chars.next();
                        end = j + 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Ident(src[start..end].to_string()));
            }
            other => return err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    /// Scope lookup root (an identifier).
    Var(String),
    /// `expr.seg.seg` — path access on an evaluated base.
    Access(Box<Expr>, Vec<Segment>),
    Call(String, Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Unary(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ExprError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            err(format!("expected {:?}, found {:?}", tok, self.peek()))
        }
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => err(format!("unexpected trailing {:?}", tok)),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        self.additive()
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => '+',
                Some(Tok::Minus) => '-',
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => '*',
                Some(Tok::Slash) => '/',
                Some(Tok::Percent) => '%',
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Unary(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        let mut segments = Vec::new();
        while self.eat(&Tok::Dot) {
            match self.next() {
                Some(Tok::Ident(name)) => segments.push(Segment::Key(name)),
                Some(Tok::Num(n)) if n.fract() == 0.0 => {
                    segments.push(Segment::Key((n as u64).to_string()))
                }
                Some(Tok::Star) => segments.push(Segment::Wildcard),
                other => return err(format!("invalid path segment after '.': {:?}", other)),
            }
        }
        if segments.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Access(Box::new(base), segments))
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(Expr::Literal(number(n))),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => {
                    if self.eat(&Tok::LParen) {
                        let mut args = Vec::new();
                        if !self.eat(&Tok::RParen) {
                            loop {
                                args.push(self.expr()?);
                                if self.eat(&Tok::RParen) {
                                    break;
                                }
                                self.expect(Tok::Comma)?;
                            }
                        }
                        Ok(Expr::Call(name, args))
                    } else {
                        Ok(Expr::Var(name))
                    }
                }
            },
            Some(Tok::LBrace) => {
                let mut fields = Vec::new();
                if !self.eat(&Tok::RBrace) {
                    loop {
                        let key = match self.next() {
                            Some(Tok::Ident(k)) => k,
                            Some(Tok::Str(k)) => k,
                            other => return err(format!("invalid object key: {:?}", other)),
                        };
                        self.expect(Tok::Colon)?;
                        fields.push((key, self.expr()?));
                        if self.eat(&Tok::RBrace) {
                            break;
                        }
                        self.expect(Tok::Comma)?;
                        // Trailing comma
                        if self.eat(&Tok::RBrace) {
                            break;
                        }
                    }
                }
                Ok(Expr::Object(fields))
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Tok::RBracket) {
                    loop {
                        items.push(self.expr()?);
                        if self.eat(&Tok::RBracket) {
                            break;
                        }
                        self.expect(Tok::Comma)?;
                        if self.eat(&Tok::RBracket) {
                            break;
                        }
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(Tok::LParen) => {
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            other => err(format!("unexpected token: {:?}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, scope: &Value) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => Ok(scope.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Access(base, segments) => {
            let base = eval(base, scope)?;
            Ok(walk(&base, segments).unwrap_or(Value::Null))
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
        Expr::Object(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), eval(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|i| eval(i, scope))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Expr::Unary(inner) => {
            let v = eval(inner, scope)?;
            Ok(number(-as_number(&v, "unary '-'")?))
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, scope)?;
            let r = eval(right, scope)?;
            // String concatenation mirrors the template join rules
            if *op == '+' && (l.is_string() || r.is_string()) {
                return Ok(Value::String(format!("{}{}", stringify(&l), stringify(&r))));
            }
            let (l, r) = (
                as_number(&l, &format!("'{}'", op))?,
                as_number(&r, &format!("'{}'", op))?,
            );
            let result = match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r == 0.0 {
                        return err("division by zero");
                    }
                    l / r
                }
                '%' => {
                    if r == 0.0 {
                        return err("modulo by zero");
                    }
                    l % r
                }
                _ => return err(format!("unknown operator '{}'", op)),
            };
            Ok(number(result))
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value, what: &str) -> Result<f64, ExprError> {
    value
        .as_f64()
        .ok_or_else(|| ExprError(format!("{} requires a number, got {}", what, type_name(value))))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integral results render as integers.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Utility functions
// ---------------------------------------------------------------------------

fn call(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "compact" => {
            let [n] = take::<1>(name, args)?;
            Ok(Value::String(compact(as_number(&n, "compact")?)))
        }
        "sortBy" => {
            let (arr, key, desc) = match args.len() {
                2 => {
                    let [a, k] = take::<2>(name, args)?;
                    (a, k, false)
                }
                3 => {
                    let [a, k, d] = take::<3>(name, args)?;
                    (a, k, d.as_str() == Some("desc"))
                }
                n => return err(format!("sortBy takes 2 or 3 arguments, got {}", n)),
            };
            sort_by(arr, &key_arg(&key, "sortBy")?, desc)
        }
        "groupBy" => {
            let [arr, key] = take::<2>(name, args)?;
            group_by(arr, &key_arg(&key, "groupBy")?)
        }
        "sum" => numeric_fold(name, args, |nums| nums.iter().sum()),
        "average" => numeric_fold(name, args, |nums| {
            if nums.is_empty() {
                0.0
            } else {
                nums.iter().sum::<f64>() / nums.len() as f64
            }
        }),
        "median" => numeric_fold(name, args, |nums| {
            if nums.is_empty() {
                return 0.0;
            }
            let mut sorted = nums.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }),
        other => err(format!("unknown function '{}'", other)),
    }
}

fn take<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], ExprError> {
    args.try_into()
        .map_err(|v: Vec<Value>| ExprError(format!("{} takes {} arguments, got {}", name, N, v.len())))
}

fn key_arg(key: &Value, func: &str) -> Result<String, ExprError> {
    key.as_str()
        .map(String::from)
        .ok_or_else(|| ExprError(format!("{} key must be a string", func)))
}

/// `sum`/`average`/`median` accept an array of numbers, or an array of
/// objects plus a key to project.
fn numeric_fold(name: &str, args: Vec<Value>, fold: impl Fn(&[f64]) -> f64) -> Result<Value, ExprError> {
    let (arr, key) = match args.len() {
        1 => {
            let [a] = take::<1>(name, args)?;
            (a, None)
        }
        2 => {
            let [a, k] = take::<2>(name, args)?;
            (a, Some(key_arg(&k, name)?))
        }
        n => return err(format!("{} takes 1 or 2 arguments, got {}", name, n)),
    };
    let items = arr
        .as_array()
        .ok_or_else(|| ExprError(format!("{} requires an array, got {}", name, type_name(&arr))))?;

    let mut nums = Vec::with_capacity(items.len());
    for item in items {
        let value = match &key {
            Some(k) => item.get(k).cloned().unwrap_or(Value::Null),
            None => item.clone(),
        };
        nums.push(as_number(&value, name)?);
    }
    Ok(number(fold(&nums)))
}

fn sort_by(arr: Value, key: &str, desc: bool) -> Result<Value, ExprError> {
    let mut items = arr
        .as_array()
        .ok_or_else(|| ExprError(format!("sortBy requires an array, got {}", type_name(&arr))))?
        .clone();

    items.sort_by(|a, b| {
        let (a, b) = (a.get(key), b.get(key));
        let ord = match (a.and_then(Value::as_f64), b.and_then(Value::as_f64)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => {
                let (x, y) = (
                    a.and_then(Value::as_str).unwrap_or(""),
                    b.and_then(Value::as_str).unwrap_or(""),
                );
                x.cmp(y)
            }
        };
        if desc {
            ord.reverse()
        } else {
            ord
        }
    });
    Ok(Value::Array(items))
}

fn group_by(arr: Value, key: &str) -> Result<Value, ExprError> {
    let items = arr
        .as_array()
        .ok_or_else(|| ExprError(format!("groupBy requires an array, got {}", type_name(&arr))))?;

    let mut groups: Map<String, Value> = Map::new();
    for item in items {
        let bucket = match item.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "null".to_string(),
        };
        groups
            .entry(bucket)
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .expect("group buckets are arrays")
            .push(item.clone());
    }
    Ok(Value::Object(groups))
}

/// Dashboard-style numeric compacting: 1234 → "1.2K", 5_600_000 → "5.6M".
fn compact(n: f64) -> String {
    let (value, suffix) = if n.abs() >= 1e9 {
        (n / 1e9, "B")
    } else if n.abs() >= 1e6 {
        (n / 1e6, "M")
    } else if n.abs() >= 1e3 {
        (n / 1e3, "K")
    } else {
        return number(n).to_string();
    };
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}{}", rounded as i64, suffix)
    } else {
        format!("{:.1}{}", rounded, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(script: &str, scope: Value) -> Result<Value, ExprError> {
        evaluate(script, &scope)
    }

    #[test]
    fn object_literal_with_arithmetic() {
        let result = run("{ out: x * 2 }", json!({"x": 5})).unwrap();
        assert_eq!(result, json!({"out": 10}));
    }

    #[test]
    fn sums_two_scope_values() {
        let result = run("{ out: a + b }", json!({"a": 5, "b": 10})).unwrap();
        assert_eq!(result, json!({"out": 15}));
    }

    #[test]
    fn path_access_with_wildcard() {
        let scope = json!({"report": {"rows": [{"views": 10}, {"views": 32}]}});
        let result = run("{ total: sum(report.rows.*.views) }", scope).unwrap();
        assert_eq!(result, json!({"total": 42}));
    }

    #[test]
    fn missing_path_resolves_to_null() {
        let result = run("{ v: nothing.here }", json!({})).unwrap();
        assert_eq!(result, json!({"v": null}));
    }

    #[test]
    fn arithmetic_on_null_is_an_error() {
        let error = run("{ v: missing + 1 }", json!({})).unwrap_err();
        assert!(error.to_string().contains("requires a number"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(run("{ v: 1 / 0 }", json!({})).is_err());
    }

    #[test]
    fn string_concatenation() {
        let result = run("{ title: 'Report: ' + name }", json!({"name": "Q3"})).unwrap();
        assert_eq!(result, json!({"title": "Report: Q3"}));
    }

    #[test]
    fn sort_by_ascending_and_descending() {
        let scope = json!({"vids": [{"v": 3}, {"v": 1}, {"v": 2}]});
        assert_eq!(
            run("{ r: sortBy(vids, 'v') }", scope.clone()).unwrap(),
            json!({"r": [{"v": 1}, {"v": 2}, {"v": 3}]})
        );
        assert_eq!(
            run("{ r: sortBy(vids, 'v', 'desc') }", scope).unwrap(),
            json!({"r": [{"v": 3}, {"v": 2}, {"v": 1}]})
        );
    }

    #[test]
    fn group_by_buckets_values() {
        let scope = json!({"items": [
            {"kind": "short", "id": 1},
            {"kind": "long", "id": 2},
            {"kind": "short", "id": 3}
        ]});
        let result = run("{ r: groupBy(items, 'kind') }", scope).unwrap();
        assert_eq!(
            result["r"]["short"],
            json!([{"kind": "short", "id": 1}, {"kind": "short", "id": 3}])
        );
        assert_eq!(result["r"]["long"], json!([{"kind": "long", "id": 2}]));
    }

    #[test]
    fn average_and_median() {
        let scope = json!({"ns": [1, 2, 3, 4]});
        assert_eq!(run("{ a: average(ns) }", scope.clone()).unwrap(), json!({"a": 2.5}));
        assert_eq!(run("{ m: median(ns) }", scope.clone()).unwrap(), json!({"m": 2.5}));
        assert_eq!(
            run("{ m: median([5, 1, 9]) }", json!({})).unwrap(),
            json!({"m": 5})
        );
    }

    #[test]
    fn sum_with_key_projection() {
        let scope = json!({"rows": [{"views": 7}, {"views": 3}]});
        assert_eq!(
            run("{ total: sum(rows, 'views') }", scope).unwrap(),
            json!({"total": 10})
        );
    }

    #[test]
    fn compact_formats_magnitudes() {
        assert_eq!(run("{ v: compact(950) }", json!({})).unwrap(), json!({"v": "950"}));
        assert_eq!(run("{ v: compact(1234) }", json!({})).unwrap(), json!({"v": "1.2K"}));
        assert_eq!(
            run("{ v: compact(5600000) }", json!({})).unwrap(),
            json!({"v": "5.6M"})
        );
        assert_eq!(
            run("{ v: compact(2000000000) }", json!({})).unwrap(),
            json!({"v": "2B"})
        );
    }

    #[test]
    fn unknown_function_is_an_error() {
        let error = run("{ v: eval('1') }", json!({})).unwrap_err();
        assert!(error.to_string().contains("unknown function"));
    }

    #[test]
    fn nested_structures() {
        let result = run(
            "{ summary: { count: 2, names: [first, second] } }",
            json!({"first": "a", "second": "b"}),
        )
        .unwrap();
        assert_eq!(result, json!({"summary": {"count": 2, "names": ["a", "b"]}}));
    }

    #[test]
    fn numeric_index_path() {
        let result = run("{ first: items.0.name }", json!({"items": [{"name": "x"}]})).unwrap();
        assert_eq!(result, json!({"first": "x"}));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(run("{ a: 1 } extra", json!({})).is_err());
    }
}
