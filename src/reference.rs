//! Reference resolution DSL
//!
//! The small closed grammar that wires run inputs and earlier step outputs
//! into later step inputs:
//!
//! ```text
//! reference ::= "$input." path | "$steps." path
//! template  ::= text ("{{" scope "." path "}}" text)*     scope ∈ {input, steps}
//! path      ::= segment ("." segment)*                    segment may end in "*"
//! ```
//!
//! Values that match neither form pass through unchanged. Missing keys
//! resolve to `null` silently — rejecting absent required inputs is each
//! executor's job. Unresolvable template placeholders stay verbatim,
//! braces included.

use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::workflow::OutputMap;

/// A parsed dot-path. A `*` segment maps the remaining path over an array,
/// flattening one level.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Wildcard,
}

impl Path {
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part == "*" {
                segments.push(Segment::Wildcard);
            } else if let Some(stripped) = part.strip_suffix('*') {
                // "items*" reads as the key followed by a wildcard hop
                segments.push(Segment::Key(stripped.to_string()));
                segments.push(Segment::Wildcard);
            } else {
                segments.push(Segment::Key(part.to_string()));
            }
        }
        Self { segments }
    }
}

/// A typed reference, classified once per input value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// `$input.<path>` — looked up in the run-level inputs.
    Input(Path),
    /// `$steps.<path>` — looked up in completed step results.
    Steps(Path),
    /// A string with embedded `{{scope.path}}` placeholders.
    Template(Vec<Token>),
    /// Anything else: passes through unchanged.
    Literal(Value),
}

/// One fragment of a tokenized template.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    /// Placeholder body (between the braces) plus the raw form used when the
    /// placeholder cannot be resolved.
    Placeholder { body: String, raw: String },
}

impl Reference {
    /// Classify a JSON value. Only strings can be references or templates.
    pub fn parse(value: &Value) -> Reference {
        let Some(s) = value.as_str() else {
            return Reference::Literal(value.clone());
        };

        if let Some(path) = s.strip_prefix("$input.") {
            return Reference::Input(Path::parse(path));
        }
        if let Some(path) = s.strip_prefix("$steps.") {
            return Reference::Steps(Path::parse(path));
        }
        if s.contains("{{") {
            let tokens = tokenize(s);
            if tokens
                .iter()
                .any(|t| matches!(t, Token::Placeholder { .. }))
            {
                return Reference::Template(tokens);
            }
        }
        Reference::Literal(value.clone())
    }

    /// Resolve against a run's context. Missing paths yield `null`.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Value {
        match self {
            Reference::Input(path) => walk(&ctx.inputs, &path.segments).unwrap_or(Value::Null),
            Reference::Steps(path) => {
                walk_object(&ctx.step_results, &path.segments).unwrap_or(Value::Null)
            }
            Reference::Template(tokens) => {
                let root = scope_root(ctx);
                Value::String(render_tokens(tokens, &root))
            }
            Reference::Literal(value) => value.clone(),
        }
    }
}

/// Parse-and-resolve convenience for a single input value.
pub fn resolve_value(value: &Value, ctx: &ExecutionContext) -> Value {
    Reference::parse(value).resolve(ctx)
}

/// Resolve every entry of an inputs map.
pub fn resolve_inputs(inputs: &OutputMap, ctx: &ExecutionContext) -> OutputMap {
    inputs
        .iter()
        .map(|(name, value)| (name.clone(), resolve_value(value, ctx)))
        .collect()
}

/// Substitute `{{path}}` placeholders against an arbitrary JSON object root.
/// Used by the LLM executor to expand prompts against resolved inputs.
pub fn render(template: &str, root: &Value) -> String {
    render_tokens(&tokenize(template), root)
}

fn scope_root(ctx: &ExecutionContext) -> Value {
    let mut root = Map::new();
    root.insert("input".to_string(), ctx.inputs.clone());
    root.insert("steps".to_string(), ctx.step_results_value());
    Value::Object(root)
}

fn tokenize(template: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open..].find("}}") else {
            break;
        };
        let close = open + close;
        if open > 0 {
            tokens.push(Token::Text(rest[..open].to_string()));
        }
        tokens.push(Token::Placeholder {
            body: rest[open + 2..close].trim().to_string(),
            raw: rest[open..close + 2].to_string(),
        });
        rest = &rest[close + 2..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest.to_string()));
    }
    tokens
}

fn render_tokens(tokens: &[Token], root: &Value) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Placeholder { body, raw } => {
                let path = Path::parse(body);
                match walk(root, &path.segments) {
                    Some(value) => out.push_str(&display(&value)),
                    // Unmatched or unresolvable: keep verbatim, braces included
                    None => out.push_str(raw),
                }
            }
        }
    }
    out
}

/// Stringify a resolved value for template substitution: arrays join with
/// `", "`, objects JSON-serialize, scalars print bare.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Dot-path walk. `None` means the path missed; callers decide between
/// `null` (references) and verbatim (templates).
pub(crate) fn walk(value: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match first {
        Segment::Key(key) => {
            let next = match value {
                Value::Object(map) => map.get(key)?,
                // Numeric segments index into arrays
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
            walk(next, rest)
        }
        Segment::Wildcard => {
            let items = value.as_array()?;
            let mut collected = Vec::new();
            for item in items {
                match walk(item, rest) {
                    Some(Value::Array(inner)) => collected.extend(inner),
                    Some(v) => collected.push(v),
                    None => {}
                }
            }
            Some(Value::Array(collected))
        }
    }
}

fn walk_object(map: &OutputMap, segments: &[Segment]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    match first {
        Segment::Key(key) => walk(map.get(key)?, rest),
        Segment::Wildcard => None,
    }
}
