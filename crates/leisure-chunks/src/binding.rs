//! Declarative bindings inside rendered markup.
//!
//! Two attributes mark a binding:
//!
//! | attribute   | kind    | access     |
//! |-------------|---------|------------|
//! | `data-show` | display | read       |
//! | `data-bind` | value   | read/write |
//!
//! The attribute value is a path: `@name` for a process-wide global or `name`
//! for a named source chunk, then any number of `.field` / `[index]` steps.
//!
//! ```text
//! counter.items[2]      named "counter", field "items", index 2
//! @theme.colors.bg      global "theme", fields "colors", "bg"
//! ```
//!
//! Paths are compiled once when markup is scanned. Writes are copy-on-write:
//! [`BindingPath::assign`] clones the whole root value, changes the leaf, and
//! returns the full value for submission.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::{BindingError, BindingResult};
use crate::markup::Markup;

pub const SHOW_ATTR: &str = "data-show";
pub const BIND_ATTR: &str = "data-bind";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathRoot {
    Global(String),
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    Field(String),
    Index(usize),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Field(name) => write!(f, ".{name}"),
            Step::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A compiled binding path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingPath {
    root: PathRoot,
    steps: Vec<Step>,
    expr: String,
}

impl BindingPath {
    pub fn parse(expr: &str) -> BindingResult<Self> {
        let malformed = |reason: &str| BindingError::Malformed {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = expr.trim();
        let (global, rest) = match trimmed.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (name, mut rest) = split_ident(rest);
        if name.is_empty() {
            return Err(malformed("expected a name"));
        }
        let root = if global {
            PathRoot::Global(name.to_string())
        } else {
            PathRoot::Named(name.to_string())
        };

        let mut steps = Vec::new();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let (field, tail) = split_ident(after);
                if field.is_empty() {
                    return Err(malformed("expected a field name after '.'"));
                }
                steps.push(Step::Field(field.to_string()));
                rest = tail;
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(|| malformed("unclosed '['"))?;
                let index = after[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| malformed("index must be a non-negative integer"))?;
                steps.push(Step::Index(index));
                rest = &after[close + 1..];
            } else {
                return Err(malformed("expected '.' or '['"));
            }
        }

        Ok(Self {
            root,
            steps,
            expr: trimmed.to_string(),
        })
    }

    pub fn root(&self) -> &PathRoot {
        &self.root
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Name of the data cell this path reads from.
    pub fn target_name(&self) -> &str {
        match &self.root {
            PathRoot::Global(name) | PathRoot::Named(name) => name,
        }
    }

    /// Walk the steps from `root`.
    pub fn resolve<'v>(&self, root: &'v Value) -> BindingResult<&'v Value> {
        self.steps.iter().try_fold(root, |value, step| self.step(value, step))
    }

    fn step<'v>(&self, value: &'v Value, step: &Step) -> BindingResult<&'v Value> {
        match (step, value) {
            (Step::Field(name), Value::Object(map)) => map
                .get(name)
                .ok_or_else(|| BindingError::MissingTarget(self.expr.clone())),
            (Step::Index(i), Value::Array(items)) => {
                items.get(*i).ok_or_else(|| BindingError::IndexOutOfRange {
                    expr: self.expr.clone(),
                    index: *i,
                    len: items.len(),
                })
            }
            _ => Err(BindingError::NotAContainer {
                expr: self.expr.clone(),
                step: step.to_string(),
            }),
        }
    }

    /// Copy-on-write update: a clone of `root` with the addressed leaf set to
    /// `leaf`. A missing final field is added; missing intermediate fields
    /// are an error.
    pub fn assign(&self, root: &Value, leaf: Value) -> BindingResult<Value> {
        let Some((last, init)) = self.steps.split_last() else {
            return Ok(leaf);
        };
        let mut whole = root.clone();
        let mut cursor = &mut whole;
        for step in init {
            cursor = self.step_mut(cursor, step)?;
        }
        match (last, cursor) {
            (Step::Field(name), Value::Object(map)) => {
                map.insert(name.clone(), leaf);
            }
            (Step::Index(i), Value::Array(items)) => {
                let len = items.len();
                let slot = items.get_mut(*i).ok_or_else(|| BindingError::IndexOutOfRange {
                    expr: self.expr.clone(),
                    index: *i,
                    len,
                })?;
                *slot = leaf;
            }
            (step, _) => {
                return Err(BindingError::NotAContainer {
                    expr: self.expr.clone(),
                    step: step.to_string(),
                });
            }
        }
        Ok(whole)
    }

    fn step_mut<'v>(&self, value: &'v mut Value, step: &Step) -> BindingResult<&'v mut Value> {
        match (step, value) {
            (Step::Field(name), Value::Object(map)) => map
                .get_mut(name)
                .ok_or_else(|| BindingError::MissingTarget(self.expr.clone())),
            (Step::Index(i), Value::Array(items)) => {
                let len = items.len();
                items.get_mut(*i).ok_or_else(|| BindingError::IndexOutOfRange {
                    expr: self.expr.clone(),
                    index: *i,
                    len,
                })
            }
            (step, _) => Err(BindingError::NotAContainer {
                expr: self.expr.clone(),
                step: step.to_string(),
            }),
        }
    }
}

impl FromStr for BindingPath {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn split_ident(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(s.len());
    s.split_at(end)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Display,
    Value,
}

/// One binding found in markup.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    pub path: BindingPath,
}

impl Binding {
    pub fn is_writable(&self) -> bool {
        self.kind == BindingKind::Value
    }
}

/// Collect every well-formed binding in `markup`, in document order.
///
/// Malformed paths are logged and skipped.
pub fn scan(markup: &Markup) -> Vec<Binding> {
    let mut found = Vec::new();
    markup.walk(&mut |node| {
        for (attr, kind) in [(SHOW_ATTR, BindingKind::Display), (BIND_ATTR, BindingKind::Value)] {
            let Some(expr) = node.get_attr(attr) else {
                continue;
            };
            match BindingPath::parse(expr) {
                Ok(path) => found.push(Binding { kind, path }),
                Err(error) => warn!(%attr, %error, "skipping binding"),
            }
        }
    });
    found
}

/// Process-wide values addressed by `@name`.
#[derive(Clone, Debug, Default)]
pub struct Globals {
    values: IndexMap<String, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }
}

/// Where the root values of binding paths come from.
pub trait ValueSource {
    fn global(&self, name: &str) -> Option<&Value>;
    fn named(&self, name: &str) -> Option<&Value>;
}

/// Current value at `path`.
pub fn get(path: &BindingPath, source: &impl ValueSource) -> BindingResult<Value> {
    let root = root_value(path, source)?;
    path.resolve(root).cloned()
}

fn root_value<'s>(path: &BindingPath, source: &'s impl ValueSource) -> BindingResult<&'s Value> {
    let found = match path.root() {
        PathRoot::Global(name) => source.global(name),
        PathRoot::Named(name) => source.named(name),
    };
    found.ok_or_else(|| BindingError::MissingTarget(path.expr().to_string()))
}

/// A whole-value write produced by a value binding.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingWrite {
    /// Apply locally to [`Globals`].
    Global { name: String, value: Value },
    /// Submit through the session's set operation.
    Named { name: String, value: Value },
}

impl BindingWrite {
    pub fn name(&self) -> &str {
        match self {
            BindingWrite::Global { name, .. } | BindingWrite::Named { name, .. } => name,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            BindingWrite::Global { value, .. } | BindingWrite::Named { value, .. } => value,
        }
    }
}

/// Build the whole-value write for setting `binding`'s leaf to `leaf`.
pub fn prepare_write(
    binding: &Binding,
    source: &impl ValueSource,
    leaf: Value,
) -> BindingResult<BindingWrite> {
    if !binding.is_writable() {
        return Err(BindingError::ReadOnly(binding.path.expr().to_string()));
    }
    let path = &binding.path;
    let value = path.assign(root_value(path, source)?, leaf)?;
    Ok(match path.root() {
        PathRoot::Global(name) => BindingWrite::Global {
            name: name.clone(),
            value,
        },
        PathRoot::Named(name) => BindingWrite::Named {
            name: name.clone(),
            value,
        },
    })
}

/// Text shown for a display value.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
