//! CV-001: The document model.
//!
//! High data (name → state module → run list), top data (environment → match
//! expression → state documents), chunks (one executable action each), the
//! requisites between chunks, and the per-pass run ledger. Rendered documents
//! arrive as a `serde_yaml_ng::Value` tree and are shape-checked here before
//! the compiler ever sees them.

use super::error::CompileError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::fmt;

/// A rendered document: string | mapping | sequence (plus YAML scalars).
pub type Document = Value;

/// Reserved run-list key that fans a rule out over alternate names.
pub const NAMES_KEY: &str = "names";

/// Reserved chunk key carrying requisites.
pub const REQUIRE_KEY: &str = "require";

/// Comment recorded for a chunk whose requisites failed.
pub const REQUISITE_FAILED_COMMENT: &str = "One or more requirements failed";

// ============================================================================
// High data
// ============================================================================

/// State module → run list.
pub type Body = IndexMap<String, Vec<RunItem>>;

/// One element of a run list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunItem {
    /// A bare string naming a function of the state module.
    Function(String),
    /// `parameter: value` pairs, or the reserved `names` list.
    Args(IndexMap<String, Value>),
}

/// The declarative desired state: name → body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HighData(pub IndexMap<String, Body>);

impl HighData {
    /// Shape-check a rendered document into high data.
    /// A null document (empty file) is empty high data.
    pub fn from_document(doc: &Document) -> Result<Self, CompileError> {
        let root = match doc {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(m) => m,
            _ => {
                return Err(CompileError::new(
                    "<root>",
                    "high data must be a mapping of names to state bodies",
                ))
            }
        };

        let mut high = IndexMap::new();
        for (key, body) in root {
            let name = mapping_key(key, "<root>")?;
            let body = parse_body(&name, body)?;
            high.insert(name, body);
        }
        Ok(Self(high))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&Body> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Body)> {
        self.0.iter()
    }

    /// Merge another document in. Later names fully replace earlier ones.
    pub fn merge(&mut self, other: HighData) {
        for (name, body) in other.0 {
            self.0.insert(name, body);
        }
    }
}

fn parse_body(name: &str, value: &Value) -> Result<Body, CompileError> {
    let map = value.as_mapping().ok_or_else(|| {
        CompileError::new(name, "state body must be a mapping of state modules to run lists")
    })?;

    let mut body = Body::new();
    for (key, run) in map {
        let state = mapping_key(key, name)?;
        let path = format!("{}.{}", name, state);
        let seq = run
            .as_sequence()
            .ok_or_else(|| CompileError::new(&path, "run list must be a sequence"))?;
        let items = seq
            .iter()
            .enumerate()
            .map(|(i, item)| parse_run_item(&format!("{}[{}]", path, i), item))
            .collect::<Result<Vec<_>, _>>()?;
        body.insert(state, items);
    }
    Ok(body)
}

fn parse_run_item(path: &str, item: &Value) -> Result<RunItem, CompileError> {
    match item {
        Value::String(s) => Ok(RunItem::Function(s.clone())),
        Value::Mapping(m) => {
            let mut args = IndexMap::new();
            for (k, v) in m {
                let key = mapping_key(k, path)?;
                if key == NAMES_KEY {
                    check_names(path, v)?;
                }
                args.insert(key, v.clone());
            }
            Ok(RunItem::Args(args))
        }
        _ => Err(CompileError::new(
            path,
            "expected a function name or a parameter mapping",
        )),
    }
}

fn check_names(path: &str, value: &Value) -> Result<(), CompileError> {
    let seq = value
        .as_sequence()
        .ok_or_else(|| CompileError::new(path, "names must be a sequence"))?;
    for v in seq {
        if scalar_to_string(v).is_none() {
            return Err(CompileError::new(path, "names entries must be scalars"));
        }
    }
    Ok(())
}

fn mapping_key(key: &Value, path: &str) -> Result<String, CompileError> {
    scalar_to_string(key)
        .ok_or_else(|| CompileError::new(path, format!("mapping key must be a scalar, got {:?}", key)))
}

// ============================================================================
// Top data
// ============================================================================

/// The top manifest: environment → match expression → targets.
/// Targets are kept raw; only string entries name state documents, mappings
/// carry matcher options such as `match: pcre`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TopData(pub IndexMap<String, IndexMap<String, Vec<Value>>>);

impl TopData {
    pub fn from_document(doc: &Document) -> Result<Self, CompileError> {
        let root = match doc {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(m) => m,
            _ => {
                return Err(CompileError::new(
                    "<top>",
                    "top data must be a mapping of environments",
                ))
            }
        };

        let mut top = IndexMap::new();
        for (env_key, body) in root {
            let env = mapping_key(env_key, "<top>")?;
            let body = body.as_mapping().ok_or_else(|| {
                CompileError::new(&env, "environment must map match expressions to targets")
            })?;
            let mut matches = IndexMap::new();
            for (expr_key, targets) in body {
                let expr = mapping_key(expr_key, &env)?;
                let targets = targets.as_sequence().ok_or_else(|| {
                    CompileError::new(format!("{}.{}", env, expr), "targets must be a sequence")
                })?;
                matches.insert(expr, targets.clone());
            }
            top.insert(env, matches);
        }
        Ok(Self(top))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexMap<String, Vec<Value>>)> {
        self.0.iter()
    }
}

// ============================================================================
// Chunks
// ============================================================================

/// Low data: one fully expanded action invocation.
///
/// Kept as a mapping so externally supplied low data with missing or mistyped
/// fields can still be validated and reported on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chunk(IndexMap<String, Value>);

impl Chunk {
    pub fn new(state: &str, name: &str, fun: &str) -> Self {
        let mut chunk = Self::default();
        chunk.insert("state", Value::String(state.to_string()));
        chunk.insert("name", Value::String(name.to_string()));
        chunk.insert("fun", Value::String(fun.to_string()));
        chunk
    }

    pub fn from_map(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }

    /// Builder form of `insert`.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.0.insert(key.to_string(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// A string-valued field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn state(&self) -> Option<&str> {
        self.field("state")
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }

    pub fn fun(&self) -> Option<&str> {
        self.field("fun")
    }

    /// `state.fun`, the registry key of the action this chunk invokes.
    pub fn full(&self) -> Option<String> {
        Some(format!("{}.{}", self.state()?, self.fun()?))
    }

    /// `state.name.fun`, the ledger key.
    pub fn tag(&self) -> Option<String> {
        Some(format!("{}.{}.{}", self.state()?, self.name()?, self.fun()?))
    }

    /// `state + name + fun`, the default execution order key.
    pub fn sort_key(&self) -> String {
        format!(
            "{}{}{}",
            self.state().unwrap_or_default(),
            self.name().unwrap_or_default(),
            self.fun().unwrap_or_default()
        )
    }

    /// Parse the `require` entry. No `require` yields an empty list.
    pub fn requisites(&self) -> Result<Vec<Requisite>, String> {
        let raw = match self.0.get(REQUIRE_KEY) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(v) => v,
        };
        let seq = raw
            .as_sequence()
            .ok_or_else(|| "require must be a sequence".to_string())?;
        seq.iter().map(Requisite::from_value).collect()
    }
}

/// A declared dependency: the chunk(s) with this `state` and `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requisite {
    pub state: String,
    pub name: String,
}

impl Requisite {
    pub fn new(state: &str, name: &str) -> Self {
        Self {
            state: state.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse a single-entry `{state: name}` mapping.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let map = value
            .as_mapping()
            .ok_or_else(|| format!("require entry must be a mapping, got {:?}", value))?;
        if map.len() != 1 {
            return Err(format!(
                "require entry must have exactly one key, got {}",
                map.len()
            ));
        }
        let (k, v) = map
            .iter()
            .next()
            .ok_or_else(|| "require entry is empty".to_string())?;
        let state = scalar_to_string(k).ok_or_else(|| "require key must be a scalar".to_string())?;
        let name = scalar_to_string(v)
            .ok_or_else(|| format!("require value for '{}' must be a scalar", state))?;
        Ok(Self { state, name })
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.state() == Some(self.state.as_str()) && chunk.name() == Some(self.name.as_str())
    }
}

impl fmt::Display for Requisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.state, self.name)
    }
}

// ============================================================================
// Results
// ============================================================================

/// What every action returns, and what the ledger stores per tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResult {
    #[serde(default)]
    pub changes: Value,
    pub result: bool,
    #[serde(default)]
    pub comment: String,
}

impl StateResult {
    /// Success without changes.
    pub fn success(comment: impl Into<String>) -> Self {
        Self {
            changes: Value::Null,
            result: true,
            comment: comment.into(),
        }
    }

    /// Success that changed the system.
    pub fn changed(changes: Value, comment: impl Into<String>) -> Self {
        Self {
            changes,
            result: true,
            comment: comment.into(),
        }
    }

    pub fn failure(comment: impl Into<String>) -> Self {
        Self {
            changes: Value::Null,
            result: false,
            comment: comment.into(),
        }
    }

    /// Synthetic entry for a chunk skipped because a requisite failed.
    pub fn requisite_failed() -> Self {
        Self::failure(REQUISITE_FAILED_COMMENT)
    }
}

/// Per-pass mapping from tag to result, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger(IndexMap<String, StateResult>);

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&StateResult> {
        self.0.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains_key(tag)
    }

    /// Record a result. A second write to the same tag replaces the first.
    pub fn insert(&mut self, tag: String, result: StateResult) -> Option<StateResult> {
        self.0.insert(tag, result)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateResult)> {
        self.0.iter()
    }

    pub fn succeeded(&self) -> usize {
        self.0.values().filter(|r| r.result).count()
    }

    pub fn failed(&self) -> usize {
        self.0.values().filter(|r| !r.result).count()
    }
}

// ============================================================================
// Invocation surface
// ============================================================================

/// Low data as submitted from outside: one chunk or a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LowInput {
    Batch(Vec<Chunk>),
    Single(Chunk),
}

impl LowInput {
    pub fn into_chunks(self) -> Vec<Chunk> {
        match self {
            Self::Batch(chunks) => chunks,
            Self::Single(chunk) => vec![chunk],
        }
    }
}

/// Either validation errors (nothing ran) or a complete ledger.
/// Serializes as a list or a mapping respectively.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallOutcome {
    Errors(Vec<String>),
    Ledger(Ledger),
}

impl CallOutcome {
    pub fn errors(&self) -> Option<&[String]> {
        match self {
            Self::Errors(e) => Some(e),
            Self::Ledger(_) => None,
        }
    }

    pub fn ledger(&self) -> Option<&Ledger> {
        match self {
            Self::Ledger(l) => Some(l),
            Self::Errors(_) => None,
        }
    }

    /// True when nothing failed validation and every ledger entry succeeded.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Errors(_) => false,
            Self::Ledger(l) => l.failed() == 0,
        }
    }
}

// ============================================================================
// Scalar helper
// ============================================================================

/// Render a YAML scalar as a string. Mappings, sequences and null yield None.
pub fn scalar_to_string(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
