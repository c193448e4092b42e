//! CV-006: Action catalogue.
//!
//! Every action is registered under `state.fun` together with its ordered
//! parameter schema. The binder and the validator read the schema; nothing is
//! discovered by introspection.

use super::types::StateResult;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::fmt;
use std::sync::Arc;

/// Positional arguments in, state result out. `Err` is an action fault.
pub type ActionFn = Arc<dyn Fn(&[Value]) -> Result<StateResult, String> + Send + Sync>;

/// One declared parameter. `default: None` means the parameter is required.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: None,
        }
    }

    pub fn optional(name: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            default: Some(default),
        }
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.default {
            None => write!(f, "{}", self.name),
            Some(Value::Null) => write!(f, "{}=null", self.name),
            Some(v) => match serde_json::to_string(v) {
                Ok(s) => write!(f, "{}={}", self.name, s),
                Err(_) => write!(f, "{}=?", self.name),
            },
        }
    }
}

/// A registered action.
#[derive(Clone)]
pub struct Action {
    pub params: Vec<Param>,
    func: ActionFn,
}

impl Action {
    pub fn invoke(&self, args: &[Value]) -> Result<StateResult, String> {
        (self.func)(args)
    }

    /// Parameters without a default.
    pub fn required(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| !p.has_default())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("params", &self.params).finish_non_exhaustive()
    }
}

/// `state.fun` → action.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: IndexMap<String, Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an action.
    pub fn register<F>(&mut self, full: &str, params: Vec<Param>, func: F)
    where
        F: Fn(&[Value]) -> Result<StateResult, String> + Send + Sync + 'static,
    {
        self.actions.insert(
            full.to_string(),
            Action {
                params,
                func: Arc::new(func),
            },
        );
    }

    pub fn get(&self, full: &str) -> Option<&Action> {
        self.actions.get(full)
    }

    pub fn contains(&self, full: &str) -> bool {
        self.actions.contains_key(full)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Registered actions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Action)> {
        self.actions.iter().map(|(k, v)| (k.as_str(), v))
    }
}
