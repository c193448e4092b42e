//! CV-008: Call binder: chunk to positional call.

use super::error::BindError;
use super::registry::ActionRegistry;
use super::types::Chunk;
use serde_yaml_ng::Value;

/// A chunk resolved against its action's parameter schema.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCall {
    /// `state.fun`
    pub full: String,
    /// One value per declared parameter, in declaration order.
    pub args: Vec<Value>,
}

/// Build the positional argument list for a chunk.
///
/// The chunk's value wins over a declared default. A parameter with neither
/// fails the bind rather than being dropped. Keys the action does not declare
/// are ignored.
pub fn format_call(chunk: &Chunk, registry: &ActionRegistry) -> Result<BoundCall, BindError> {
    let state = chunk.state().ok_or(BindError::MissingField("state"))?;
    let fun = chunk.fun().ok_or(BindError::MissingField("fun"))?;
    let full = format!("{}.{}", state, fun);

    let action = registry
        .get(&full)
        .ok_or_else(|| BindError::UnknownAction(full.clone()))?;

    let args = action
        .params
        .iter()
        .map(|param| match (chunk.get(&param.name), &param.default) {
            (Some(v), _) => Ok(v.clone()),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(BindError::MissingParameter {
                full: full.clone(),
                param: param.name.clone(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BoundCall { full, args })
}
