//! CV-005: Low-data compiler.
//!
//! Flattens high data into chunks: one per function of each rule, or one per
//! (alternate name, function) pair when the rule carries `names`. The result
//! is sorted by `state + name + fun`, which is the default execution order.

use super::types::*;
use indexmap::{IndexMap, IndexSet};
use serde_yaml_ng::Value;

/// Keys a parameter mapping may not overwrite in the chunk template.
const RESERVED: [&str; 3] = ["state", "fun", NAMES_KEY];

/// Compile high data into sorted chunks.
pub fn compile_high_data(high: &HighData) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for (name, body) in high.iter() {
        for (state, run) in body {
            let mut template: IndexMap<String, Value> = IndexMap::new();
            template.insert("state".to_string(), Value::String(state.clone()));
            template.insert("name".to_string(), Value::String(name.clone()));

            let mut funcs: IndexSet<&str> = IndexSet::new();
            let mut names: IndexSet<String> = IndexSet::new();

            for item in run {
                match item {
                    RunItem::Function(fun) => {
                        funcs.insert(fun.as_str());
                    }
                    RunItem::Args(args) => {
                        for (key, value) in args {
                            if key == NAMES_KEY {
                                names.extend(alternate_names(value));
                            } else if RESERVED.contains(&key.as_str()) {
                                tracing::debug!(name = %name, state = %state, key = %key, "ignoring reserved key in parameters");
                            } else {
                                template.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
            }

            if funcs.is_empty() {
                tracing::debug!(name = %name, state = %state, "rule has no functions; no chunks produced");
            }

            let targets: Vec<Option<&str>> = if names.is_empty() {
                vec![None]
            } else {
                names.iter().map(|n| Some(n.as_str())).collect()
            };

            for target in targets {
                for fun in &funcs {
                    let mut live = Chunk::from_map(template.clone());
                    if let Some(alt) = target {
                        live.insert("name", Value::String(alt.to_string()));
                    }
                    live.insert("fun", Value::String((*fun).to_string()));
                    chunks.push(live);
                }
            }
        }
    }

    sort_chunks(&mut chunks);
    chunks
}

/// Stable sort by `state + name + fun`.
pub fn sort_chunks(chunks: &mut [Chunk]) {
    chunks.sort_by_cached_key(Chunk::sort_key);
}

fn alternate_names(value: &Value) -> impl Iterator<Item = String> + '_ {
    value
        .as_sequence()
        .into_iter()
        .flatten()
        .filter_map(scalar_to_string)
}
