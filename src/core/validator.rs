//! CV-007: Chunk validation.
//!
//! Purely structural: required fields, a registered action, every parameter
//! without a default present, a well-formed `require`. The batch form adds a
//! duplicate-tag check. Any error blocks the batch.

use super::registry::ActionRegistry;
use super::types::{Chunk, REQUIRE_KEY};
use std::collections::HashSet;

/// Validate one chunk. Returns a list of errors (empty = valid).
pub fn verify_data(chunk: &Chunk, registry: &ActionRegistry) -> Vec<String> {
    let mut errors = Vec::new();

    for field in ["state", "fun", "name"] {
        match chunk.get(field) {
            None => errors.push(format!("Missing \"{}\" data", field)),
            Some(v) if v.as_str().is_none() => {
                errors.push(format!("Invalid \"{}\" data: expected a string", field))
            }
            Some(_) => {}
        }
    }
    if !errors.is_empty() {
        return errors;
    }

    // Fields are present and strings from here on.
    let full = chunk.full().unwrap_or_default();
    let tag = chunk.tag().unwrap_or_default();

    match registry.get(&full) {
        None => errors.push(format!("Specified state {} is unavailable.", full)),
        Some(action) => {
            for param in action.required() {
                if !chunk.contains(&param.name) {
                    errors.push(format!("Missing parameter {} for state {}", param.name, full));
                }
            }
        }
    }

    if chunk.contains(REQUIRE_KEY) {
        if let Err(e) = chunk.requisites() {
            errors.push(format!("Invalid require in {}: {}", tag, e));
        }
    }

    errors
}

/// Validate a batch of chunks and concatenate all errors.
pub fn verify_chunks(chunks: &[Chunk], registry: &ActionRegistry) -> Vec<String> {
    let mut errors: Vec<String> = chunks
        .iter()
        .flat_map(|chunk| verify_data(chunk, registry))
        .collect();

    let mut seen = HashSet::new();
    for chunk in chunks {
        if let Some(tag) = chunk.tag() {
            if !seen.insert(tag.clone()) {
                errors.push(format!("Duplicate state tag {}", tag));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::Param;
    use crate::core::types::StateResult;
    use serde_yaml_ng::Value;

    fn registry() -> ActionRegistry {
        let mut reg = ActionRegistry::new();
        reg.register(
            "file.managed",
            vec![
                Param::required("name"),
                Param::required("source"),
                Param::optional("mode", Value::Null),
            ],
            |_| Ok(StateResult::success("ok")),
        );
        reg.register("pkg.installed", vec![Param::required("name")], |_| {
            Ok(StateResult::success("ok"))
        });
        reg
    }

    fn yaml(s: &str) -> Value {
        serde_yaml_ng::from_str(s).unwrap()
    }

    #[test]
    fn test_cv007_valid_chunk() {
        let chunk = Chunk::new("file", "/etc/foo", "managed").with("source", yaml("salt://foo"));
        assert!(verify_data(&chunk, &registry()).is_empty());
    }

    #[test]
    fn test_cv007_missing_name() {
        let mut chunk = Chunk::new("pkg", "nginx", "installed");
        chunk.remove("name");
        assert_eq!(verify_data(&chunk, &registry()), vec!["Missing \"name\" data"]);
    }

    #[test]
    fn test_cv007_missing_all_fields() {
        let errors = verify_data(&Chunk::default(), &registry());
        assert_eq!(
            errors,
            vec![
                "Missing \"state\" data",
                "Missing \"fun\" data",
                "Missing \"name\" data"
            ]
        );
    }

    #[test]
    fn test_cv007_non_string_field() {
        let chunk = Chunk::new("pkg", "nginx", "installed").with("name", yaml("[a, b]"));
        let errors = verify_data(&chunk, &registry());
        assert_eq!(errors, vec!["Invalid \"name\" data: expected a string"]);
    }

    #[test]
    fn test_cv007_unknown_state() {
        let chunk = Chunk::new("service", "nginx", "running");
        assert_eq!(
            verify_data(&chunk, &registry()),
            vec!["Specified state service.running is unavailable."]
        );
    }

    #[test]
    fn test_cv007_missing_parameter() {
        let chunk = Chunk::new("file", "/etc/foo", "managed");
        assert_eq!(
            verify_data(&chunk, &registry()),
            vec!["Missing parameter source for state file.managed"]
        );
    }

    #[test]
    fn test_cv007_invalid_require() {
        let chunk = Chunk::new("pkg", "nginx", "installed").with("require", yaml("file"));
        let errors = verify_data(&chunk, &registry());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Invalid require in pkg.nginx.installed"));
    }

    #[test]
    fn test_cv007_batch_concatenates() {
        let mut missing = Chunk::new("pkg", "nginx", "installed");
        missing.remove("name");
        let chunks = vec![missing, Chunk::new("service", "nginx", "running")];
        let errors = verify_chunks(&chunks, &registry());
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_cv007_batch_duplicate_tag() {
        let chunks = vec![
            Chunk::new("pkg", "nginx", "installed"),
            Chunk::new("pkg", "nginx", "installed"),
        ];
        assert_eq!(
            verify_chunks(&chunks, &registry()),
            vec!["Duplicate state tag pkg.nginx.installed"]
        );
    }

    #[test]
    fn test_cv007_batch_unmatched_requisite_is_valid() {
        let chunks = vec![Chunk::new("pkg", "nginx", "installed")
            .with("require", yaml("- file: /etc/nginx.conf"))];
        assert!(verify_chunks(&chunks, &registry()).is_empty());
    }

    #[test]
    fn test_cv007_batch_valid_requisite() {
        let chunks = vec![
            Chunk::new("file", "/etc/foo", "managed").with("source", yaml("salt://foo")),
            Chunk::new("pkg", "nginx", "installed").with("require", yaml("- file: /etc/foo")),
        ];
        assert!(verify_chunks(&chunks, &registry()).is_empty());
    }
}
