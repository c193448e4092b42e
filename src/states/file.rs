//! CV-012: `file.*` actions.
//!
//! Each action reads current state first and only writes when it differs, so
//! a second run reports no changes.

use super::{arg_opt_str, arg_str};
use crate::core::types::StateResult;
use crate::transport::{resolve_locator, SCHEME};
use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn changes(entries: Vec<(&str, String)>) -> Value {
    let mut map = Mapping::new();
    for (k, v) in entries {
        map.insert(Value::String(k.to_string()), Value::String(v));
    }
    Value::Mapping(map)
}

/// `"0644"`, `0644` (read by YAML as the integer 644) and `"644"` all mean
/// octal 644.
fn parse_mode(value: Option<&Value>) -> Result<Option<u32>, String> {
    let digits = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => return Err(format!("mode must be an octal string, got {:?}", other)),
    };
    u32::from_str_radix(digits.trim_start_matches("0o"), 8)
        .map(Some)
        .map_err(|_| format!("invalid mode '{}'", digits))
}

fn current_mode(path: &Path) -> Option<u32> {
    std::fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}

/// Apply `mode` if it differs. Returns the new mode when something changed.
fn ensure_mode(path: &Path, mode: Option<u32>) -> Result<Option<String>, String> {
    let Some(mode) = mode else {
        return Ok(None);
    };
    if current_mode(path) == Some(mode) {
        return Ok(None);
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| format!("cannot chmod {}: {}", path.display(), e))?;
    Ok(Some(format!("{:04o}", mode)))
}

fn read_source(source: &str, roots: &IndexMap<String, PathBuf>) -> Result<Vec<u8>, String> {
    let path = if source.starts_with(SCHEME) {
        resolve_locator(roots, "base", source).map_err(|e| e.to_string())?
    } else {
        PathBuf::from(source)
    };
    std::fs::read(&path).map_err(|e| format!("Source file {} not found: {}", source, e))
}

fn absolute(name: &str) -> Result<&Path, StateResult> {
    let path = Path::new(name);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(StateResult::failure(format!(
            "Specified file {} is not an absolute path",
            name
        )))
    }
}

/// `file.managed(name, source, contents, mode)`
pub fn managed(args: &[Value], roots: &IndexMap<String, PathBuf>) -> Result<StateResult, String> {
    let name = arg_str(args, 0, "name")?;
    let source = arg_opt_str(args, 1, "source")?;
    let contents = arg_opt_str(args, 2, "contents")?;
    let mode = match parse_mode(args.get(3)) {
        Ok(m) => m,
        Err(msg) => return Ok(StateResult::failure(msg)),
    };

    let path = match absolute(name) {
        Ok(p) => p,
        Err(failed) => return Ok(failed),
    };
    if path.is_dir() {
        return Ok(StateResult::failure(format!("{} is a directory", name)));
    }

    let desired = match (source, contents) {
        (Some(_), Some(_)) => {
            return Ok(StateResult::failure(
                "source and contents are mutually exclusive",
            ))
        }
        (Some(src), None) => match read_source(src, roots) {
            Ok(bytes) => Some(bytes),
            Err(msg) => return Ok(StateResult::failure(msg)),
        },
        (None, Some(text)) => Some(text.as_bytes().to_vec()),
        (None, None) => None,
    };

    let mut diff = Vec::new();
    let existing = std::fs::read(path).ok();
    let write = match (&existing, &desired) {
        (None, _) => Some("New file"),
        (Some(old), Some(new)) if old != new => Some("Replaced"),
        _ => None,
    };
    if let Some(what) = write {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Ok(StateResult::failure(format!("cannot create {}: {}", parent.display(), e)));
            }
        }
        if let Err(e) = std::fs::write(path, desired.as_deref().unwrap_or_default()) {
            return Ok(StateResult::failure(format!("cannot write {}: {}", name, e)));
        }
        diff.push(("diff", what.to_string()));
    }

    match ensure_mode(path, mode) {
        Ok(Some(m)) => diff.push(("mode", m)),
        Ok(None) => {}
        Err(msg) => return Ok(StateResult::failure(msg)),
    }

    if diff.is_empty() {
        Ok(StateResult::success(format!("File {} is in the correct state", name)))
    } else {
        Ok(StateResult::changed(changes(diff), format!("File {} updated", name)))
    }
}

/// `file.directory(name, mode)`
pub fn directory(args: &[Value]) -> Result<StateResult, String> {
    let name = arg_str(args, 0, "name")?;
    let mode = match parse_mode(args.get(1)) {
        Ok(m) => m,
        Err(msg) => return Ok(StateResult::failure(msg)),
    };
    let path = match absolute(name) {
        Ok(p) => p,
        Err(failed) => return Ok(failed),
    };

    let mut diff = Vec::new();
    if path.exists() && !path.is_dir() {
        return Ok(StateResult::failure(format!(
            "Specified location {} exists and is a file",
            name
        )));
    }
    if !path.is_dir() {
        if let Err(e) = std::fs::create_dir_all(path) {
            return Ok(StateResult::failure(format!("cannot create {}: {}", name, e)));
        }
        diff.push((name, "New Dir".to_string()));
    }
    match ensure_mode(path, mode) {
        Ok(Some(m)) => diff.push(("mode", m)),
        Ok(None) => {}
        Err(msg) => return Ok(StateResult::failure(msg)),
    }

    if diff.is_empty() {
        Ok(StateResult::success(format!("Directory {} is in the correct state", name)))
    } else {
        Ok(StateResult::changed(changes(diff), format!("Directory {} updated", name)))
    }
}

/// `file.absent(name)`
pub fn absent(args: &[Value]) -> Result<StateResult, String> {
    let name = arg_str(args, 0, "name")?;
    let path = match absolute(name) {
        Ok(p) => p,
        Err(failed) => return Ok(failed),
    };
    if path == Path::new("/") {
        return Ok(StateResult::failure("Refusing to remove /"));
    }

    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path)
    } else {
        return Ok(StateResult::success(format!("File {} is not present", name)));
    };

    match removed {
        Ok(()) => Ok(StateResult::changed(
            changes(vec![("removed", name.to_string())]),
            format!("Removed {}", name),
        )),
        Err(e) => Ok(StateResult::failure(format!("cannot remove {}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn no_roots() -> IndexMap<String, PathBuf> {
        IndexMap::new()
    }

    #[test]
    fn test_cv012_managed_contents_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/motd");
        let name = path.to_str().unwrap();
        let args = vec![s(name), Value::Null, s("hello\n"), s("0640")];

        let first = managed(&args, &no_roots()).unwrap();
        assert!(first.result);
        assert_eq!(first.changes.get("diff").and_then(Value::as_str), Some("New file"));
        assert_eq!(first.changes.get("mode").and_then(Value::as_str), Some("0640"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
        assert_eq!(current_mode(&path), Some(0o640));

        let second = managed(&args, &no_roots()).unwrap();
        assert!(second.result);
        assert_eq!(second.changes, Value::Null);
    }

    #[test]
    fn test_cv012_managed_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf");
        std::fs::write(&path, "old").unwrap();
        let r = managed(&[s(path.to_str().unwrap()), Value::Null, s("new"), Value::Null], &no_roots()).unwrap();
        assert_eq!(r.changes.get("diff").and_then(Value::as_str), Some("Replaced"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_cv012_managed_from_file_root() {
        let root = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("motd"), "from root").unwrap();
        let roots = IndexMap::from([("base".to_string(), root.path().to_path_buf())]);
        let path = dest.path().join("motd");

        let r = managed(&[s(path.to_str().unwrap()), s("salt://motd"), Value::Null, Value::Null], &roots).unwrap();
        assert!(r.result);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "from root");
    }

    #[test]
    fn test_cv012_managed_missing_source() {
        let dest = tempfile::tempdir().unwrap();
        let path = dest.path().join("motd");
        let roots = IndexMap::from([("base".to_string(), dest.path().join("nowhere"))]);
        let r = managed(&[s(path.to_str().unwrap()), s("salt://motd"), Value::Null, Value::Null], &roots).unwrap();
        assert!(!r.result);
        assert!(!path.exists());
    }

    #[test]
    fn test_cv012_managed_relative_path_fails() {
        let r = managed(&[s("etc/motd"), Value::Null, Value::Null, Value::Null], &no_roots()).unwrap();
        assert!(!r.result);
    }

    #[test]
    fn test_cv012_bad_mode_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let r = managed(&[s(path.to_str().unwrap()), Value::Null, Value::Null, s("rwx")], &no_roots()).unwrap();
        assert!(!r.result);
        assert_eq!(r.comment, "invalid mode 'rwx'");
        assert!(!path.exists());

        let sub = dir.path().join("d");
        let r = directory(&[s(sub.to_str().unwrap()), Value::Bool(true)]).unwrap();
        assert!(!r.result);
        assert!(!sub.exists());
    }

    #[test]
    fn test_cv012_parse_mode_forms() {
        assert_eq!(parse_mode(Some(&s("0644"))).unwrap(), Some(0o644));
        assert_eq!(parse_mode(Some(&s("755"))).unwrap(), Some(0o755));
        let n: Value = serde_yaml_ng::from_str("644").unwrap();
        assert_eq!(parse_mode(Some(&n)).unwrap(), Some(0o644));
        assert_eq!(parse_mode(Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn test_cv012_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b");
        let args = vec![s(path.to_str().unwrap()), Value::Null];
        let first = directory(&args).unwrap();
        assert!(first.result);
        assert!(path.is_dir());
        let second = directory(&args).unwrap();
        assert_eq!(second.changes, Value::Null);
    }

    #[test]
    fn test_cv012_directory_over_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "x").unwrap();
        assert!(!directory(&[s(path.to_str().unwrap()), Value::Null]).unwrap().result);
    }

    #[test]
    fn test_cv012_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        std::fs::write(&path, "x").unwrap();
        let args = vec![s(path.to_str().unwrap())];
        let first = absent(&args).unwrap();
        assert!(first.result);
        assert!(!path.exists());
        let second = absent(&args).unwrap();
        assert!(second.result);
        assert_eq!(second.changes, Value::Null);
    }

    #[test]
    fn test_cv012_absent_refuses_root() {
        assert!(!absent(&[s("/")]).unwrap().result);
    }
}
