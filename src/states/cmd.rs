//! CV-012: `cmd.run` runs a shell command through the local transport.

use super::{arg_opt_str, arg_str};
use crate::core::types::StateResult;
use crate::transport::local::exec_local;
use serde_yaml_ng::{Mapping, Value};

/// `cmd.run(name, onlyif, unless)`
///
/// `onlyif` and `unless` are guard commands: the main command only runs when
/// `onlyif` exits 0 and `unless` does not. A command that cannot be spawned at
/// all is a fault; a non-zero exit is a failed result.
pub fn run(args: &[Value]) -> Result<StateResult, String> {
    let name = arg_str(args, 0, "name")?;
    let onlyif = arg_opt_str(args, 1, "onlyif")?;
    let unless = arg_opt_str(args, 2, "unless")?;

    if let Some(guard) = onlyif {
        if !exec_local(guard)?.success() {
            return Ok(StateResult::success("onlyif condition is false"));
        }
    }
    if let Some(guard) = unless {
        if exec_local(guard)?.success() {
            return Ok(StateResult::success("unless condition is true"));
        }
    }

    let out = exec_local(name)?;
    tracing::debug!(command = name, exit_code = out.exit_code, "command finished");

    let mut changes = Mapping::new();
    changes.insert(Value::String("retcode".to_string()), Value::Number(i64::from(out.exit_code).into()));
    changes.insert(Value::String("stdout".to_string()), Value::String(out.stdout.trim_end().to_string()));
    changes.insert(Value::String("stderr".to_string()), Value::String(out.stderr.trim_end().to_string()));

    let comment = format!("Command \"{}\" run", name);
    if out.success() {
        Ok(StateResult::changed(Value::Mapping(changes), comment))
    } else {
        Ok(StateResult {
            changes: Value::Mapping(changes),
            result: false,
            comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_cv012_cmd_run_success() {
        let r = run(&[s("echo hi"), Value::Null, Value::Null]).unwrap();
        assert!(r.result);
        assert_eq!(r.changes.get("stdout").and_then(Value::as_str), Some("hi"));
        assert_eq!(r.changes.get("retcode").and_then(Value::as_i64), Some(0));
    }

    #[test]
    fn test_cv012_cmd_run_failure() {
        let r = run(&[s("exit 3"), Value::Null, Value::Null]).unwrap();
        assert!(!r.result);
        assert_eq!(r.changes.get("retcode").and_then(Value::as_i64), Some(3));
    }

    #[test]
    fn test_cv012_cmd_onlyif_false_skips() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let cmd = format!("touch '{}'", marker.display());
        let r = run(&[s(&cmd), s("false"), Value::Null]).unwrap();
        assert!(r.result);
        assert_eq!(r.changes, Value::Null);
        assert!(!marker.exists());
    }

    #[test]
    fn test_cv012_cmd_unless_true_skips() {
        let r = run(&[s("exit 1"), Value::Null, s("true")]).unwrap();
        assert!(r.result);
        assert_eq!(r.comment, "unless condition is true");
    }
}
