//! Built-in actions: just enough to converge a node from the CLI.
//!
//! Each action takes its arguments positionally, in the order of the
//! parameter schema it is registered with.

pub mod cmd;
pub mod file;

use crate::core::config::Opts;
use crate::core::registry::{ActionRegistry, Param};
use serde_yaml_ng::Value;

/// Registry with every built-in action.
pub fn builtin_registry(opts: &Opts) -> ActionRegistry {
    let mut reg = ActionRegistry::new();

    for (fun, func) in test::FUNCTIONS {
        reg.register(&format!("test.{}", fun), vec![Param::required("name")], func);
    }

    let roots = opts.file_roots.clone();
    reg.register(
        "file.managed",
        vec![
            Param::required("name"),
            Param::optional("source", Value::Null),
            Param::optional("contents", Value::Null),
            Param::optional("mode", Value::Null),
        ],
        move |args| file::managed(args, &roots),
    );
    reg.register(
        "file.directory",
        vec![Param::required("name"), Param::optional("mode", Value::Null)],
        file::directory,
    );
    reg.register("file.absent", vec![Param::required("name")], file::absent);

    reg.register(
        "cmd.run",
        vec![
            Param::required("name"),
            Param::optional("onlyif", Value::Null),
            Param::optional("unless", Value::Null),
        ],
        cmd::run,
    );

    reg
}

/// Positional string argument. Anything else is a fault.
pub(crate) fn arg_str<'a>(args: &'a [Value], idx: usize, param: &str) -> Result<&'a str, String> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!("{} must be a string, got {:?}", param, other)),
        None => Err(format!("{} was not bound", param)),
    }
}

/// Positional optional string argument; null means absent.
pub(crate) fn arg_opt_str<'a>(args: &'a [Value], idx: usize, param: &str) -> Result<Option<&'a str>, String> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(format!("{} must be a string, got {:?}", param, other)),
    }
}
