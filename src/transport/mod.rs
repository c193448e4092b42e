//! CV-011: Transport abstraction for state document fetch and local execution.
//!
//! The engine only ever talks to a `FileClient`: it hands over a `salt://`
//! locator plus an environment and gets back a path in the local cache.
//! `LocalFileClient` serves file roots from disk; a networked client would
//! implement the same trait.

pub mod local;

use crate::core::config::MasterOpts;
use crate::core::error::TransportError;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub use local::LocalFileClient;

/// Locator scheme for documents served from a file root.
pub const SCHEME: &str = "salt://";

/// Output from executing a script locally.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Fetches documents from the coordinator's file store into a local cache.
pub trait FileClient {
    /// Cache the document behind `locator` for `env`. `None` if it does not exist.
    fn cache_file(&self, locator: &str, env: &str) -> Result<Option<PathBuf>, TransportError>;

    /// Cache the state document named `sls` (dotted, e.g. `web.nginx`).
    fn get_state(&self, sls: &str, env: &str) -> Result<Option<PathBuf>, TransportError> {
        for locator in sls_locators(sls) {
            if let Some(path) = self.cache_file(&locator, env)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// The coordinator's own configuration, if one is reachable.
    fn master_opts(&self) -> Option<MasterOpts>;
}

/// Strip the scheme from a locator, rejecting anything that could escape
/// the file root.
pub fn parse_locator(locator: &str) -> Result<&str, TransportError> {
    let rel = locator
        .strip_prefix(SCHEME)
        .ok_or_else(|| TransportError::InvalidLocator(locator.to_string()))?;
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() || rel.split('/').any(|part| part == "..") {
        return Err(TransportError::InvalidLocator(locator.to_string()));
    }
    Ok(rel)
}

/// Candidate locators for a dotted state document name.
/// `web.nginx` → `salt://web/nginx.sls`, then `salt://web/nginx/init.sls`.
pub fn sls_locators(sls: &str) -> [String; 2] {
    let base = sls.replace('.', "/");
    [
        format!("{}{}.sls", SCHEME, base),
        format!("{}{}/init.sls", SCHEME, base),
    ]
}

/// Resolve a `salt://` locator against the file root of `env`.
pub fn resolve_locator(
    roots: &IndexMap<String, PathBuf>,
    env: &str,
    locator: &str,
) -> Result<PathBuf, TransportError> {
    let rel = parse_locator(locator)?;
    let root = roots
        .get(env)
        .ok_or_else(|| TransportError::UnknownEnvironment(env.to_string()))?;
    Ok(root.join(Path::new(rel)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv011_parse_locator() {
        assert_eq!(parse_locator("salt://top.sls").unwrap(), "top.sls");
        assert_eq!(parse_locator("salt:///web/init.sls").unwrap(), "web/init.sls");
    }

    #[test]
    fn test_cv011_parse_locator_rejects() {
        assert!(parse_locator("/srv/salt/top.sls").is_err());
        assert!(parse_locator("salt://").is_err());
        assert!(parse_locator("salt://../etc/shadow").is_err());
    }

    #[test]
    fn test_cv011_sls_locators() {
        let [flat, init] = sls_locators("web.nginx");
        assert_eq!(flat, "salt://web/nginx.sls");
        assert_eq!(init, "salt://web/nginx/init.sls");
    }

    #[test]
    fn test_cv011_resolve_locator() {
        let mut roots = IndexMap::new();
        roots.insert("base".to_string(), PathBuf::from("/srv/salt"));
        let p = resolve_locator(&roots, "base", "salt://web/nginx.sls").unwrap();
        assert_eq!(p, PathBuf::from("/srv/salt/web/nginx.sls"));

        let err = resolve_locator(&roots, "prod", "salt://top.sls").unwrap_err();
        assert!(matches!(err, TransportError::UnknownEnvironment(_)));
    }

    #[test]
    fn test_cv011_exec_output_success() {
        let ok = ExecOutput { exit_code: 0, stdout: "ok".into(), stderr: "".into() };
        assert!(ok.success());
        let fail = ExecOutput { exit_code: 1, stdout: "".into(), stderr: "err".into() };
        assert!(!fail.success());
    }
}
