//! CV-011: Local transport: file roots on disk and bash execution.

use super::{resolve_locator, ExecOutput, FileClient};
use crate::core::config::{MasterOpts, Opts};
use crate::core::error::TransportError;
use indexmap::IndexMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Serves `salt://` documents from per-environment directories and copies
/// them into `cachedir/files/<env>/...`.
#[derive(Debug, Clone)]
pub struct LocalFileClient {
    roots: IndexMap<String, PathBuf>,
    cachedir: PathBuf,
    master: Option<MasterOpts>,
}

impl LocalFileClient {
    pub fn new(roots: IndexMap<String, PathBuf>, cachedir: PathBuf) -> Self {
        Self {
            roots,
            cachedir,
            master: None,
        }
    }

    /// Client for a minion's options, without coordinator options.
    pub fn from_opts(opts: &Opts) -> Self {
        Self::new(opts.file_roots.clone(), opts.cachedir.clone())
    }

    /// Attach coordinator options served by `master_opts`.
    pub fn with_master(mut self, master: MasterOpts) -> Self {
        self.master = Some(master);
        self
    }

    fn cache_path(&self, env: &str, locator: &str) -> Result<PathBuf, TransportError> {
        let rel = super::parse_locator(locator)?;
        Ok(self.cachedir.join("files").join(env).join(rel))
    }
}

impl FileClient for LocalFileClient {
    fn cache_file(&self, locator: &str, env: &str) -> Result<Option<PathBuf>, TransportError> {
        let source = resolve_locator(&self.roots, env, locator)?;
        if !source.is_file() {
            tracing::debug!(locator, env, "not found in file root");
            return Ok(None);
        }

        let dest = self.cache_path(env, locator)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::copy(&source, &dest).map_err(|e| TransportError::Io {
            path: dest.clone(),
            source: e,
        })?;
        tracing::debug!(locator, env, cached = %dest.display(), "cached file");
        Ok(Some(dest))
    }

    fn master_opts(&self) -> Option<MasterOpts> {
        self.master.clone()
    }
}

/// Execute a shell script locally via `bash`.
pub fn exec_local(script: &str) -> Result<ExecOutput, String> {
    let mut child = Command::new("bash")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn bash: {}", e))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| format!("stdin write error: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(root: &std::path::Path, cache: &std::path::Path) -> LocalFileClient {
        let mut roots = IndexMap::new();
        roots.insert("base".to_string(), root.to_path_buf());
        LocalFileClient::new(roots, cache.to_path_buf())
    }

    #[test]
    fn test_cv011_cache_file() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("top.sls"), "base: {}\n").unwrap();

        let c = client(root.path(), cache.path());
        let cached = c.cache_file("salt://top.sls", "base").unwrap().unwrap();
        assert_eq!(cached, cache.path().join("files/base/top.sls"));
        assert_eq!(std::fs::read_to_string(cached).unwrap(), "base: {}\n");
    }

    #[test]
    fn test_cv011_cache_file_missing() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = client(root.path(), cache.path());
        assert!(c.cache_file("salt://nope.sls", "base").unwrap().is_none());
    }

    #[test]
    fn test_cv011_get_state_prefers_flat_then_init() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("web")).unwrap();
        std::fs::write(root.path().join("web/init.sls"), "a: {}\n").unwrap();
        std::fs::write(root.path().join("db.sls"), "b: {}\n").unwrap();

        let c = client(root.path(), cache.path());
        let web = c.get_state("web", "base").unwrap().unwrap();
        assert!(web.ends_with("files/base/web/init.sls"));
        let db = c.get_state("db", "base").unwrap().unwrap();
        assert!(db.ends_with("files/base/db.sls"));
        assert!(c.get_state("ghost", "base").unwrap().is_none());
    }

    #[test]
    fn test_cv011_unknown_env() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = client(root.path(), cache.path());
        assert!(c.cache_file("salt://top.sls", "prod").is_err());
    }

    #[test]
    fn test_cv011_master_opts() {
        let root = tempfile::tempdir().unwrap();
        let c = client(root.path(), root.path());
        assert!(c.master_opts().is_none());
        let c = c.with_master(MasterOpts {
            renderer: "json".to_string(),
            state_top: "top.sls".to_string(),
            file_root: "/srv/salt".to_string(),
        });
        assert_eq!(c.master_opts().unwrap().renderer, "json");
    }

    #[test]
    fn test_cv011_local_echo() {
        let out = exec_local("echo hello").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_cv011_local_failure() {
        let out = exec_local("exit 42").unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[test]
    fn test_cv011_local_stderr() {
        let out = exec_local("echo err >&2").unwrap();
        assert!(out.success());
        assert!(out.stderr.contains("err"));
    }
}
