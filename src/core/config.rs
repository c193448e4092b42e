//! CV-003: Minion options, coordinator options and option derivation.
//!
//! Options load from a YAML file. When the minion is not running purely
//! locally, `gen_opts` overwrites the renderer and the top file location with
//! the coordinator's values and normalises the top location into a `salt://`
//! locator.

use super::error::ConfigError;
use crate::transport::{FileClient, SCHEME};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

/// Minion options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opts {
    /// Node identifier used by the matcher
    #[serde(default = "default_id")]
    pub id: String,

    /// Renderer for every template this node compiles
    #[serde(default = "default_renderer")]
    pub renderer: String,

    /// Top manifest locator
    #[serde(default = "default_state_top")]
    pub state_top: String,

    /// Skip the coordinator entirely
    #[serde(default = "default_true")]
    pub local_state: bool,

    /// Environment → file root directory
    #[serde(default = "default_file_roots")]
    pub file_roots: IndexMap<String, PathBuf>,

    /// Local cache for fetched documents
    #[serde(default = "default_cachedir")]
    pub cachedir: PathBuf,

    /// Node attributes for grain matching
    #[serde(default)]
    pub grains: IndexMap<String, Value>,

    /// Coordinator options document, served through the file client
    #[serde(default)]
    pub master_config: Option<PathBuf>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            id: default_id(),
            renderer: default_renderer(),
            state_top: default_state_top(),
            local_state: true,
            file_roots: default_file_roots(),
            cachedir: default_cachedir(),
            grains: IndexMap::new(),
            master_config: None,
        }
    }
}

fn default_id() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_renderer() -> String {
    "yaml".to_string()
}

fn default_state_top() -> String {
    format!("{}top.sls", SCHEME)
}

fn default_true() -> bool {
    true
}

fn default_file_roots() -> IndexMap<String, PathBuf> {
    IndexMap::from([("base".to_string(), PathBuf::from("/srv/salt"))])
}

fn default_cachedir() -> PathBuf {
    PathBuf::from("/var/cache/converge")
}

/// The coordinator's configuration, as far as this engine needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterOpts {
    pub renderer: String,
    pub state_top: String,
    pub file_root: String,
}

/// Parse minion options from YAML.
pub fn parse_opts(yaml: &str) -> Result<Opts, ConfigError> {
    parse_yaml(yaml, Path::new("<inline>"))
}

/// Load minion options from disk.
pub fn load_opts(path: &Path) -> Result<Opts, ConfigError> {
    let content = read(path)?;
    parse_yaml(&content, path)
}

/// Load coordinator options from disk.
pub fn load_master_opts(path: &Path) -> Result<MasterOpts, ConfigError> {
    let content = read(path)?;
    parse_yaml(&content, path)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_yaml<T: serde::de::DeserializeOwned>(yaml: &str, path: &Path) -> Result<T, ConfigError> {
    // An empty file means "all defaults".
    let yaml = if yaml.trim().is_empty() { "{}" } else { yaml };
    serde_yaml_ng::from_str(yaml).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Derive the options the highstate runs with.
///
/// Local runs keep their own options. Otherwise the renderer and top file come
/// from the coordinator.
pub fn gen_opts(mut opts: Opts, client: &dyn FileClient) -> Result<Opts, ConfigError> {
    if opts.local_state {
        return Ok(opts);
    }

    let master = client.master_opts().ok_or_else(|| {
        ConfigError::MissingMasterConfig("file client returned no coordinator options".to_string())
    })?;
    opts.renderer = master.renderer;
    opts.state_top = normalize_top(&master.state_top, &master.file_root)?;
    tracing::debug!(renderer = %opts.renderer, state_top = %opts.state_top, "derived options from coordinator");
    Ok(opts)
}

/// Turn the coordinator's top file setting into a `salt://` locator.
pub fn normalize_top(state_top: &str, file_root: &str) -> Result<String, ConfigError> {
    if state_top.starts_with(SCHEME) {
        return Ok(state_top.to_string());
    }

    if !file_root.is_empty() {
        if let Ok(rel) = Path::new(state_top).strip_prefix(file_root) {
            let rel: Vec<_> = rel.iter().map(|c| c.to_string_lossy()).collect();
            if !rel.is_empty() {
                return Ok(format!("{}{}", SCHEME, rel.join("/")));
            }
        }
    }

    if !state_top.starts_with('/') {
        return Ok(format!("{}{}", SCHEME, state_top));
    }

    tracing::error!(state_top, file_root, "invalid top file location");
    Err(ConfigError::InvalidTopLocation(state_top.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransportError;

    struct StubClient(Option<MasterOpts>);

    impl FileClient for StubClient {
        fn cache_file(&self, _: &str, _: &str) -> Result<Option<PathBuf>, TransportError> {
            Ok(None)
        }

        fn master_opts(&self) -> Option<MasterOpts> {
            self.0.clone()
        }
    }

    fn master(state_top: &str) -> MasterOpts {
        MasterOpts {
            renderer: "json".to_string(),
            state_top: state_top.to_string(),
            file_root: "/srv/salt".to_string(),
        }
    }

    #[test]
    fn test_cv003_defaults() {
        let opts = parse_opts("").unwrap();
        assert_eq!(opts.renderer, "yaml");
        assert_eq!(opts.state_top, "salt://top.sls");
        assert!(opts.local_state);
        assert_eq!(opts.file_roots["base"], PathBuf::from("/srv/salt"));
        assert!(opts.master_config.is_none());
    }

    #[test]
    fn test_cv003_parse_full() {
        let opts = parse_opts(
            r#"
id: web01
renderer: json
local_state: false
file_roots:
  base: /srv/salt
  prod: /srv/prod
cachedir: /tmp/cache
grains:
  os: Debian
  roles: [web, edge]
"#,
        )
        .unwrap();
        assert_eq!(opts.id, "web01");
        assert!(!opts.local_state);
        assert_eq!(opts.file_roots.len(), 2);
        assert_eq!(opts.grains["os"].as_str(), Some("Debian"));
    }

    #[test]
    fn test_cv003_parse_invalid() {
        let err = parse_opts("id: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_cv003_load_missing_file() {
        let err = load_opts(Path::new("/nonexistent/minion.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_cv003_load_master_opts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.yaml");
        std::fs::write(&path, "renderer: yaml\nstate_top: top.sls\nfile_root: /srv/salt\n").unwrap();
        let m = load_master_opts(&path).unwrap();
        assert_eq!(m.state_top, "top.sls");
    }

    #[test]
    fn test_cv003_gen_opts_local_untouched() {
        let opts = Opts::default();
        let out = gen_opts(opts.clone(), &StubClient(None)).unwrap();
        assert_eq!(out.renderer, opts.renderer);
        assert_eq!(out.state_top, opts.state_top);
    }

    #[test]
    fn test_cv003_gen_opts_remote() {
        let opts = Opts {
            local_state: false,
            ..Opts::default()
        };
        let out = gen_opts(opts, &StubClient(Some(master("/srv/salt/tops/top.sls")))).unwrap();
        assert_eq!(out.renderer, "json");
        assert_eq!(out.state_top, "salt://tops/top.sls");
    }

    #[test]
    fn test_cv003_gen_opts_missing_master() {
        let opts = Opts {
            local_state: false,
            ..Opts::default()
        };
        let err = gen_opts(opts, &StubClient(None)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingMasterConfig(_)));
    }

    #[test]
    fn test_cv003_normalize_top() {
        assert_eq!(normalize_top("salt://top.sls", "/srv/salt").unwrap(), "salt://top.sls");
        assert_eq!(normalize_top("/srv/salt/top.sls", "/srv/salt").unwrap(), "salt://top.sls");
        assert_eq!(normalize_top("top.sls", "/srv/salt").unwrap(), "salt://top.sls");
        assert_eq!(normalize_top("states/top.sls", "").unwrap(), "salt://states/top.sls");
    }

    #[test]
    fn test_cv003_normalize_top_rejects_foreign_absolute() {
        let err = normalize_top("/etc/top.sls", "/srv/salt").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTopLocation(_)));
        // Prefix match is per path component, not per character.
        assert!(normalize_top("/srv/saltier/top.sls", "/srv/salt").is_err());
    }
}
