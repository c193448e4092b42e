//! CV-013: Top-manifest matching.
//!
//! A top manifest maps match expressions to targets. The target list may
//! carry a `{match: <kind>}` mapping choosing how the expression is read:
//! - `glob` (default): shell glob against the node id
//! - `pcre`: regular expression, anchored at both ends, against the node id
//! - `list`: comma-separated node ids
//! - `grain`: `key:glob` against a node attribute
//! - `grain_pcre`: `key:regex` against a node attribute
//!
//! A list-valued attribute matches when any element does.

use crate::core::config::Opts;
use crate::core::types::scalar_to_string;
use indexmap::IndexMap;
use regex::Regex;
use serde_yaml_ng::Value;

/// Decides whether a top-manifest entry applies to this node.
pub trait Matcher {
    fn confirm_top(&self, expr: &str, targets: &[Value]) -> bool;
}

/// Matches against a node id and its grains.
#[derive(Debug, Clone)]
pub struct NodeMatcher {
    id: String,
    grains: IndexMap<String, Value>,
}

impl NodeMatcher {
    pub fn new(id: impl Into<String>, grains: IndexMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            grains,
        }
    }

    pub fn from_opts(opts: &Opts) -> Self {
        Self::new(opts.id.clone(), opts.grains.clone())
    }

    pub fn glob_match(&self, expr: &str) -> bool {
        glob_matches(expr, &self.id)
    }

    pub fn pcre_match(&self, expr: &str) -> bool {
        regex_matches(expr, &self.id)
    }

    pub fn list_match(&self, expr: &str) -> bool {
        expr.split(',').map(str::trim).any(|id| id == self.id)
    }

    pub fn grain_match(&self, expr: &str) -> bool {
        self.grain_with(expr, glob_matches)
    }

    pub fn grain_pcre_match(&self, expr: &str) -> bool {
        self.grain_with(expr, regex_matches)
    }

    fn grain_with(&self, expr: &str, matches: fn(&str, &str) -> bool) -> bool {
        let Some((key, pattern)) = expr.split_once(':') else {
            tracing::warn!(expr, "grain match expression must be key:pattern");
            return false;
        };
        match self.grains.get(key) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(scalar_to_string)
                .any(|v| matches(pattern, &v)),
            Some(v) => scalar_to_string(v).is_some_and(|v| matches(pattern, &v)),
            None => false,
        }
    }
}

impl Matcher for NodeMatcher {
    fn confirm_top(&self, expr: &str, targets: &[Value]) -> bool {
        match match_kind(targets) {
            "glob" => self.glob_match(expr),
            "pcre" => self.pcre_match(expr),
            "list" => self.list_match(expr),
            "grain" => self.grain_match(expr),
            "grain_pcre" => self.grain_pcre_match(expr),
            other => {
                tracing::warn!(kind = other, expr, "unsupported match type");
                false
            }
        }
    }
}

/// The first `match:` option among the targets, or `glob`.
fn match_kind(targets: &[Value]) -> &str {
    targets
        .iter()
        .filter_map(|t| t.as_mapping())
        .find_map(|m| m.get("match").and_then(Value::as_str))
        .unwrap_or("glob")
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(value),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid glob");
            false
        }
    }
}

fn regex_matches(pattern: &str, value: &str) -> bool {
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid regex");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeMatcher {
        let grains: IndexMap<String, Value> =
            serde_yaml_ng::from_str("os: Debian\nroles: [web, cache]\ncores: 8\n").unwrap();
        NodeMatcher::new("web01.example.com", grains)
    }

    fn targets(yaml: &str) -> Vec<Value> {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn test_cv013_glob_default() {
        let m = node();
        assert!(m.confirm_top("*", &targets("[core]")));
        assert!(m.confirm_top("web*", &targets("[core]")));
        assert!(!m.confirm_top("db*", &targets("[core]")));
    }

    #[test]
    fn test_cv013_pcre_anchored() {
        let m = node();
        let t = targets("[{match: pcre}, core]");
        assert!(m.confirm_top(r"web\d+\..*", &t));
        assert!(!m.confirm_top("web", &t));
        assert!(!m.confirm_top("(", &t));
    }

    #[test]
    fn test_cv013_list() {
        let m = node();
        let t = targets("[{match: list}, core]");
        assert!(m.confirm_top("db01, web01.example.com", &t));
        assert!(!m.confirm_top("db01,db02", &t));
    }

    #[test]
    fn test_cv013_grain() {
        let m = node();
        let t = targets("[{match: grain}, core]");
        assert!(m.confirm_top("os:Deb*", &t));
        assert!(m.confirm_top("roles:cache", &t));
        assert!(m.confirm_top("cores:8", &t));
        assert!(!m.confirm_top("os:RedHat", &t));
        assert!(!m.confirm_top("kernel:Linux", &t));
        assert!(!m.confirm_top("no-colon", &t));
    }

    #[test]
    fn test_cv013_grain_pcre() {
        let m = node();
        let t = targets("[{match: grain_pcre}, core]");
        assert!(m.confirm_top("roles:(web|db)", &t));
        assert!(!m.confirm_top("roles:we", &t));
    }

    #[test]
    fn test_cv013_unknown_kind() {
        assert!(!node().confirm_top("*", &targets("[{match: compound}, core]")));
    }
}
