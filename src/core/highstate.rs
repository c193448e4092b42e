//! CV-014: HighState orchestrator.
//!
//! Builds this node's desired state: fetch the top manifest, keep the entries
//! whose match expression accepts this node, fetch every listed state
//! document, merge them, run the result.

use super::config::{gen_opts, Opts};
use super::error::{EngineError, TransportError};
use super::registry::ActionRegistry;
use super::state::State;
use super::template::{self, RendererRegistry};
use super::types::{CallOutcome, HighData, TopData};
use crate::matcher::Matcher;
use crate::transport::FileClient;
use indexmap::{IndexMap, IndexSet};
use std::path::PathBuf;

/// Environment the top manifest is always fetched from.
const TOP_ENV: &str = "base";

pub struct HighState {
    state: State,
    client: Box<dyn FileClient>,
    matcher: Box<dyn Matcher>,
}

impl HighState {
    /// Derive the run options (see `gen_opts`) and build a `State` with the
    /// built-in actions.
    pub fn new(opts: Opts, client: Box<dyn FileClient>, matcher: Box<dyn Matcher>) -> Result<Self, EngineError> {
        let opts = gen_opts(opts, client.as_ref())?;
        Ok(Self {
            state: State::from_opts(opts),
            client,
            matcher,
        })
    }

    /// Like `new`, with caller-supplied registries.
    pub fn with_registries(
        opts: Opts,
        registry: ActionRegistry,
        renderers: RendererRegistry,
        client: Box<dyn FileClient>,
        matcher: Box<dyn Matcher>,
    ) -> Result<Self, EngineError> {
        let opts = gen_opts(opts, client.as_ref())?;
        Ok(Self {
            state: State::new(opts, registry, renderers),
            client,
            matcher,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Fetch and parse the top manifest. A missing manifest is empty.
    pub fn get_top(&self) -> Result<TopData, EngineError> {
        let opts = self.state.opts();
        let Some(path) = self.client.cache_file(&opts.state_top, TOP_ENV)? else {
            tracing::warn!(state_top = %opts.state_top, "no top file found");
            return Ok(TopData::default());
        };
        let doc = template::compile_template(&path, &opts.renderer, self.state.renderers())?;
        Ok(TopData::from_document(&doc)?)
    }

    /// Environment → state document names whose expressions match this node.
    pub fn top_matches(&self, top: &TopData) -> IndexMap<String, IndexSet<String>> {
        let mut matches: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for (env, exprs) in top.iter() {
            for (expr, targets) in exprs {
                if !self.matcher.confirm_top(expr, targets) {
                    continue;
                }
                tracing::debug!(env = %env, expr = %expr, "top entry matched");
                let docs = targets.iter().filter_map(|t| t.as_str().map(str::to_string));
                matches.entry(env.clone()).or_default().extend(docs);
            }
        }
        matches
    }

    /// Cache every matched state document. Ones that cannot be found, or that
    /// name an environment without a file root, are skipped.
    pub fn gather_states(&self, matches: &IndexMap<String, IndexSet<String>>) -> Result<Vec<PathBuf>, EngineError> {
        let mut group = Vec::new();
        for (env, docs) in matches {
            for sls in docs {
                match self.client.get_state(sls, env) {
                    Ok(Some(path)) => group.push(path),
                    Ok(None) => tracing::warn!(sls = %sls, env = %env, "state document not found"),
                    Err(TransportError::UnknownEnvironment(_)) => {
                        tracing::warn!(sls = %sls, env = %env, "environment has no file root")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(group)
    }

    /// Compile every document and merge. A name declared twice keeps the
    /// body from the last document.
    pub fn render_highstate(&self, group: &[PathBuf]) -> Result<HighData, EngineError> {
        let mut high = HighData::default();
        for path in group {
            high.merge(self.state.compile_template(path)?);
        }
        Ok(high)
    }

    /// Every stage up to, not including, execution.
    pub fn compile_highstate(&self) -> Result<HighData, EngineError> {
        let top = self.get_top()?;
        let matches = self.top_matches(&top);
        let group = self.gather_states(&matches)?;
        self.render_highstate(&group)
    }

    pub fn call_highstate(&self) -> Result<CallOutcome, EngineError> {
        let high = self.compile_highstate()?;
        tracing::info!(names = high.len(), "running highstate");
        self.state.call_high(&high)
    }
}
