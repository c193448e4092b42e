//! CV-010: State facade with one entry point per pipeline stage.
//!
//! `State` owns the options and both registries. Every `call_*` runs the
//! same pipeline from a different starting point:
//! template → high data → chunks → validation → execution.

use super::binder::{self, BoundCall};
use super::compiler;
use super::config::Opts;
use super::error::{BindError, EngineError, ExecError};
use super::executor::{self, RequireStatus};
use super::registry::ActionRegistry;
use super::template::{self, RendererRegistry};
use super::types::{CallOutcome, Chunk, HighData, Ledger, LowInput, StateResult};
use super::validator;
use std::path::Path;

pub struct State {
    opts: Opts,
    registry: ActionRegistry,
    renderers: RendererRegistry,
}

impl State {
    pub fn new(opts: Opts, registry: ActionRegistry, renderers: RendererRegistry) -> Self {
        Self {
            opts,
            registry,
            renderers,
        }
    }

    /// Built-in actions and the default renderers.
    pub fn from_opts(opts: Opts) -> Self {
        let registry = crate::states::builtin_registry(&opts);
        Self::new(opts, registry, RendererRegistry::default())
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    pub fn verify_data(&self, chunk: &Chunk) -> Vec<String> {
        validator::verify_data(chunk, &self.registry)
    }

    pub fn verify_chunks(&self, chunks: &[Chunk]) -> Vec<String> {
        validator::verify_chunks(chunks, &self.registry)
    }

    pub fn format_call(&self, chunk: &Chunk) -> Result<BoundCall, BindError> {
        binder::format_call(chunk, &self.registry)
    }

    pub fn compile_high_data(&self, high: &HighData) -> Vec<Chunk> {
        compiler::compile_high_data(high)
    }

    /// Render a template with the configured renderer and shape-check it.
    pub fn compile_template(&self, path: &Path) -> Result<HighData, EngineError> {
        let doc = template::compile_template(path, &self.opts.renderer, &self.renderers)?;
        Ok(HighData::from_document(&doc)?)
    }

    pub fn compile_template_str(&self, text: &str) -> Result<HighData, EngineError> {
        let doc = template::compile_template_str(text, &self.opts.renderer, &self.renderers)?;
        Ok(HighData::from_document(&doc)?)
    }

    pub fn call(&self, chunk: &Chunk) -> Result<StateResult, ExecError> {
        executor::call(chunk, &self.registry)
    }

    pub fn check_requires(
        &self,
        chunk: &Chunk,
        ledger: &Ledger,
        chunks: &[Chunk],
    ) -> Result<RequireStatus, ExecError> {
        executor::check_requires(chunk, ledger, chunks)
    }

    pub fn call_chunk(&self, chunk: &Chunk, ledger: &mut Ledger, chunks: &[Chunk]) -> Result<(), ExecError> {
        executor::call_chunk(chunk, ledger, chunks, &self.registry)
    }

    pub fn call_chunks(&self, chunks: &[Chunk]) -> Result<Ledger, ExecError> {
        executor::call_chunks(chunks, &self.registry)
    }

    /// Compile, validate, execute. Validation errors mean nothing runs.
    pub fn call_high(&self, high: &HighData) -> Result<CallOutcome, EngineError> {
        let chunks = self.compile_high_data(high);
        self.run_verified(&chunks)
    }

    /// Execute a template. An empty template yields an empty ledger.
    pub fn call_template(&self, path: &Path) -> Result<CallOutcome, EngineError> {
        let high = self.compile_template(path)?;
        self.call_compiled(high)
    }

    pub fn call_template_str(&self, text: &str) -> Result<CallOutcome, EngineError> {
        let high = self.compile_template_str(text)?;
        self.call_compiled(high)
    }

    /// Execute externally supplied low data: one chunk or a batch.
    pub fn call_low(&self, low: LowInput) -> Result<CallOutcome, EngineError> {
        let mut chunks = low.into_chunks();
        compiler::sort_chunks(&mut chunks);
        self.run_verified(&chunks)
    }

    fn call_compiled(&self, high: HighData) -> Result<CallOutcome, EngineError> {
        if high.is_empty() {
            tracing::debug!("template rendered no states");
            return Ok(CallOutcome::Ledger(Ledger::new()));
        }
        self.call_high(&high)
    }

    fn run_verified(&self, chunks: &[Chunk]) -> Result<CallOutcome, EngineError> {
        let errors = self.verify_chunks(chunks);
        if !errors.is_empty() {
            tracing::warn!(errors = errors.len(), "validation failed, nothing executed");
            return Ok(CallOutcome::Errors(errors));
        }
        Ok(CallOutcome::Ledger(self.call_chunks(chunks)?))
    }
}
