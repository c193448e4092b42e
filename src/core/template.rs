//! CV-004: Template compiler: document locator (or inline text) to a
//! rendered document, through a named renderer.

use super::error::{ConfigError, EngineError, RenderError};
use super::types::Document;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::io::Write;
use std::path::Path;

/// Turns a document on disk into a document tree.
pub type RenderFn = fn(&Path) -> Result<Document, RenderError>;

/// Renderer name → render function.
#[derive(Debug, Clone)]
pub struct RendererRegistry {
    renderers: IndexMap<String, RenderFn>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register("yaml", render_yaml);
        reg.register("json", render_json);
        reg
    }
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: IndexMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, render: RenderFn) {
        self.renderers.insert(name.to_string(), render);
    }

    pub fn get(&self, name: &str) -> Result<RenderFn, ConfigError> {
        self.renderers
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownRenderer(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(String::as_str)
    }
}

fn read_template(path: &Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path).map_err(|e| RenderError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Plain YAML.
pub fn render_yaml(path: &Path) -> Result<Document, RenderError> {
    let content = read_template(path)?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml_ng::from_str(&content).map_err(|e| RenderError::Syntax {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Plain JSON, converted into the same document tree as YAML.
pub fn render_json(path: &Path) -> Result<Document, RenderError> {
    let content = read_template(path)?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    let syntax = |message: String| RenderError::Syntax {
        path: path.to_path_buf(),
        message,
    };
    let json: serde_json::Value = serde_json::from_str(&content).map_err(|e| syntax(e.to_string()))?;
    serde_yaml_ng::to_value(json).map_err(|e| syntax(e.to_string()))
}

/// Render the document at `path`. A path that is not a file renders to an
/// empty document.
pub fn compile_template(
    path: &Path,
    renderer: &str,
    registry: &RendererRegistry,
) -> Result<Document, EngineError> {
    let render = registry.get(renderer)?;
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "template does not exist");
        return Ok(Value::Null);
    }
    Ok(render(path)?)
}

/// Render inline text. The text is written to a temporary file that is
/// removed when this function returns, whatever the outcome.
pub fn compile_template_str(
    text: &str,
    renderer: &str,
    registry: &RendererRegistry,
) -> Result<Document, EngineError> {
    let render = registry.get(renderer)?;
    let mut tmp = tempfile::NamedTempFile::new().map_err(|e| RenderError::Io {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let written = tmp.write_all(text.as_bytes()).and_then(|()| tmp.flush());
    written.map_err(|e| RenderError::Io {
        path: tmp.path().to_path_buf(),
        source: e,
    })?;
    Ok(render(tmp.path())?)
}
