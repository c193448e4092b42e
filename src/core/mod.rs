//! Core engine: document model, compilation, validation, execution.

pub mod binder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod highstate;
pub mod registry;
pub mod state;
pub mod template;
pub mod types;
pub mod validator;
