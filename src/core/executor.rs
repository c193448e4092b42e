//! CV-009: Dependency executor. Runs chunks honouring `require` edges.
//!
//! Each chunk's requisites resolve to a status against the run ledger:
//! - `met`: nothing required, or every required chunk recorded success
//! - `unmet`: some required chunk has no ledger entry yet
//! - `fail`: nothing unmet, but some required chunk recorded failure
//!
//! Unmet requisites are resolved first through an explicit worklist; a chunk
//! met again while its own requisites are still being resolved is a cycle.
//! The ledger doubles as the de-duplication boundary: a tag already recorded
//! is never invoked twice in one pass.

use super::binder::format_call;
use super::error::{BindError, ExecError};
use super::registry::ActionRegistry;
use super::types::{Chunk, Ledger, StateResult};
use rustc_hash::FxHashSet;
use std::fmt;
use std::time::Instant;

/// Requisite status of one chunk against the current ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireStatus {
    Met,
    Unmet,
    Fail,
}

impl fmt::Display for RequireStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Met => write!(f, "met"),
            Self::Unmet => write!(f, "unmet"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

fn tag_of(chunk: &Chunk) -> Result<String, BindError> {
    let state = chunk.state().ok_or(BindError::MissingField("state"))?;
    let name = chunk.name().ok_or(BindError::MissingField("name"))?;
    let fun = chunk.fun().ok_or(BindError::MissingField("fun"))?;
    Ok(format!("{}.{}.{}", state, name, fun))
}

/// Resolve `require` entries to the chunks they name, by linear scan.
/// An entry that names no chunk contributes nothing.
pub fn resolve_requisites<'c>(chunk: &Chunk, chunks: &'c [Chunk]) -> Result<Vec<&'c Chunk>, ExecError> {
    let reqs = chunk.requisites().map_err(|message| ExecError::InvalidRequire {
        tag: chunk.tag().unwrap_or_default(),
        message,
    })?;

    let mut found: Vec<&'c Chunk> = Vec::new();
    for req in &reqs {
        let mut matched = false;
        for candidate in chunks.iter().filter(|c| req.matches(c)) {
            matched = true;
            if !found.iter().any(|f| std::ptr::eq(*f, candidate)) {
                found.push(candidate);
            }
        }
        if !matched {
            tracing::warn!(requisite = %req, tag = ?chunk.tag(), "requisite matches no chunk");
        }
    }
    Ok(found)
}

fn status_of<'c>(reqs: &[&'c Chunk], ledger: &Ledger) -> Result<RequireStatus, ExecError> {
    let mut failed = false;
    for req in reqs {
        match ledger.get(&tag_of(req)?) {
            None => return Ok(RequireStatus::Unmet),
            Some(r) if !r.result => failed = true,
            Some(_) => {}
        }
    }
    Ok(if failed {
        RequireStatus::Fail
    } else {
        RequireStatus::Met
    })
}

/// Status of a chunk's requisites. Unmet takes precedence over fail.
pub fn check_requires(chunk: &Chunk, ledger: &Ledger, chunks: &[Chunk]) -> Result<RequireStatus, ExecError> {
    let reqs = resolve_requisites(chunk, chunks)?;
    status_of(&reqs, ledger)
}

/// Bind and invoke a chunk's action, ignoring requisites.
pub fn call(chunk: &Chunk, registry: &ActionRegistry) -> Result<StateResult, ExecError> {
    let tag = tag_of(chunk)?;
    let bound = format_call(chunk, registry)?;
    let action = registry
        .get(&bound.full)
        .ok_or_else(|| BindError::UnknownAction(bound.full.clone()))?;

    let start = Instant::now();
    let result = action
        .invoke(&bound.args)
        .map_err(|message| ExecError::ActionFault {
            tag: tag.clone(),
            message,
        })?;
    tracing::info!(
        tag = %tag,
        result = result.result,
        duration_ms = start.elapsed().as_millis() as u64,
        "{}",
        result.comment
    );
    Ok(result)
}

struct Frame<'c> {
    chunk: &'c Chunk,
    tag: String,
    /// Its unmet requisites have already been pushed above it.
    expanded: bool,
}

/// Resolve one chunk: run its unmet requisites first, then run it (or record
/// a requisite failure). Results go into `ledger`.
pub fn call_chunk<'c>(
    chunk: &'c Chunk,
    ledger: &mut Ledger,
    chunks: &'c [Chunk],
    registry: &ActionRegistry,
) -> Result<(), ExecError> {
    let mut in_progress: FxHashSet<String> = FxHashSet::default();
    let mut stack = vec![Frame {
        tag: tag_of(chunk)?,
        chunk,
        expanded: false,
    }];

    while let Some(frame) = stack.pop() {
        if ledger.contains(&frame.tag) {
            in_progress.remove(&frame.tag);
            continue;
        }

        let reqs = resolve_requisites(frame.chunk, chunks)?;
        match status_of(&reqs, ledger)? {
            RequireStatus::Met => {
                let result = call(frame.chunk, registry)?;
                ledger.insert(frame.tag.clone(), result);
                in_progress.remove(&frame.tag);
            }
            RequireStatus::Fail => {
                tracing::warn!(tag = %frame.tag, "requisite failed, not running");
                ledger.insert(frame.tag.clone(), StateResult::requisite_failed());
                in_progress.remove(&frame.tag);
            }
            RequireStatus::Unmet => {
                if frame.expanded {
                    return Err(ExecError::Unresolved(frame.tag));
                }
                tracing::debug!(tag = %frame.tag, requisites = reqs.len(), "requisites unmet, resolving first");

                let mut pending = Vec::new();
                for req in reqs {
                    let req_tag = tag_of(req)?;
                    if ledger.contains(&req_tag) {
                        continue;
                    }
                    if req_tag == frame.tag || in_progress.contains(&req_tag) {
                        return Err(ExecError::CyclicDependency {
                            tag: req_tag,
                            required_by: frame.tag,
                        });
                    }
                    pending.push(Frame {
                        chunk: req,
                        tag: req_tag,
                        expanded: false,
                    });
                }

                in_progress.insert(frame.tag.clone());
                stack.push(Frame {
                    expanded: true,
                    ..frame
                });
                // First listed requisite resolves first.
                stack.extend(pending.into_iter().rev());
            }
        }
    }

    Ok(())
}

/// Run every chunk in the given order, threading one ledger through.
pub fn call_chunks(chunks: &[Chunk], registry: &ActionRegistry) -> Result<Ledger, ExecError> {
    let start = Instant::now();
    let mut ledger = Ledger::new();
    for chunk in chunks {
        call_chunk(chunk, &mut ledger, chunks, registry)?;
    }
    tracing::info!(
        chunks = chunks.len(),
        succeeded = ledger.succeeded(),
        failed = ledger.failed(),
        duration_ms = start.elapsed().as_millis() as u64,
        "pass complete"
    );
    Ok(ledger)
}
