//! Mark bookkeeping and the demand-driven resolution protocol.

use std::collections::HashMap;

use crate::export::sink::ImportSink;
use crate::export::ExportError;

/// Maps revision ids to fast-import marks and, once looked up, to the
/// commit ids the importer assigned them.
///
/// Marks are assigned in revision-arrival order the moment a revision is
/// scheduled for export. Resolution happens only when a later comment needs
/// to reference the commit id, because each resolution costs one round trip
/// to the importer.
#[derive(Debug)]
pub struct MarkTable {
    marks: HashMap<u64, usize>,
    resolved: HashMap<u64, String>,
    next_mark: usize,
}

impl Default for MarkTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkTable {
    pub fn new() -> Self {
        Self {
            marks: HashMap::new(),
            resolved: HashMap::new(),
            next_mark: 1,
        }
    }

    /// Register a revision about to be exported; returns its mark number.
    /// Idempotent for an already-registered revision.
    pub fn assign(&mut self, revision: u64) -> usize {
        let next_mark = &mut self.next_mark;
        *self.marks.entry(revision).or_insert_with(|| {
            let mark = *next_mark;
            *next_mark += 1;
            mark
        })
    }

    /// Mark number of a registered revision
    pub fn mark_of(&self, revision: u64) -> Option<usize> {
        self.marks.get(&revision).copied()
    }

    /// Commit id for a revision's mark, performing the request/reply round
    /// trip on first use and caching the answer.
    pub fn resolve(
        &mut self,
        revision: u64,
        sink: &mut dyn ImportSink,
    ) -> Result<String, ExportError> {
        if let Some(id) = self.resolved.get(&revision) {
            return Ok(id.clone());
        }

        let mark = self
            .mark_of(revision)
            .ok_or_else(|| ExportError::UnresolvableReference {
                revision,
                reason: "no mark assigned".to_string(),
            })?;

        sink.request_mark(mark)
            .map_err(|e| ExportError::UnresolvableReference {
                revision,
                reason: e.to_string(),
            })?;
        let reply = sink
            .await_mark()
            .map_err(|e| ExportError::UnresolvableReference {
                revision,
                reason: e.to_string(),
            })?;

        let id = reply.trim().to_string();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ExportError::UnresolvableReference {
                revision,
                reason: format!("malformed reply {:?}", reply),
            });
        }

        self.resolved.insert(revision, id.clone());
        Ok(id)
    }
}
