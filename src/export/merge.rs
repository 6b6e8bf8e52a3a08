//! Time-ordered k-way merge of per-article revision streams.

use anyhow::Result;

use crate::mediawiki::{Revision, RevisionSource};

/// Merges N individually time-ordered revision sources into one globally
/// time-ordered sequence, tagging each revision with its source index.
///
/// Heads are pulled lazily, one at a time per source, so a source backed by
/// the network fetches no further ahead than the merge needs. Equal
/// timestamps are broken by source index (lower wins), keeping the merge
/// deterministic and stable.
pub struct RevisionMerger {
    sources: Vec<Box<dyn RevisionSource>>,
    heads: Vec<Option<Revision>>,
    primed: bool,
}

impl RevisionMerger {
    pub fn new(sources: Vec<Box<dyn RevisionSource>>) -> Self {
        let heads = sources.iter().map(|_| None).collect();
        Self {
            sources,
            heads,
            primed: false,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Article title of a source, for error reporting
    pub fn article(&self, index: usize) -> &str {
        self.sources[index].article()
    }

    /// On-demand full text from the source a revision came from
    pub fn fetch_text(&mut self, index: usize, revision: u64) -> Result<String> {
        self.sources[index].fetch_text(revision)
    }

    fn prime(&mut self) -> Result<()> {
        for (index, source) in self.sources.iter_mut().enumerate() {
            self.heads[index] = source.next_revision()?;
        }
        Ok(())
    }

    /// The next revision in global timestamp order, or `None` when every
    /// source is exhausted
    pub fn next(&mut self) -> Result<Option<(usize, Revision)>> {
        if !self.primed {
            self.prime()?;
            self.primed = true;
        }

        let best = self
            .heads
            .iter()
            .enumerate()
            .filter_map(|(index, head)| head.as_ref().map(|r| (r.timestamp, index)))
            .min();
        let Some((_, index)) = best else {
            return Ok(None);
        };

        let Some(revision) = self.heads[index].take() else {
            return Ok(None);
        };
        self.heads[index] = self.sources[index].next_revision()?;
        Ok(Some((index, revision)))
    }
}
