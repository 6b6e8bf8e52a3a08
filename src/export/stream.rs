//! Serialization of merged revision histories into a fast-import stream.

use std::collections::HashMap;
use std::io::Write;

use crate::diff::parser::HunkParser;
use crate::diff::patch::{self, PatchError, Snapshot};
use crate::export::annotate::CommentAnnotator;
use crate::export::marks::MarkTable;
use crate::export::merge::RevisionMerger;
use crate::export::sink::ImportSink;
use crate::export::{AnnotateOptions, ExportError};
use crate::mediawiki::{Revision, RevisionPayload, Site};
use crate::utils::{article_filename, underscored};

/// Export-wide settings
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Branch the stream commits to (short name)
    pub branch: String,
    pub annotate: AnnotateOptions,
    /// Cross-check every reconstruction against independently fetched text
    pub verify: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            branch: "master".to_string(),
            annotate: AnnotateOptions::default(),
            verify: false,
        }
    }
}

/// Drives the pipeline: pulls merged revisions, reconstructs text, annotates
/// comments and writes one commit record per revision.
///
/// Owns the mark table and the per-article snapshot cache; both are mutated
/// only on this single control path.
pub struct StreamExporter<S: ImportSink> {
    sink: S,
    site: Site,
    options: ExportOptions,
    marks: MarkTable,
    snapshots: HashMap<String, Snapshot>,
}

impl<S: ImportSink> StreamExporter<S> {
    pub fn new(sink: S, site: Site, options: ExportOptions) -> Self {
        Self {
            sink,
            site,
            options,
            marks: MarkTable::new(),
            snapshots: HashMap::new(),
        }
    }

    /// Recover the sink after the stream is complete
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.options.branch)
    }

    /// Export every revision the merger yields, then terminate the stream.
    /// `on_revision` is called once per revision before it is written.
    pub fn export(
        &mut self,
        merger: &mut RevisionMerger,
        mut on_revision: impl FnMut(&Revision),
    ) -> Result<(), ExportError> {
        writeln!(self.sink, "reset {}", self.branch_ref())?;

        while let Some((index, revision)) = merger.next()? {
            on_revision(&revision);
            self.export_revision(index, revision, merger)?;
        }

        self.sink.write_all(b"done\n")?;
        self.sink.flush()?;
        Ok(())
    }

    fn export_revision(
        &mut self,
        index: usize,
        revision: Revision,
        merger: &mut RevisionMerger,
    ) -> Result<(), ExportError> {
        let mark = self.marks.assign(revision.id);
        let snapshot = self.reconstruct(index, &revision, merger)?;

        let annotator = CommentAnnotator::new(&self.site, self.options.annotate);
        let message = annotator.annotate(&revision, &mut self.marks, &mut self.sink)?;

        let text = snapshot.to_text();
        self.snapshots.insert(revision.article.clone(), snapshot);

        self.write_commit(&revision, mark, &message, &text)?;
        Ok(())
    }

    /// Full text of the revision, from the payload or by patching the cached
    /// snapshot of the article
    fn reconstruct(
        &mut self,
        index: usize,
        revision: &Revision,
        merger: &mut RevisionMerger,
    ) -> Result<Snapshot, ExportError> {
        match &revision.payload {
            RevisionPayload::FullText(text) => Ok(Snapshot::from_text(text)),

            RevisionPayload::Diff(body) => {
                let Some(base) = self.snapshots.get(&revision.article) else {
                    return Err(ExportError::MissingBaseRevision {
                        article: revision.article.clone(),
                        revision: revision.id,
                    });
                };

                let next = patch::apply(base, HunkParser::new(body)).map_err(|e| match e {
                    PatchError::Malformed(source) => ExportError::MalformedDiff {
                        article: revision.article.clone(),
                        revision: revision.id,
                        source,
                    },
                    other => ExportError::DiffMismatch {
                        article: revision.article.clone(),
                        revision: revision.id,
                        detail: other.to_string(),
                    },
                })?;

                if self.options.verify {
                    let fetched = merger.fetch_text(index, revision.id)?;
                    if fetched != next.to_text() {
                        return Err(ExportError::DiffMismatch {
                            article: revision.article.clone(),
                            revision: revision.id,
                            detail: "reconstructed text disagrees with independently fetched copy"
                                .to_string(),
                        });
                    }
                }

                Ok(next)
            }

            RevisionPayload::Missing => {
                // A diff-less, text-less revision is only recoverable through
                // the on-demand fetch, and only once a history exists at all.
                if !self.snapshots.contains_key(&revision.article) {
                    return Err(ExportError::MissingBaseRevision {
                        article: revision.article.clone(),
                        revision: revision.id,
                    });
                }
                let text = merger.fetch_text(index, revision.id)?;
                Ok(Snapshot::from_text(&text))
            }
        }
    }

    fn write_commit(
        &mut self,
        revision: &Revision,
        mark: usize,
        message: &str,
        text: &str,
    ) -> Result<(), ExportError> {
        let committer = if revision.user_id.is_some() {
            format!(
                "{} <{}@{}>",
                revision.user,
                underscored(&revision.user),
                self.site.host
            )
        } else {
            format!("{} <>", revision.user)
        };

        writeln!(self.sink, "commit {}", self.branch_ref())?;
        writeln!(self.sink, "mark :{}", mark)?;
        writeln!(self.sink, "committer {} {} +0000", committer, revision.epoch())?;
        write_data(&mut self.sink, message.as_bytes())?;
        writeln!(
            self.sink,
            "M 644 inline {}",
            article_filename(&revision.article)
        )?;
        write_data(&mut self.sink, text.as_bytes())?;

        // The record is durable once its content block is flushed.
        self.sink.flush()?;
        Ok(())
    }
}

/// Length-prefixed data block
fn write_data(sink: &mut impl Write, payload: &[u8]) -> std::io::Result<()> {
    writeln!(sink, "data {}", payload.len())?;
    sink.write_all(payload)?;
    sink.write_all(b"\n")?;
    Ok(())
}
