//! Commit-message adornment: section markers, cross-references, trailers.

use std::sync::OnceLock;

use regex::Regex;

use crate::export::marks::MarkTable;
use crate::export::sink::ImportSink;
use crate::export::ExportError;
use crate::mediawiki::{Revision, Site};
use crate::utils::underscored;

/// Placeholder for revisions with no edit summary
pub const EMPTY_COMMENT: &str = "<blank>";

/// Resolved commit ids are abbreviated to this length in comment text
const SHORT_ID_LEN: usize = 12;

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/\*\s*(.*?)\s*\*/\s*").unwrap())
}

fn diff_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[Special:Diff/(\d+)(?:\|([^\]]*))?\]\]").unwrap())
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)\b").unwrap())
}

fn contribs_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[Special:Contributions/[^|\]]*\|([^\]]*)\]\]").unwrap())
}

fn talk_paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(\[\[User talk:[^\]]*\|talk\]\]\)").unwrap())
}

fn user_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[User(?: talk)?:[^|\]]*\|([^\]]*)\]\]").unwrap())
}

/// What the annotator is allowed to change
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotateOptions {
    /// Replace in-text revision references with resolved commit ids instead
    /// of listing them in a `References:` trailer
    pub rewrite_refs: bool,
    /// Strip wikilink boilerplate from revert summaries
    pub denoise: bool,
}

/// Rewrites one edit summary into the commit message for its revision.
///
/// References to revisions already emitted in this export are resolved to
/// their commit ids through the mark table. Numeric tokens that do not name
/// an emitted revision (including forward references) are left untouched;
/// that is expected, never an error.
pub struct CommentAnnotator<'a> {
    site: &'a Site,
    options: AnnotateOptions,
}

impl<'a> CommentAnnotator<'a> {
    pub fn new(site: &'a Site, options: AnnotateOptions) -> Self {
        Self { site, options }
    }

    pub fn annotate(
        &self,
        revision: &Revision,
        marks: &mut MarkTable,
        sink: &mut dyn ImportSink,
    ) -> Result<String, ExportError> {
        let raw = revision.comment.trim();
        let (section, remainder) = extract_section(raw);

        let mut body = match (&section, remainder.is_empty()) {
            (Some(name), false) => format!("{}: {}", name, remainder),
            (Some(name), true) => name.clone(),
            (None, _) => remainder.to_string(),
        };

        let mut references: Vec<(u64, String)> = Vec::new();
        body = self.rewrite_references(
            &body,
            diff_link_re(),
            revision.id,
            marks,
            sink,
            &mut references,
        )?;
        body = self.rewrite_references(
            &body,
            bare_number_re(),
            revision.id,
            marks,
            sink,
            &mut references,
        )?;

        if self.options.denoise {
            body = denoise(&body);
        }

        let body = body.trim();
        let body = if body.is_empty() { EMPTY_COMMENT } else { body };

        let mut permalink = self.site.revision_url(revision.id);
        if let Some(name) = &section {
            permalink.push('#');
            permalink.push_str(&underscored(name));
        }

        let mut trailer = vec![format!("URL: {}", permalink)];
        if !revision.user.is_empty() {
            trailer.push(format!("Editor: {}", self.site.user_url(&revision.user)));
        }

        let mut tags: Vec<&str> = Vec::new();
        if revision.minor {
            tags.push("minor");
        }
        tags.extend(revision.tags.iter().map(String::as_str));
        if !tags.is_empty() {
            trailer.push(format!("Tags: {}", tags.join(", ")));
        }

        if !references.is_empty() {
            let list = references
                .iter()
                .map(|(id, commit)| format!("{} ({})", id, commit))
                .collect::<Vec<_>>()
                .join(", ");
            trailer.push(format!("References: {}", list));
        }

        Ok(format!("{}\n\n{}", body, trailer.join("\n")))
    }

    /// One rewrite pass over `text`. Capture 1 of `re` is the referenced
    /// revision id, optional capture 2 a display label.
    fn rewrite_references(
        &self,
        text: &str,
        re: &Regex,
        own: u64,
        marks: &mut MarkTable,
        sink: &mut dyn ImportSink,
        references: &mut Vec<(u64, String)>,
    ) -> Result<String, ExportError> {
        // No reply channel means no resolution: everything stays plain text.
        if !sink.can_resolve() {
            return Ok(text.to_string());
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for cap in re.captures_iter(text) {
            let Some(whole) = cap.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            last = whole.end();

            let id = cap.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
            let known = id.filter(|&r| r != own && marks.mark_of(r).is_some());
            let Some(reference) = known else {
                out.push_str(whole.as_str());
                continue;
            };

            let commit = short_id(&marks.resolve(reference, sink)?);
            if self.options.rewrite_refs {
                match cap.get(2).filter(|label| !label.as_str().is_empty()) {
                    Some(label) => {
                        out.push_str(label.as_str());
                        out.push_str(" (");
                        out.push_str(&commit);
                        out.push(')');
                    }
                    None => out.push_str(&commit),
                }
            } else {
                out.push_str(whole.as_str());
                if !references.iter().any(|(seen, _)| *seen == reference) {
                    references.push((reference, commit));
                }
            }
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// Split a leading `/* Section name */` marker off an edit summary
fn extract_section(comment: &str) -> (Option<String>, &str) {
    let Some(cap) = section_re().captures(comment) else {
        return (None, comment);
    };
    let end = cap.get(0).map_or(0, |m| m.end());
    let name = cap.get(1).map_or("", |m| m.as_str()).to_string();
    let rest = &comment[end..];
    if name.is_empty() {
        (None, rest)
    } else {
        (Some(name), rest)
    }
}

/// Collapse user-page wikilink boilerplate to the plain user names
fn denoise(comment: &str) -> String {
    let pass = talk_paren_re().replace_all(comment, "");
    let pass = contribs_link_re().replace_all(&pass, "$1");
    user_link_re().replace_all(&pass, "$1").into_owned()
}

fn short_id(commit: &str) -> String {
    commit.chars().take(SHORT_ID_LEN).collect()
}
