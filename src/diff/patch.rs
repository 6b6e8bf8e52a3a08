//! Reconstruction of full revision text from a base snapshot plus hunks.

use crate::diff::parser::{Hunk, HunkLine, MalformedDiff};

/// Full text of one article revision as an ordered sequence of lines.
///
/// The line representation round-trips exactly: text with a trailing newline
/// keeps a final empty line, the empty text has zero lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    lines: Vec<String>,
}

impl Snapshot {
    pub fn from_text(text: &str) -> Self {
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n').map(str::to_string).collect()
        };
        Self { lines }
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Why a hunk sequence could not be applied to a base snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error(transparent)]
    Malformed(#[from] MalformedDiff),

    /// The hunk's own asserted text disagrees with the base snapshot.
    ///
    /// Fatal: continuing would silently corrupt every later revision of the
    /// article.
    #[error("diff mismatch at base line {line}: expected {expected:?}, found {found:?}")]
    Mismatch {
        line: usize,
        expected: String,
        found: Option<String>,
    },

    /// A hunk points before the current cursor or past the end of the base
    #[error("hunk offset {offset} is outside the base snapshot")]
    OffsetOutOfRange { offset: usize },
}

/// Apply hunks to the previous snapshot, producing the next one.
///
/// Pure: only the base and the hunks are consulted. Context and removed
/// lines are verified against the base; any disagreement aborts with no
/// partial output.
pub fn apply<I>(base: &Snapshot, hunks: I) -> Result<Snapshot, PatchError>
where
    I: IntoIterator<Item = Result<Hunk, MalformedDiff>>,
{
    let old = base.lines();
    let mut out: Vec<String> = Vec::with_capacity(old.len());
    let mut cursor = 0usize;

    for hunk in hunks {
        let hunk = hunk?;

        // "Line N:" markers are 1-based; an insertion-only hunk may point
        // one past the end of the base.
        if hunk.from_start == 0 {
            return Err(PatchError::OffsetOutOfRange { offset: 0 });
        }
        let start = hunk.from_start - 1;
        if start < cursor || start > old.len() {
            return Err(PatchError::OffsetOutOfRange {
                offset: hunk.from_start,
            });
        }

        // Unchanged region the diff skipped over.
        out.extend_from_slice(&old[cursor..start]);
        cursor = start;

        for line in &hunk.lines {
            match line {
                HunkLine::Context(expected) | HunkLine::Removed(expected) => {
                    let found = old.get(cursor);
                    if found.map(String::as_str) != Some(expected.as_str()) {
                        return Err(PatchError::Mismatch {
                            line: cursor + 1,
                            expected: expected.clone(),
                            found: found.cloned(),
                        });
                    }
                    if matches!(line, HunkLine::Context(_)) {
                        out.push(expected.clone());
                    }
                    cursor += 1;
                }
                HunkLine::Added(text) => out.push(text.clone()),
            }
        }
    }

    out.extend_from_slice(&old[cursor..]);
    Ok(Snapshot::from_lines(out))
}
