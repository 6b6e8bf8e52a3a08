//! Parser for MediaWiki's rendered table diffs.
//!
//! The revision API returns change information as presentation markup: a
//! sequence of `<tr>` rows whose `<td>` cells are classified by CSS class
//! (`diff-lineno`, `diff-addedline`, `diff-deletedline`, `diff-context`,
//! plus decorative marker and filler cells). This module turns that markup
//! back into line-level hunks that can be applied to a previous revision.

use std::sync::OnceLock;

use regex::{CaptureMatches, Regex};

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<tr[^>]*>(.*?)</tr>").unwrap())
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<td\b([^>]*)>(.*?)</td>").unwrap())
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"class\s*=\s*"([^"]*)""#).unwrap())
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// The diff markup did not have the shape this parser understands.
///
/// Always fatal: it means the upstream diff format changed, not that one
/// revision is odd.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedDiff {
    #[error("unrecognized diff cell class `{0}`")]
    UnrecognizedCell(String),
    #[error("diff cell without a class attribute")]
    MissingClass,
    #[error("line-number marker without a line number")]
    MissingLineNumber,
    #[error("line-number marker missing its paired \"to\" value")]
    UnpairedLineNumber,
    #[error("diff content before any line-number marker")]
    ContentOutsideHunk,
}

/// One line inside a hunk, tagged by which side(s) it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    /// Present in both revisions; asserted against the base on application
    Context(String),
    /// Present only in the new revision
    Added(String),
    /// Present only in the old revision; asserted and dropped on application
    Removed(String),
}

/// A contiguous change region between two revisions
///
/// Offsets are 1-based, matching the markup's "Line N:" markers. Counts are
/// consistent with `lines` by construction: context and removed lines count
/// toward the "from" side, context and added lines toward the "to" side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub from_start: usize,
    pub from_count: usize,
    pub to_start: usize,
    pub to_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    fn new(from_start: usize, to_start: usize) -> Self {
        Self {
            from_start,
            from_count: 0,
            to_start,
            to_count: 0,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, line: HunkLine) {
        match line {
            HunkLine::Context(_) => {
                self.from_count += 1;
                self.to_count += 1;
            }
            HunkLine::Added(_) => self.to_count += 1,
            HunkLine::Removed(_) => self.from_count += 1,
        }
        self.lines.push(line);
    }
}

/// Closed classification of diff cells by their class tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    LineNumber,
    Added,
    Removed,
    Context,
    /// The +/- gutter column
    Marker,
    /// Filler cell opposite a pure insertion or deletion
    Empty,
}

impl CellKind {
    fn classify(attrs: &str) -> Result<Self, MalformedDiff> {
        let classes = class_re()
            .captures(attrs)
            .map(|c| c[1].to_string())
            .ok_or(MalformedDiff::MissingClass)?;

        for token in classes.split_whitespace() {
            let kind = match token {
                "diff-lineno" => Self::LineNumber,
                "diff-addedline" => Self::Added,
                "diff-deletedline" => Self::Removed,
                "diff-context" => Self::Context,
                "diff-marker" => Self::Marker,
                "diff-empty" => Self::Empty,
                _ => continue,
            };
            return Ok(kind);
        }

        Err(MalformedDiff::UnrecognizedCell(classes))
    }
}

/// Streaming parser over one diff document.
///
/// Yields hunks in document order; stops permanently after the first error.
pub struct HunkParser<'a> {
    rows: CaptureMatches<'static, 'a>,
    current: Option<Hunk>,
    failed: bool,
}

impl<'a> HunkParser<'a> {
    /// Parse the row sequence returned by the revision API for one diff
    pub fn new(body: &'a str) -> Self {
        Self {
            rows: row_re().captures_iter(body),
            current: None,
            failed: false,
        }
    }

    /// Handle one table row; returns a hunk when a new line-number marker
    /// closes the previous one.
    fn consume_row(&mut self, row: &str) -> Result<Option<Hunk>, MalformedDiff> {
        let mut cells = Vec::new();
        for cap in cell_re().captures_iter(row) {
            let kind = CellKind::classify(&cap[1])?;
            cells.push((kind, cap.get(2).map_or("", |m| m.as_str())));
        }

        // A marker-pair row opens the next hunk.
        if cells.iter().any(|(kind, _)| *kind == CellKind::LineNumber) {
            let mut numbers = cells
                .iter()
                .filter(|(kind, _)| *kind == CellKind::LineNumber)
                .map(|(_, text)| parse_line_number(text));
            let from_start = numbers.next().ok_or(MalformedDiff::UnpairedLineNumber)??;
            let to_start = numbers.next().ok_or(MalformedDiff::UnpairedLineNumber)??;
            let finished = self.current.replace(Hunk::new(from_start, to_start));
            return Ok(finished);
        }

        // Context lines are rendered once per side; only the first (from
        // side) copy counts, its twin is decoration.
        let mut context_on_from_side = true;
        for (kind, raw) in cells {
            let line = match kind {
                CellKind::Marker | CellKind::Empty => continue,
                CellKind::Context => {
                    let emit = context_on_from_side;
                    context_on_from_side = !context_on_from_side;
                    if !emit {
                        continue;
                    }
                    HunkLine::Context(cell_text(raw))
                }
                CellKind::Added => HunkLine::Added(cell_text(raw)),
                CellKind::Removed => HunkLine::Removed(cell_text(raw)),
                CellKind::LineNumber => unreachable!("handled above"),
            };
            self.current
                .as_mut()
                .ok_or(MalformedDiff::ContentOutsideHunk)?
                .push(line);
        }

        Ok(None)
    }
}

impl Iterator for HunkParser<'_> {
    type Item = Result<Hunk, MalformedDiff>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let Some(row) = self.rows.next() else {
                // End of document closes the final hunk.
                return self.current.take().map(Ok);
            };
            let body = row.get(1).map_or("", |m| m.as_str());
            match self.consume_row(body) {
                Ok(Some(hunk)) => return Some(Ok(hunk)),
                Ok(None) => {}
                Err(e) => {
                    self.failed = true;
                    self.current = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Extract the line number from a "Line N:" marker cell
fn parse_line_number(raw: &str) -> Result<usize, MalformedDiff> {
    let text = cell_text(raw);
    number_re()
        .find(&text)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or(MalformedDiff::MissingLineNumber)
}

/// Recover the plain line text from a cell: drop inline markup
/// (`<div>`, `<del>`, `<ins>` wrappers) and decode character entities.
fn cell_text(html: &str) -> String {
    decode_entities(&strip_tags(html))
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        // Scan bytes so a multibyte character inside the window cannot
        // land the cutoff mid-character.
        let window = &rest.as_bytes()[..rest.len().min(12)];
        let entity_end = window.iter().position(|&b| b == b';');
        let Some(end) = entity_end else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let name = &rest[1..end];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => decode_numeric_entity(name),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric_entity(name: &str) -> Option<char> {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok()?
    } else {
        return None;
    };
    char::from_u32(code)
}
