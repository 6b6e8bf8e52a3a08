use std::collections::VecDeque;
use std::io::{self, Write};

use anyhow::Result;
use chrono::DateTime;
use similar::{DiffTag, TextDiff};

use mw2git::diff::{apply, HunkParser, Snapshot};
use mw2git::export::sink::ImportSink;
use mw2git::export::{AnnotateOptions, ExportError, ExportOptions, RevisionMerger, StreamExporter};
use mw2git::mediawiki::{Revision, RevisionPayload, RevisionSource, Site};

// ---- fakes -----------------------------------------------------------------

/// In-memory sink with an optional scripted reply channel
struct FakeSink {
    out: Vec<u8>,
    live: bool,
    replies: VecDeque<String>,
}

impl FakeSink {
    fn offline() -> Self {
        Self {
            out: Vec::new(),
            live: false,
            replies: VecDeque::new(),
        }
    }

    fn live(replies: &[&str]) -> Self {
        Self {
            out: Vec::new(),
            live: true,
            replies: replies.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Write for FakeSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ImportSink for FakeSink {
    fn can_resolve(&self) -> bool {
        self.live
    }

    fn request_mark(&mut self, _mark: usize) -> io::Result<()> {
        Ok(())
    }

    fn await_mark(&mut self) -> io::Result<String> {
        self.replies
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no reply"))
    }
}

struct FakeSource {
    article: String,
    revisions: VecDeque<Revision>,
    texts: Vec<(u64, String)>,
}

impl FakeSource {
    fn boxed(article: &str, revisions: Vec<Revision>) -> Box<dyn RevisionSource> {
        Box::new(Self {
            article: article.to_string(),
            revisions: revisions.into(),
            texts: Vec::new(),
        })
    }
}

impl RevisionSource for FakeSource {
    fn article(&self) -> &str {
        &self.article
    }

    fn next_revision(&mut self) -> Result<Option<Revision>> {
        Ok(self.revisions.pop_front())
    }

    fn fetch_text(&mut self, revision: u64) -> Result<String> {
        self.texts
            .iter()
            .find(|(id, _)| *id == revision)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| anyhow::anyhow!("no text for revision {}", revision))
    }
}

fn revision(article: &str, id: u64, epoch: i64, comment: &str, payload: RevisionPayload) -> Revision {
    Revision {
        id,
        parent_id: None,
        article: article.to_string(),
        user: "Alice".to_string(),
        user_id: Some(7),
        timestamp: DateTime::from_timestamp(epoch, 0).unwrap(),
        comment: comment.to_string(),
        minor: false,
        tags: Vec::new(),
        payload,
    }
}

fn export_with(
    sources: Vec<Box<dyn RevisionSource>>,
    sink: FakeSink,
    annotate: AnnotateOptions,
) -> Result<String, ExportError> {
    let mut merger = RevisionMerger::new(sources);
    let options = ExportOptions {
        annotate,
        ..Default::default()
    };
    let mut exporter = StreamExporter::new(sink, Site::from_lang("en"), options);
    exporter.export(&mut merger, |_| {})?;
    Ok(String::from_utf8(exporter.into_sink().out).unwrap())
}

// ---- independent diff generator -------------------------------------------

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Render the change between two texts as the table markup the revision API
/// produces, using an unrelated diff implementation as the source of hunks.
fn render_table_diff(old: &str, new: &str) -> String {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let diff = TextDiff::from_slices(&old_lines, &new_lines);

    let mut out = String::new();
    for group in diff.grouped_ops(1) {
        let first = &group[0];
        out.push_str(&format!(
            "<tr><td colspan=\"2\" class=\"diff-lineno\">Line {}:</td>\
             <td colspan=\"2\" class=\"diff-lineno\">Line {}:</td></tr>",
            first.old_range().start + 1,
            first.new_range().start + 1
        ));

        for op in &group {
            match op.tag() {
                DiffTag::Equal => {
                    for line in &old_lines[op.old_range()] {
                        out.push_str(&format!(
                            "<tr><td class=\"diff-marker\"></td>\
                             <td class=\"diff-context\"><div>{0}</div></td>\
                             <td class=\"diff-marker\"></td>\
                             <td class=\"diff-context\"><div>{0}</div></td></tr>",
                            escape(line)
                        ));
                    }
                }
                DiffTag::Delete | DiffTag::Replace | DiffTag::Insert => {
                    for line in &old_lines[op.old_range()] {
                        out.push_str(&format!(
                            "<tr><td class=\"diff-marker\">&minus;</td>\
                             <td class=\"diff-deletedline\"><div>{}</div></td>\
                             <td colspan=\"2\" class=\"diff-empty\">&#160;</td></tr>",
                            escape(line)
                        ));
                    }
                    for line in &new_lines[op.new_range()] {
                        out.push_str(&format!(
                            "<tr><td colspan=\"2\" class=\"diff-empty\">&#160;</td>\
                             <td class=\"diff-marker\">+</td>\
                             <td class=\"diff-addedline\"><div>{}</div></td></tr>",
                            escape(line)
                        ));
                    }
                }
            }
        }
    }
    out
}

// ---- tests -----------------------------------------------------------------

/// Parsing a generated diff and applying it to the old text must restore the
/// new text exactly, for every shape of change.
#[test]
fn test_diff_round_trip_restores_new_text() {
    let cases = [
        ("a\nb\nc", "a\nB\nc"),
        ("a\nb\nc", "b\nc"),
        ("a\nb\nc", "a\nb\nc\nd"),
        ("a\nb\nc", "x\ny"),
        ("only", "only\nmore"),
        ("", "fresh\ntext"),
        ("one\ntwo\nthree\nfour\nfive", "one\n2\nthree\nfour\n5\nsix"),
        ("h\u{e9}llo\nw\u{f6}rld", "h\u{e9}llo\nw\u{f6}rld!\n\u{4e16}\u{754c}"),
        ("a &amp; b\n<ref>c</ref>", "a &amp; b\n<ref>d</ref>"),
    ];

    for (old, new) in cases {
        let markup = render_table_diff(old, new);
        let base = Snapshot::from_text(old);
        let restored = apply(&base, HunkParser::new(&markup))
            .unwrap_or_else(|e| panic!("applying {:?} -> {:?}: {}", old, new, e));
        assert_eq!(restored.to_text(), new, "round trip of {:?} -> {:?}", old, new);
    }
}

/// A chain of diff revisions reconstructs every intermediate text and the
/// stream carries each version with its exact byte length.
#[test]
fn test_diff_chain_export_end_to_end() {
    let v1 = "The quick fox";
    let v2 = "The quick brown fox";
    let v3 = "The quick brown fox\njumps over the dog";

    let stream = export_with(
        vec![FakeSource::boxed(
            "Fox",
            vec![
                revision("Fox", 1, 100, "created", RevisionPayload::FullText(v1.to_string())),
                revision(
                    "Fox",
                    2,
                    200,
                    "brown",
                    RevisionPayload::Diff(render_table_diff(v1, v2)),
                ),
                revision(
                    "Fox",
                    3,
                    300,
                    "jumps",
                    RevisionPayload::Diff(render_table_diff(v2, v3)),
                ),
            ],
        )],
        FakeSink::offline(),
        AnnotateOptions::default(),
    )
    .unwrap();

    for text in [v1, v2, v3] {
        assert!(
            stream.contains(&format!("data {}\n{}\n", text.len(), text)),
            "stream is missing exact content block for {:?}",
            text
        );
    }
    assert!(stream.ends_with("done\n"));
}

/// Content byte lengths count UTF-8 bytes, not characters.
#[test]
fn test_multibyte_content_length_is_in_bytes() {
    let text = "caf\u{e9} \u{2014} \u{65e5}\u{672c}\u{8a9e}";
    assert_ne!(text.len(), text.chars().count());

    let stream = export_with(
        vec![FakeSource::boxed(
            "Unicode",
            vec![revision(
                "Unicode",
                1,
                100,
                "intl",
                RevisionPayload::FullText(text.to_string()),
            )],
        )],
        FakeSink::offline(),
        AnnotateOptions::default(),
    )
    .unwrap();

    assert!(stream.contains(&format!("data {}\n{}\n", text.len(), text)));
}

/// Two articles interleave strictly by timestamp, equal stamps by source
/// order, each writing to its own file.
#[test]
fn test_merged_articles_export_in_timestamp_order() {
    let stream = export_with(
        vec![
            FakeSource::boxed(
                "Alpha",
                vec![
                    revision("Alpha", 10, 100, "a1", RevisionPayload::FullText("a one".into())),
                    revision("Alpha", 30, 300, "a2", RevisionPayload::FullText("a two".into())),
                ],
            ),
            FakeSource::boxed(
                "Beta",
                vec![
                    revision("Beta", 20, 200, "b1", RevisionPayload::FullText("b one".into())),
                    revision("Beta", 40, 300, "b2", RevisionPayload::FullText("b two".into())),
                ],
            ),
        ],
        FakeSink::offline(),
        AnnotateOptions::default(),
    )
    .unwrap();

    // rev 30 and rev 40 share a timestamp; the first source wins the tie
    let positions: Vec<usize> = ["oldid=10", "oldid=20", "oldid=30", "oldid=40"]
        .iter()
        .map(|marker| stream.find(marker).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert!(stream.contains("M 644 inline Alpha.mw"));
    assert!(stream.contains("M 644 inline Beta.mw"));
}

/// A backward reference in an edit summary resolves to the referenced
/// revision's commit id through the sink's reply channel.
#[test]
fn test_backward_reference_resolves_to_commit_id() {
    let sources = vec![FakeSource::boxed(
        "Page",
        vec![
            revision("Page", 100, 100, "created", RevisionPayload::FullText("v1".into())),
            revision(
                "Page",
                101,
                200,
                "Undid revision 100",
                RevisionPayload::FullText("v2".into()),
            ),
        ],
    )];

    let annotate = AnnotateOptions {
        rewrite_refs: true,
        ..Default::default()
    };
    let stream = export_with(
        sources,
        FakeSink::live(&["0123456789abcdef0123456789abcdef01234567"]),
        annotate,
    )
    .unwrap();

    assert!(stream.contains("Undid revision 0123456789ab"));
    assert!(!stream.contains("Undid revision 100"));
}

/// Without --rewrite-refs the summary stays verbatim and the resolution
/// lands in a References trailer instead.
#[test]
fn test_backward_reference_lists_in_trailer() {
    let sources = vec![FakeSource::boxed(
        "Page",
        vec![
            revision("Page", 100, 100, "created", RevisionPayload::FullText("v1".into())),
            revision(
                "Page",
                101,
                200,
                "Undid revision 100",
                RevisionPayload::FullText("v2".into()),
            ),
        ],
    )];

    let stream = export_with(
        sources,
        FakeSink::live(&["0123456789abcdef0123456789abcdef01234567"]),
        AnnotateOptions::default(),
    )
    .unwrap();

    assert!(stream.contains("Undid revision 100"));
    assert!(stream.contains("References: 100 (0123456789ab)"));
}

/// Forward references stay untouched: the referenced revision is not
/// emitted yet, so no resolution is attempted.
#[test]
fn test_forward_reference_stays_plain() {
    let sources = vec![FakeSource::boxed(
        "Page",
        vec![revision(
            "Page",
            100,
            100,
            "will be undone by 999",
            RevisionPayload::FullText("v1".into()),
        )],
    )];

    let annotate = AnnotateOptions {
        rewrite_refs: true,
        ..Default::default()
    };
    // No scripted replies: any resolution attempt would fail the export.
    let stream = export_with(sources, FakeSink::live(&[]), annotate).unwrap();

    assert!(stream.contains("will be undone by 999"));
}

/// A history whose first revision arrives without full text cannot be
/// reconstructed and must fail before any commit is written.
#[test]
fn test_first_revision_without_text_is_fatal() {
    let markup = render_table_diff("a", "b");
    let sources = vec![FakeSource::boxed(
        "Page",
        vec![revision("Page", 100, 100, "edit", RevisionPayload::Diff(markup))],
    )];

    let err = export_with(sources, FakeSink::offline(), AnnotateOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        ExportError::MissingBaseRevision { revision: 100, .. }
    ));
}

/// A diff that does not match the text it is applied to fails the export
/// with no commit for the broken revision.
#[test]
fn test_mismatched_diff_aborts_export() {
    // diff generated against a different base than the one exported
    let markup = render_table_diff("x\ny\nz", "x\nY\nz");
    let sources = vec![FakeSource::boxed(
        "Page",
        vec![
            revision("Page", 100, 100, "created", RevisionPayload::FullText("a\nb\nc".into())),
            revision("Page", 101, 200, "edit", RevisionPayload::Diff(markup)),
        ],
    )];

    let mut merger = RevisionMerger::new(sources);
    let mut exporter = StreamExporter::new(
        FakeSink::offline(),
        Site::from_lang("en"),
        ExportOptions::default(),
    );
    let err = exporter.export(&mut merger, |_| {}).unwrap_err();

    assert!(matches!(err, ExportError::DiffMismatch { revision: 101, .. }));
    let stream = String::from_utf8(exporter.into_sink().out).unwrap();
    assert!(!stream.contains("oldid=101"), "broken revision must not be committed");
}
