//! The export pipeline: merge, annotate, serialize.

pub mod annotate;
pub mod marks;
pub mod merge;
pub mod sink;
pub mod stream;

pub use annotate::{AnnotateOptions, CommentAnnotator};
pub use marks::MarkTable;
pub use merge::RevisionMerger;
pub use sink::{GitImportSink, ImportSink, StreamSink};
pub use stream::{ExportOptions, StreamExporter};

use crate::diff::parser::MalformedDiff;

/// Fatal export failures. None of these are retried: each one means the
/// produced history could no longer be trusted.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The upstream diff markup changed shape
    #[error("diff of revision {revision} ({article}): {source}")]
    MalformedDiff {
        article: String,
        revision: u64,
        source: MalformedDiff,
    },

    /// Reconstructed text disagrees with the diff's own assertions, or with
    /// an independently fetched copy
    #[error("reconstruction of revision {revision} ({article}): {detail}")]
    DiffMismatch {
        article: String,
        revision: u64,
        detail: String,
    },

    /// A non-first revision stream started without a usable base snapshot
    #[error("first revision {revision} of {article} arrived without full text")]
    MissingBaseRevision { article: String, revision: u64 },

    /// The downstream mark-resolution handshake failed or desynchronized
    #[error("mark resolution for revision {revision} failed: {reason}")]
    UnresolvableReference { revision: u64, reason: String },

    #[error("writing the import stream failed")]
    Io(#[from] std::io::Error),

    /// Failure in the upstream revision fetch
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}
