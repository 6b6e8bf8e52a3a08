pub mod cli;
pub mod diff;
pub mod export;
pub mod mediawiki;
pub mod utils;

pub use diff::parser::{Hunk, HunkLine, HunkParser, MalformedDiff};
pub use diff::patch::{PatchError, Snapshot};
pub use export::{ExportError, ExportOptions, RevisionMerger, StreamExporter};
pub use mediawiki::{Revision, RevisionPayload, RevisionSource, Site};
