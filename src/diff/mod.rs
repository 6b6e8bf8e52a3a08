pub mod parser;
pub mod patch;

pub use parser::{Hunk, HunkLine, HunkParser, MalformedDiff};
pub use patch::{apply, PatchError, Snapshot};
