use atty::Stream;
use colored::Colorize;

use crate::mediawiki::{Revision, Site};

/// Announce which wiki the export talks to
pub fn connection_banner(site: &Site) {
    if atty::is(Stream::Stderr) {
        eprintln!("Connecting to {}", site.base_url().bold());
    } else {
        eprintln!("Connecting to {}", site.base_url());
    }
}

/// One progress line per exported revision, to stderr
pub fn progress(revision: &Revision) {
    let minor = if revision.minor { "Minor " } else { "" };
    let when = revision.timestamp.format("%Y-%m-%d %H:%M:%S");

    if atty::is(Stream::Stderr) {
        eprintln!(
            " >> {}{} by {} at {}: {}",
            minor.yellow(),
            format!("Revision {}", revision.id).bold(),
            revision.user.cyan(),
            when,
            revision.comment
        );
    } else {
        eprintln!(
            " >> {}Revision {} by {} at {}: {}",
            minor, revision.id, revision.user, when, revision.comment
        );
    }
}

/// Final summary after a successful run
pub fn done(revisions: usize, destination: &str) {
    eprintln!("Exported {} revisions to {}", revisions, destination);
}
