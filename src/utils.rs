//! Shared helper functions and constants

use std::env;

/// Characters that may not appear in the tracked filename for an article
const FORBIDDEN_FILENAME_CHARS: &[char] = &['?', '*', '<', '>', '|', ':', '\\', '/', '"'];

/// File extension used for article content blobs
pub const ARTICLE_EXTENSION: &str = "mw";

/// Replace characters that are invalid in filenames with underscores
pub fn sanitize_filename(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if FORBIDDEN_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// The tracked filename for an article title
pub fn article_filename(title: &str) -> String {
    format!("{}.{}", sanitize_filename(title), ARTICLE_EXTENSION)
}

/// Wiki page-name form of a user or section name (spaces become underscores)
pub fn underscored(name: &str) -> String {
    name.replace(' ', "_")
}

/// Wikipedia language code from the process locale, falling back to "en"
pub fn default_lang() -> String {
    for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(value) = env::var(var) {
            let code: String = value
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect();
            if !code.is_empty() && code != "C" && code != "POSIX" {
                return code.to_lowercase();
            }
        }
    }
    "en".to_string()
}
