//! MediaWiki site addressing and the revision-history API client.

pub mod client;
pub mod revision;

pub use client::{ApiClient, ApiRevisionSource, TimeWindow};
pub use revision::{Revision, RevisionPayload};

use anyhow::{Context, Result};

use crate::utils::underscored;

/// A pull-based feed of one article's revisions in ascending timestamp
/// order, with on-demand access to full revision text by id.
pub trait RevisionSource {
    /// Title of the article this source covers
    fn article(&self) -> &str;

    /// The next revision, or `None` when the history is exhausted.
    /// May block on network I/O.
    fn next_revision(&mut self) -> Result<Option<Revision>>;

    /// Full text of a specific revision, fetched on demand
    fn fetch_text(&mut self, revision: u64) -> Result<String>;
}

/// Address of a MediaWiki installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub scheme: String,
    pub host: String,
    /// Script path including both slashes, e.g. `/w/`
    pub path: String,
}

impl Site {
    /// Wikipedia site for a language code
    pub fn from_lang(lang: &str) -> Self {
        Self {
            scheme: "https".to_string(),
            host: format!("{}.wikipedia.org", lang),
            path: "/w/".to_string(),
        }
    }

    /// Parse an explicit site URL; scheme defaults to https and the script
    /// path to `/w/` when absent.
    pub fn from_url(raw: &str) -> Result<Self> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        let url = reqwest::Url::parse(&with_scheme)
            .with_context(|| format!("invalid site URL `{}`", raw))?;
        let host = url
            .host_str()
            .with_context(|| format!("site URL `{}` has no host", raw))?
            .to_string();

        let mut path = url.path().to_string();
        if path.is_empty() || path == "/" {
            path = "/w/".to_string();
        } else if !path.ends_with('/') {
            path.push('/');
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            path,
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }

    pub fn api_url(&self) -> String {
        format!("{}api.php", self.base_url())
    }

    /// Canonical permalink for a revision
    pub fn revision_url(&self, revision: u64) -> String {
        format!("{}index.php?oldid={}", self.base_url(), revision)
    }

    /// Link to an editor's user page
    pub fn user_url(&self, user: &str) -> String {
        format!("{}index.php?title=User:{}", self.base_url(), underscored(user))
    }
}
