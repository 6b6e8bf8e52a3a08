//! Revision data model and the wire shapes it is decoded from.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The content the API supplied for one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionPayload {
    /// Complete page text at this revision
    FullText(String),
    /// Rendered table diff against the parent revision
    Diff(String),
    /// Neither text nor a usable diff (hidden content, uncached diff)
    Missing,
}

/// One article edit, immutable once fetched
#[derive(Debug, Clone)]
pub struct Revision {
    /// Globally unique revision id within the wiki
    pub id: u64,
    /// Revision this one was diffed against; `None` for an article's first
    pub parent_id: Option<u64>,
    /// Article title
    pub article: String,
    /// Author display name (empty when suppressed)
    pub user: String,
    /// Registered-account id; `None` for anonymous editors
    pub user_id: Option<u64>,
    /// Edit time, the merge key
    pub timestamp: DateTime<Utc>,
    /// Edit summary as entered
    pub comment: String,
    pub minor: bool,
    pub tags: Vec<String>,
    pub payload: RevisionPayload,
}

impl Revision {
    /// Unix epoch seconds of the edit, as used in committer lines
    pub fn epoch(&self) -> i64 {
        self.timestamp.timestamp()
    }

    pub(crate) fn from_api(api: ApiRevision, article: &str) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&api.timestamp)
            .with_context(|| {
                format!(
                    "revision {} has unparseable timestamp {:?}",
                    api.revid, api.timestamp
                )
            })?
            .with_timezone(&Utc);

        let payload = match (api.slots.and_then(|s| s.main.content), api.diff) {
            (Some(text), _) => RevisionPayload::FullText(text),
            (None, Some(diff)) => match diff.body {
                Some(body) => RevisionPayload::Diff(body),
                None => RevisionPayload::Missing,
            },
            (None, None) => RevisionPayload::Missing,
        };

        let user_id = match api.userid {
            Some(id) if id > 0 && !api.anon => Some(id),
            _ => None,
        };

        Ok(Self {
            id: api.revid,
            parent_id: (api.parentid > 0).then_some(api.parentid),
            article: article.to_string(),
            user: api.user.unwrap_or_default(),
            user_id,
            timestamp,
            comment: api.comment.unwrap_or_default(),
            minor: api.minor,
            tags: api.tags,
            payload,
        })
    }
}

// Wire shapes for `action=query&formatversion=2` responses.

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    pub error: Option<ApiError>,
    #[serde(rename = "continue")]
    pub cont: Option<Continuation>,
    pub query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub code: String,
    pub info: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Continuation {
    pub rvcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryBody {
    #[serde(default)]
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageInfo {
    #[allow(dead_code)]
    pub title: Option<String>,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub revisions: Vec<ApiRevision>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRevision {
    pub revid: u64,
    #[serde(default)]
    pub parentid: u64,
    pub user: Option<String>,
    pub userid: Option<u64>,
    #[serde(default)]
    pub anon: bool,
    #[serde(default)]
    pub minor: bool,
    pub timestamp: String,
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub slots: Option<Slots>,
    pub diff: Option<ApiDiff>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Slots {
    pub main: MainSlot,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MainSlot {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiDiff {
    pub body: Option<String>,
}
