//! Blocking HTTP client for the MediaWiki query API.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;

use crate::mediawiki::revision::{QueryResponse, Revision, RevisionPayload};
use crate::mediawiki::{RevisionSource, Site};

const USER_AGENT: &str = concat!(
    "mw2git/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/mw2git/mw2git)"
);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Revisions fetched per request. Diff rendering is the expensive part
/// server-side, so this stays well below the API maximum.
const BATCH_SIZE: usize = 50;

/// Shared query client for one wiki
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    site: Site,
}

impl ApiClient {
    pub fn new(site: Site) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, site })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// One `action=query` GET; surfaces transport and API-level errors
    fn query(&self, params: &[(&str, String)]) -> Result<QueryResponse> {
        let mut request = vec![
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
        ];
        request.extend(params.iter().map(|(k, v)| (*k, v.clone())));

        let response = self
            .client
            .get(self.site.api_url())
            .query(&request)
            .send()
            .with_context(|| format!("request to {} failed", self.site.api_url()))?;
        if !response.status().is_success() {
            bail!("MediaWiki API returned HTTP {}", response.status());
        }

        let payload: QueryResponse = response
            .json()
            .context("MediaWiki API response was not valid JSON")?;
        if let Some(error) = &payload.error {
            bail!("MediaWiki API error {}: {}", error.code, error.info);
        }
        Ok(payload)
    }

    pub fn page_exists(&self, title: &str) -> Result<bool> {
        let payload = self.query(&[("titles", title.to_string())])?;
        let page = payload.query.as_ref().and_then(|q| q.pages.first());
        Ok(page.is_some_and(|p| !p.missing))
    }

    /// Full text of a single revision by id
    pub fn revision_text(&self, revision: u64) -> Result<String> {
        let payload = self.query(&[
            ("prop", "revisions".to_string()),
            ("revids", revision.to_string()),
            ("rvprop", "ids|content".to_string()),
            ("rvslots", "main".to_string()),
        ])?;

        payload
            .query
            .and_then(|q| q.pages.into_iter().next())
            .and_then(|p| p.revisions.into_iter().next())
            .and_then(|r| r.slots)
            .and_then(|s| s.main.content)
            .with_context(|| format!("no text available for revision {}", revision))
    }
}

/// Inclusive time bounds on the exported history
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Streaming per-article revision feed.
///
/// Fetches batches of `rvdiffto=prev` revisions in ascending order, following
/// `rvcontinue`. Guarantees the first yielded revision carries full text so
/// an importer always has a base snapshot to start from.
pub struct ApiRevisionSource {
    client: ApiClient,
    article: String,
    window: TimeWindow,
    buffer: VecDeque<Revision>,
    continue_token: Option<String>,
    exhausted: bool,
    yielded_any: bool,
}

impl ApiRevisionSource {
    pub fn new(client: ApiClient, article: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            client,
            article: article.into(),
            window,
            buffer: VecDeque::new(),
            continue_token: None,
            exhausted: false,
            yielded_any: false,
        }
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let mut params = vec![
            ("prop", "revisions".to_string()),
            ("titles", self.article.clone()),
            ("rvdir", "newer".to_string()),
            ("rvlimit", BATCH_SIZE.to_string()),
            (
                "rvprop",
                "ids|timestamp|flags|comment|user|userid|tags".to_string(),
            ),
            ("rvslots", "main".to_string()),
            ("rvdiffto", "prev".to_string()),
        ];
        if let Some(since) = self.window.since {
            params.push(("rvstart", iso(since)));
        }
        if let Some(until) = self.window.until {
            params.push(("rvend", iso(until)));
        }
        if let Some(token) = &self.continue_token {
            params.push(("rvcontinue", token.clone()));
        }

        let payload = self.client.query(&params)?;

        self.continue_token = payload.cont.and_then(|c| c.rvcontinue);
        if self.continue_token.is_none() {
            self.exhausted = true;
        }

        let page = payload
            .query
            .and_then(|q| q.pages.into_iter().next())
            .with_context(|| format!("no query result for page {}", self.article))?;
        if page.missing {
            bail!("page {} does not exist", self.article);
        }

        for api in page.revisions {
            self.buffer.push_back(Revision::from_api(api, &self.article)?);
        }
        Ok(())
    }
}

impl RevisionSource for ApiRevisionSource {
    fn article(&self) -> &str {
        &self.article
    }

    fn next_revision(&mut self) -> Result<Option<Revision>> {
        while self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch()?;
        }
        let Some(mut revision) = self.buffer.pop_front() else {
            return Ok(None);
        };

        if !self.yielded_any && !matches!(revision.payload, RevisionPayload::FullText(_)) {
            // A time window can start the history mid-article, where the API
            // sends a diff; the importer needs text to seed its snapshot.
            let text = self.client.revision_text(revision.id)?;
            revision.payload = RevisionPayload::FullText(text);
        }
        self.yielded_any = true;
        Ok(Some(revision))
    }

    fn fetch_text(&mut self, revision: u64) -> Result<String> {
        self.client.revision_text(revision)
    }
}

fn iso(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
