use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

use super::{attr_in, selector, text_in, Extraction, SearchQuery, Source, SourceExtractor};
use crate::browser::BrowserSession;
use crate::models::CandidateLink;

const HOME_URL: &str = "https://www.google.com";
const SEARCH_BOX: &str = "textarea[name=\"q\"], input[name=\"q\"]";
const RESULTS: &str = "#search";
const RESULT_ENTRY: &str = ".g";
const TARGET_SITE: &str = "linkedin.com/jobs";

/// Finds postings on the target board through a web search engine
/// (`site:` restricted query), so no board session or login is involved.
pub struct SearchEngineExtractor {
    home_url: String,
    timeout: Duration,
}

impl Default for SearchEngineExtractor {
    fn default() -> Self {
        Self {
            home_url: HOME_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl SearchEngineExtractor {
    #[cfg(test)]
    pub fn with_home_url(home_url: &str, timeout: Duration) -> Self {
        Self {
            home_url: home_url.to_string(),
            timeout,
        }
    }

    async fn search(
        &self,
        session: &mut dyn BrowserSession,
        query: &SearchQuery,
    ) -> anyhow::Result<Option<String>> {
        session.goto(&self.home_url).await?;
        if !session.wait_for(SEARCH_BOX, self.timeout).await? {
            anyhow::bail!("search box never appeared");
        }
        session.submit_query(SEARCH_BOX, &site_query(query)).await?;
        if !session.wait_for(RESULTS, self.timeout).await? {
            return Ok(None);
        }
        Ok(Some(session.page_source().await?))
    }
}

#[async_trait]
impl SourceExtractor for SearchEngineExtractor {
    fn source(&self) -> Source {
        Source::SearchEngineIndirect
    }

    async fn extract(&self, session: &mut dyn BrowserSession, query: &SearchQuery) -> Extraction {
        tracing::info!(query = %site_query(query), "searching for postings");
        match self.search(session, query).await {
            Ok(Some(html)) => Extraction::Found(parse_results(&html)),
            Ok(None) => {
                tracing::info!("search returned no result page");
                Extraction::empty()
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "search failed");
                Extraction::empty()
            }
        }
    }
}

pub(crate) fn site_query(query: &SearchQuery) -> String {
    format!(
        "site:{} \"{}\" \"{}\"",
        TARGET_SITE, query.keywords, query.location
    )
}

/// Parse search results, keeping only links to individual postings.
pub(crate) fn parse_results(html: &str) -> Vec<CandidateLink> {
    let (Some(entry_sel), Some(anchor_sel), Some(title_sel)) = (
        selector(RESULT_ENTRY),
        selector("a[href]"),
        selector("h3"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();

    for entry in document.select(&entry_sel) {
        let (Some(href), Some(raw_title)) = (
            attr_in(entry, &anchor_sel, "href"),
            text_in(entry, &title_sel),
        ) else {
            continue;
        };

        let link = unwrap_redirect(&href);
        if !is_posting_link(&link) || is_navigation_artifact(&raw_title) {
            continue;
        }
        if !seen.insert(link.clone()) {
            continue;
        }

        let (title, company) = split_result_title(&raw_title);
        jobs.push(CandidateLink {
            title,
            company,
            link,
            external_id: None,
        });
    }

    jobs
}

/// Search engines sometimes link through `/url?q=<target>`.
fn unwrap_redirect(href: &str) -> String {
    if href.starts_with("/url?") {
        if let Ok(url) = Url::parse(&format!("https://redirect.invalid{}", href)) {
            if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "q" || k == "url") {
                return target.into_owned();
            }
        }
    }
    href.to_string()
}

fn is_posting_link(url: &str) -> bool {
    url.contains(TARGET_SITE) && !is_search_link(url)
}

fn is_search_link(url: &str) -> bool {
    // Filter non-posting board URLs (search, alerts, collections)
    // - https://www.linkedin.com/jobs/search?keywords=...
    // - https://www.linkedin.com/jobs/alerts
    // - https://www.linkedin.com/jobs/collections/recommended
    url.contains("/jobs/search")
        || url.contains("/search?")
        || url.contains("/jobs/alerts")
        || url.contains("/jobs/collections")
}

fn is_navigation_artifact(text: &str) -> bool {
    let text_lower = text.trim().to_lowercase();

    if text_lower.len() < 4 || text_lower == "jobs" {
        return true;
    }

    if text_lower.starts_with("jobs similar to")
        || text_lower.starts_with("jobs in ")
        || text_lower.starts_with("see all")
        || text_lower.starts_with("search for jobs")
    {
        return true;
    }

    // "1,000+ Backend Engineer jobs in Berlin" style landing pages
    text_lower.contains(" jobs in ") || text_lower.ends_with(" jobs")
}

fn hiring_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<company>.+?) hiring (?P<role>.+?)(?: in (?P<place>.+))?$").ok()
    })
    .as_ref()
}

/// Split a result heading into role title and, when present, company.
///
/// `"Acme hiring Backend Engineer in Berlin | LinkedIn"` -> role + company;
/// `"Backend Engineer - LinkedIn"` -> role only.
pub(crate) fn split_result_title(raw: &str) -> (String, Option<String>) {
    let mut title = raw.trim();
    for suffix in [" | LinkedIn", " - LinkedIn", " – LinkedIn"] {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim();
        }
    }

    if let Some(caps) = hiring_pattern().and_then(|re| re.captures(title)) {
        let company = caps["company"].trim().to_string();
        let role = caps["role"].trim().to_string();
        if !company.is_empty() && !role.is_empty() {
            return (role, Some(company));
        }
    }

    (title.to_string(), None)
}
