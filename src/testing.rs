//! In-memory browser, launcher and store doubles plus HTML fixtures.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::db::{ListingStore, UpsertOutcome};
use crate::models::{CandidateLink, NewListing};
use crate::sources::{collapsed_text, Extraction, SearchQuery, Source, SourceExtractor};

/// Serves canned HTML by URL. Unknown URLs fail like an unreachable host.
/// Selectors are evaluated against the stored HTML immediately, so a wait
/// either succeeds at once or times out at once.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, String>,
    search_results_url: Option<String>,
    /// Current URL of each open page; index 0 is the root page.
    stack: Vec<Option<String>>,
    pages_opened: usize,
    submitted: Vec<String>,
    closed: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            stack: vec![None],
            ..Default::default()
        }
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Page shown after a query is submitted.
    pub fn with_search_results(mut self, url: &str, html: &str) -> Self {
        self.search_results_url = Some(url.to_string());
        self.with_page(url, html)
    }

    pub fn submitted_queries(&self) -> Vec<String> {
        self.submitted.clone()
    }

    /// Pages currently open on top of the root page.
    pub fn open_pages(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened
    }

    fn resolve(&self, url: &str) -> Option<&String> {
        self.pages.get(url).or_else(|| {
            let without_query = url.split('?').next().unwrap_or(url);
            self.pages.get(without_query)
        })
    }

    fn current(&self) -> Option<&str> {
        self.stack.last().and_then(|url| url.as_deref())
    }

    fn current_html(&self) -> Result<&String> {
        let url = self.current().ok_or_else(|| anyhow!("no page loaded"))?;
        self.resolve(url)
            .ok_or_else(|| anyhow!("no content for {}", url))
    }

    fn set_current(&mut self, url: &str) {
        if let Some(top) = self.stack.last_mut() {
            *top = Some(url.to_string());
        }
    }
}

fn first_match_text(html: &str, css: &str) -> Result<Option<String>> {
    let selector = Selector::parse(css).map_err(|_| anyhow!("invalid selector {}", css))?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).next().map(collapsed_text))
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn goto(&mut self, url: &str) -> Result<()> {
        if self.resolve(url).is_none() {
            bail!("net::ERR_NAME_NOT_RESOLVED at {}", url);
        }
        self.set_current(url);
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        let Ok(html) = self.current_html() else {
            return Ok(false);
        };
        Ok(first_match_text(html, selector)?.is_some())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.current()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no page loaded"))
    }

    async fn page_source(&mut self) -> Result<String> {
        self.current_html().cloned()
    }

    async fn text_of(&mut self, selector: &str) -> Result<String> {
        let html = self.current_html()?;
        first_match_text(html, selector)?.ok_or_else(|| anyhow!("No element matches {}", selector))
    }

    async fn submit_query(&mut self, selector: &str, query: &str) -> Result<()> {
        let html = self.current_html()?;
        if first_match_text(html, selector)?.is_none() {
            bail!("Search box {} not found", selector);
        }
        self.submitted.push(query.to_string());
        if let Some(url) = self.search_results_url.clone() {
            self.set_current(&url);
        }
        Ok(())
    }

    async fn open_page(&mut self) -> Result<()> {
        self.stack.push(None);
        self.pages_opened += 1;
        Ok(())
    }

    async fn close_page(&mut self) -> Result<()> {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out fresh copies of a `FakeBrowser`. When gated, launches block
/// until `release` is called.
pub struct FakeLauncher {
    template: FakeBrowser,
    launches: AtomicUsize,
    gate: Option<Arc<Notify>>,
    released: AtomicBool,
}

impl FakeLauncher {
    pub fn new(template: FakeBrowser) -> Self {
        Self {
            template,
            launches: AtomicUsize::new(0),
            gate: None,
            released: AtomicBool::new(false),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.template.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if let Some(gate) = &self.gate {
            if !self.released.load(Ordering::SeqCst) {
                gate.notified().await;
            }
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }
}

pub struct FailingLauncher;

#[async_trait]
impl BrowserLauncher for FailingLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        bail!("chromedriver not reachable at http://localhost:9515")
    }
}

/// Returns a fixed candidate list.
pub struct StaticExtractor {
    source: Source,
    candidates: Vec<CandidateLink>,
}

impl StaticExtractor {
    pub fn new(source: Source, candidates: Vec<CandidateLink>) -> Self {
        Self { source, candidates }
    }
}

#[async_trait]
impl SourceExtractor for StaticExtractor {
    fn source(&self) -> Source {
        self.source
    }

    async fn extract(&self, _session: &mut dyn BrowserSession, _query: &SearchQuery) -> Extraction {
        Extraction::Found(self.candidates.clone())
    }
}

/// Panics mid-extraction, like a driver or parser bug would.
pub struct PanickingExtractor(pub Source);

#[async_trait]
impl SourceExtractor for PanickingExtractor {
    fn source(&self) -> Source {
        self.0
    }

    async fn extract(&self, _session: &mut dyn BrowserSession, _query: &SearchQuery) -> Extraction {
        panic!("result card parser crashed");
    }
}

/// Records writes and fails for one link.
pub struct FailingStore {
    failing_link: String,
    saved: Mutex<Vec<String>>,
}

impl FailingStore {
    pub fn failing_on(link: &str) -> Self {
        Self {
            failing_link: link.to_string(),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved_links(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

impl ListingStore for FailingStore {
    fn upsert_listing(&self, listing: &NewListing) -> Result<UpsertOutcome> {
        if listing.job_link == self.failing_link {
            bail!("disk I/O error");
        }
        let mut saved = self.saved.lock().unwrap();
        saved.push(listing.job_link.clone());
        Ok(UpsertOutcome::Inserted(saved.len() as i64))
    }
}

pub const NATIVE_LIST_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
  <section class="two-pane-serp-page__results-list">
    <ul class="jobs-search__results-list">
      <li>
        <div class="base-card base-search-card" data-entity-urn="urn:li:jobPosting:3812345678">
          <a class="base-card__full-link" href="https://de.linkedin.com/jobs/view/backend-engineer-at-acme-3812345678?refId=abc&amp;trackingId=xyz">
            <span class="sr-only">Backend Engineer</span>
          </a>
          <div class="base-search-card__info">
            <h3 class="base-search-card__title">
              Backend Engineer
            </h3>
            <h4 class="base-search-card__subtitle">
              <a href="https://de.linkedin.com/company/acme">Acme GmbH</a>
            </h4>
            <span class="job-search-card__location">Berlin, Germany</span>
          </div>
        </div>
      </li>
      <li>
        <div class="base-card base-search-card">
          <a class="base-card__full-link" href="https://de.linkedin.com/jobs/view/platform-engineer-at-globex-3899999999?trackingId=q1">
            <span class="sr-only">Platform Engineer</span>
          </a>
          <div class="base-search-card__info" data-entity-urn="urn:li:jobPosting:3899999999">
            <h3 class="base-search-card__title">Platform Engineer</h3>
            <h4 class="base-search-card__subtitle">Globex</h4>
          </div>
        </div>
      </li>
      <li>
        <div class="base-card base-search-card" data-entity-urn="urn:li:jobPosting:3855555555">
          <a class="base-card__full-link" href="/jobs/view/data-engineer-at-initech-3855555555?trackingId=rel">
            <span class="sr-only">Data Engineer</span>
          </a>
          <div class="base-search-card__info">
            <h3 class="base-search-card__title">Data Engineer</h3>
            <h4 class="base-search-card__subtitle">Initech</h4>
          </div>
        </div>
      </li>
      <li>
        <div class="base-card base-search-card" data-entity-urn="urn:li:jobPosting:3800000001">
          <a class="base-card__full-link" href="https://de.linkedin.com/jobs/view/mystery-role-3800000001">
            <span class="sr-only">Mystery Role</span>
          </a>
          <div class="base-search-card__info">
            <h3 class="base-search-card__title">Mystery Role</h3>
          </div>
        </div>
      </li>
    </ul>
  </section>
</body>
</html>
"#;

pub const SEARCH_RESULTS_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
  <div id="search">
    <div class="g">
      <a href="https://www.linkedin.com/jobs/view/backend-engineer-at-acme-3812345678">
        <h3>Acme hiring Backend Engineer in Berlin, Germany | LinkedIn</h3>
      </a>
    </div>
    <div class="g">
      <a href="https://www.linkedin.com/jobs/search?keywords=backend%20engineer&amp;location=Berlin">
        <h3>1,000+ Backend Engineer jobs in Berlin</h3>
      </a>
    </div>
    <div class="g">
      <a href="/url?q=https://de.linkedin.com/jobs/view/3877777777&amp;sa=U">
        <h3>Senior Rust Developer - LinkedIn</h3>
      </a>
    </div>
    <div class="g">
      <a href="https://www.stepstone.de/stellenangebote--Backend-Engineer-Berlin-Initech--123.html">
        <h3>Backend Engineer - Initech</h3>
      </a>
    </div>
    <div class="g">
      <a href="https://www.linkedin.com/jobs/view/backend-engineer-at-acme-3812345678">
        <h3>Acme hiring Backend Engineer in Berlin, Germany | LinkedIn</h3>
      </a>
    </div>
    <div class="g">
      <a href="https://www.linkedin.com/jobs/view/3811111111">
        <span>LinkedIn</span>
      </a>
    </div>
  </div>
</body>
</html>
"#;

pub const ALTERNATE_BOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
  <div id="mosaic-provider-jobcards">
    <ul>
      <li>
        <div class="cardOutline">
          <div class="job_seen_beacon">
            <h2 class="jobTitle">
              <a class="jcs-JobTitle" data-jk="a1b2c3d4" href="/rc/clk?jk=a1b2c3d4&amp;from=serp">
                <span title="Backend Engineer (m/w/d)">Backend Engineer (m/w/d)</span>
              </a>
            </h2>
            <div class="company_location">
              <span data-testid="company-name">Acme</span>
              <div data-testid="text-location">Berlin</div>
            </div>
          </div>
        </div>
      </li>
      <li>
        <div class="cardOutline">
          <div class="job_seen_beacon">
            <h2 class="jobTitle">
              <a class="jcs-JobTitle" href="/viewjob?jk=e5f6g7h8">
                <span>API Developer</span>
              </a>
            </h2>
            <div class="company_location">
              <div data-testid="text-location">Remote</div>
            </div>
          </div>
        </div>
      </li>
      <li>
        <div class="cardOutline">
          <div class="job_seen_beacon">
            <div class="mosaic-zone">Sponsored</div>
          </div>
        </div>
      </li>
    </ul>
  </div>
</body>
</html>
"#;
