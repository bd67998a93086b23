use async_trait::async_trait;
use scraper::Html;
use std::time::Duration;
use url::Url;

use super::{attr_in, selector, text_in, Extraction, SearchQuery, Source, SourceExtractor};
use crate::browser::BrowserSession;
use crate::models::CandidateLink;

const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";
const RESULTS_CONTAINER: &str = ".jobs-search__results-list";
const RESULT_CARD: &str = ".jobs-search__results-list > li";
const CARD_TITLE: &str = ".base-search-card__title";
const CARD_COMPANY: &str = ".base-search-card__subtitle";
const CARD_LINK: &str = "a.base-card__full-link";
const CARD_URN: &str = "[data-entity-urn]";

/// Public (guest) job-search results listing.
pub struct NativeListExtractor {
    search_url: String,
    results_timeout: Duration,
}

impl Default for NativeListExtractor {
    fn default() -> Self {
        Self {
            search_url: SEARCH_URL.to_string(),
            results_timeout: Duration::from_secs(15),
        }
    }
}

impl NativeListExtractor {
    #[cfg(test)]
    pub fn with_search_url(search_url: &str, results_timeout: Duration) -> Self {
        Self {
            search_url: search_url.to_string(),
            results_timeout,
        }
    }

    fn results_url(&self, query: &SearchQuery) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.search_url,
            &[
                ("keywords", query.keywords.as_str()),
                ("location", query.location.as_str()),
                ("f_WT", query.work_type.as_str()),
                ("origin", "JOB_SEARCH_PAGE_JOB_FILTER"),
            ],
        )
    }
}

#[async_trait]
impl SourceExtractor for NativeListExtractor {
    fn source(&self) -> Source {
        Source::NativeList
    }

    async fn extract(&self, session: &mut dyn BrowserSession, query: &SearchQuery) -> Extraction {
        let url = match self.results_url(query) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "could not build results URL");
                return Extraction::NoResultsContainer;
            }
        };

        tracing::info!(url = %url, "opening results listing");
        if let Err(e) = session.goto(url.as_str()).await {
            tracing::warn!(error = %format!("{:#}", e), "results listing failed to load");
            return Extraction::NoResultsContainer;
        }

        match session.wait_for(RESULTS_CONTAINER, self.results_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    timeout_secs = self.results_timeout.as_secs(),
                    "results container never rendered"
                );
                return Extraction::NoResultsContainer;
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "waiting for results container failed");
                return Extraction::NoResultsContainer;
            }
        }

        // Card hrefs may be relative to wherever the listing ended up
        let base = match session.current_url().await {
            Ok(current) => Url::parse(&current).unwrap_or(url),
            Err(_) => url,
        };

        match session.page_source().await {
            Ok(html) => Extraction::Found(parse_results(&html, &base)),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "could not read results listing");
                Extraction::empty()
            }
        }
    }
}

/// Parse result cards. Cards missing a title, company or link are skipped.
/// Links are resolved against `base`.
pub(crate) fn parse_results(html: &str, base: &Url) -> Vec<CandidateLink> {
    let (Some(card_sel), Some(title_sel), Some(company_sel), Some(link_sel), Some(urn_sel)) = (
        selector(RESULT_CARD),
        selector(CARD_TITLE),
        selector(CARD_COMPANY),
        selector(CARD_LINK),
        selector(CARD_URN),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut jobs = Vec::new();

    for card in document.select(&card_sel) {
        let title = text_in(card, &title_sel);
        let company = text_in(card, &company_sel);
        let link = attr_in(card, &link_sel, "href");

        let (Some(title), Some(company), Some(href)) = (title, company, link) else {
            tracing::debug!("skipping incomplete result card");
            continue;
        };
        let link = match base.join(&href) {
            Ok(link) => link.to_string(),
            Err(e) => {
                tracing::debug!(href = %href, error = %e, "skipping unparseable link");
                continue;
            }
        };

        let urn = card
            .value()
            .attr("data-entity-urn")
            .map(str::to_string)
            .or_else(|| attr_in(card, &urn_sel, "data-entity-urn"));

        jobs.push(CandidateLink {
            title,
            company: Some(company),
            link,
            external_id: urn.as_deref().and_then(posting_id_from_urn),
        });
    }

    jobs
}

/// `urn:li:jobPosting:3812345678` -> `3812345678`
fn posting_id_from_urn(urn: &str) -> Option<String> {
    urn.rsplit(':')
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
