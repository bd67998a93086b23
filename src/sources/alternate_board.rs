use async_trait::async_trait;
use scraper::Html;
use std::time::Duration;
use url::Url;

use super::{attr_in, selector, text_in, Extraction, SearchQuery, Source, SourceExtractor};
use crate::browser::BrowserSession;
use crate::models::CandidateLink;

const SEARCH_URL: &str = "https://www.indeed.com/jobs";
const RESULT_CARD: &str = ".job_seen_beacon";
const CARD_TITLE: &str = "h2.jobTitle span";
const CARD_COMPANY: &str = "[data-testid=\"company-name\"]";
const CARD_LINK: &str = "a.jcs-JobTitle";

/// Second job board. An empty result page is a normal outcome here.
pub struct AlternateBoardExtractor {
    search_url: String,
    card_timeout: Duration,
}

impl Default for AlternateBoardExtractor {
    fn default() -> Self {
        Self {
            search_url: SEARCH_URL.to_string(),
            card_timeout: Duration::from_secs(10),
        }
    }
}

impl AlternateBoardExtractor {
    #[cfg(test)]
    pub fn with_search_url(search_url: &str, card_timeout: Duration) -> Self {
        Self {
            search_url: search_url.to_string(),
            card_timeout,
        }
    }

    fn results_url(&self, query: &SearchQuery) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.search_url,
            &[("q", query.keywords.as_str()), ("l", query.location.as_str())],
        )
    }
}

#[async_trait]
impl SourceExtractor for AlternateBoardExtractor {
    fn source(&self) -> Source {
        Source::AlternateJobBoard
    }

    async fn extract(&self, session: &mut dyn BrowserSession, query: &SearchQuery) -> Extraction {
        let url = match self.results_url(query) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "could not build results URL");
                return Extraction::empty();
            }
        };

        tracing::info!(url = %url, "opening job board results");
        if let Err(e) = session.goto(url.as_str()).await {
            tracing::warn!(error = %format!("{:#}", e), "job board failed to load");
            return Extraction::empty();
        }

        match session.wait_for(RESULT_CARD, self.card_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("no result cards: no jobs found or selector changed");
                return Extraction::empty();
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "waiting for result cards failed");
                return Extraction::empty();
            }
        }

        // Relative hrefs resolve against wherever the board redirected us
        let base = match session.current_url().await {
            Ok(current) => Url::parse(&current).unwrap_or(url),
            Err(_) => url,
        };

        match session.page_source().await {
            Ok(html) => Extraction::Found(parse_results(&html, &base)),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "could not read job board results");
                Extraction::empty()
            }
        }
    }
}

/// Parse result cards. A missing company is left for the normalizer.
pub(crate) fn parse_results(html: &str, base: &Url) -> Vec<CandidateLink> {
    let (Some(card_sel), Some(title_sel), Some(company_sel), Some(link_sel)) = (
        selector(RESULT_CARD),
        selector(CARD_TITLE),
        selector(CARD_COMPANY),
        selector(CARD_LINK),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut jobs = Vec::new();

    for card in document.select(&card_sel) {
        let (Some(title), Some(href)) = (text_in(card, &title_sel), attr_in(card, &link_sel, "href"))
        else {
            tracing::debug!("skipping result card without title or link");
            continue;
        };

        let link = match base.join(&href) {
            Ok(link) => link.to_string(),
            Err(e) => {
                tracing::debug!(href = %href, error = %e, "skipping unparseable link");
                continue;
            }
        };

        jobs.push(CandidateLink {
            title,
            company: text_in(card, &company_sel),
            link,
            external_id: attr_in(card, &link_sel, "data-jk"),
        });
    }

    jobs
}
