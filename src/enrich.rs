use anyhow::Result;
use std::time::Duration;

use crate::browser::BrowserSession;
use crate::models::{NewListing, FALLBACK_DESCRIPTION};

/// Description containers across the supported boards, tried as one group.
const DESCRIPTION_SELECTORS: &[&str] = &[
    ".description__text",
    ".show-more-less-html__markup",
    ".jobs-description__content",
    "#jobDescriptionText",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// Description was already present; nothing fetched.
    NotNeeded,
    Resolved,
    /// The fallback text was stored instead; carries the reason.
    Fallback(String),
}

/// Visits a listing's detail page and fills in the description text.
pub struct DetailEnricher {
    selector: String,
    timeout: Duration,
}

impl Default for DetailEnricher {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl DetailEnricher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            selector: DESCRIPTION_SELECTORS.join(", "),
            timeout,
        }
    }

    /// Resolve a pending description. The detail page gets its own browser
    /// page, which is closed again whatever the outcome.
    pub async fn enrich(
        &self,
        session: &mut dyn BrowserSession,
        listing: &mut NewListing,
    ) -> EnrichOutcome {
        if !listing.is_pending() {
            return EnrichOutcome::NotNeeded;
        }

        if let Err(e) = session.open_page().await {
            listing.job_description = FALLBACK_DESCRIPTION.to_string();
            return EnrichOutcome::Fallback(format!("could not open page: {:#}", e));
        }

        let scraped = self.scrape(session, &listing.job_link).await;

        if let Err(e) = session.close_page().await {
            tracing::warn!(link = %listing.job_link, error = %format!("{:#}", e), "failed to close detail page");
        }

        match scraped {
            Ok(Some(text)) => {
                listing.job_description = text;
                EnrichOutcome::Resolved
            }
            Ok(None) => {
                listing.job_description = FALLBACK_DESCRIPTION.to_string();
                EnrichOutcome::Fallback(format!(
                    "description not found within {}s",
                    self.timeout.as_secs()
                ))
            }
            Err(e) => {
                listing.job_description = FALLBACK_DESCRIPTION.to_string();
                EnrichOutcome::Fallback(format!("{:#}", e))
            }
        }
    }

    async fn scrape(&self, session: &mut dyn BrowserSession, link: &str) -> Result<Option<String>> {
        session.goto(link).await?;
        if !session.wait_for(&self.selector, self.timeout).await? {
            return Ok(None);
        }
        let text = session.text_of(&self.selector).await?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }
}
