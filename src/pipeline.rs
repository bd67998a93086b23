//! Batch orchestration.
//!
//! Phase A runs the selected extractor once in its own browser session.
//! Phase B walks the candidates one at a time: normalize, enrich, upsert,
//! pace. Item failures are logged and counted; only a browser that cannot
//! start or a results listing that never renders fails the batch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::config::Config;
use crate::db::{ListingStore, UpsertOutcome};
use crate::enrich::{DetailEnricher, EnrichOutcome};
use crate::models::{CandidateLink, NewListing};
use crate::normalize::normalize;
use crate::pacer::Pacer;
use crate::sources::{extractor_for, Extraction, SearchQuery, Source, SourceExtractor};
use crate::status::IngestController;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub source: Source,
    pub keywords: Option<String>,
    pub location: Option<String>,
}

/// Batch-level failures. Everything item-level is absorbed into the summary.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("browser session could not start: {0:#}")]
    SessionStart(anyhow::Error),
    #[error("{0}: results container never rendered")]
    ResultsContainerMissing(Source),
    #[error("no extractor registered for {0}")]
    NoExtractor(Source),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub candidates: usize,
    /// Candidates dropped because an earlier one had the same link.
    pub duplicates: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub enrichment_fallbacks: usize,
    pub persistence_failures: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} found, {} saved, {} already stored, {} without description, {} failed to save",
            self.candidates,
            self.inserted,
            self.skipped + self.duplicates,
            self.enrichment_fallbacks,
            self.persistence_failures
        )
    }
}

pub struct Pipeline {
    config: Config,
    launcher: Arc<dyn BrowserLauncher>,
    store: Arc<dyn ListingStore>,
    extractors: HashMap<Source, Box<dyn SourceExtractor>>,
    enricher: DetailEnricher,
    pacer: Pacer,
}

impl Pipeline {
    pub fn new(config: Config, launcher: Arc<dyn BrowserLauncher>, store: Arc<dyn ListingStore>) -> Self {
        let extractors = Source::ALL
            .into_iter()
            .map(|source| (source, extractor_for(source)))
            .collect();
        Self {
            config,
            launcher,
            store,
            extractors,
            enricher: DetailEnricher::default(),
            pacer: Pacer::default(),
        }
    }

    #[cfg(test)]
    pub fn with_extractor(mut self, extractor: Box<dyn SourceExtractor>) -> Self {
        self.extractors.insert(extractor.source(), extractor);
        self
    }

    #[cfg(test)]
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    #[cfg(test)]
    pub fn with_enricher(mut self, enricher: DetailEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    /// Fill omitted keywords/location from configuration.
    pub fn resolve_query(&self, request: &IngestRequest) -> SearchQuery {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        SearchQuery {
            keywords: pick(&request.keywords, &self.config.default_keywords),
            location: pick(&request.location, &self.config.default_location),
            work_type: self.config.default_work_type.clone(),
        }
    }

    pub async fn run_batch(
        &self,
        request: &IngestRequest,
        log: &IngestController,
    ) -> Result<BatchSummary, IngestError> {
        let query = self.resolve_query(request);
        log.log(format!(
            "Mode: {} | keywords: {} | location: {}",
            request.source, query.keywords, query.location
        ))
        .await;

        let candidates = self.extract_candidates(request.source, &query, log).await?;
        let mut summary = BatchSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            return Ok(summary);
        }

        let listings = self.normalize_all(request.source, &candidates, &mut summary);

        let mut session = self.launcher.launch().await.map_err(IngestError::SessionStart)?;
        self.process_listings(session.as_mut(), listings, &mut summary, log)
            .await;
        if let Err(e) = session.close().await {
            tracing::warn!(error = %format!("{:#}", e), "failed to close enrichment session");
        }

        Ok(summary)
    }

    async fn extract_candidates(
        &self,
        source: Source,
        query: &SearchQuery,
        log: &IngestController,
    ) -> Result<Vec<CandidateLink>, IngestError> {
        let extractor = self
            .extractors
            .get(&source)
            .ok_or(IngestError::NoExtractor(source))?;

        // Fresh session per extraction so no cookies carry over between runs
        let mut session = self.launcher.launch().await.map_err(IngestError::SessionStart)?;
        let extraction = extractor.extract(session.as_mut(), query).await;
        if let Err(e) = session.close().await {
            tracing::warn!(error = %format!("{:#}", e), "failed to close extraction session");
        }

        match extraction {
            Extraction::Found(candidates) => {
                log.log(format!("Found {} jobs.", candidates.len())).await;
                Ok(candidates)
            }
            Extraction::NoResultsContainer => Err(IngestError::ResultsContainerMissing(source)),
        }
    }

    /// Normalize and drop repeated links, keeping the first occurrence.
    fn normalize_all(
        &self,
        source: Source,
        candidates: &[CandidateLink],
        summary: &mut BatchSummary,
    ) -> Vec<NewListing> {
        let mut seen = HashSet::new();
        let mut listings = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let listing = normalize(source, candidate, &self.config.default_user_id);
            tracing::debug!(
                link = %listing.job_link,
                posting_id = candidate.external_id.as_deref(),
                "normalized candidate"
            );
            if seen.insert(listing.job_link.clone()) {
                listings.push(listing);
            } else {
                summary.duplicates += 1;
            }
        }
        listings
    }

    async fn process_listings(
        &self,
        session: &mut dyn BrowserSession,
        listings: Vec<NewListing>,
        summary: &mut BatchSummary,
        log: &IngestController,
    ) {
        for (i, mut listing) in listings.into_iter().enumerate() {
            if i > 0 {
                self.pacer.pause().await;
            }

            log.log(format!(
                "Processing: {} at {}",
                listing.role_title, listing.company_name
            ))
            .await;

            if let EnrichOutcome::Fallback(reason) = self.enricher.enrich(session, &mut listing).await {
                summary.enrichment_fallbacks += 1;
                tracing::warn!(link = %listing.job_link, reason = %reason, "description unavailable");
                log.log(format!("No description for {}: {}", listing.job_link, reason))
                    .await;
            }

            match self.store.upsert_listing(&listing) {
                Ok(UpsertOutcome::Inserted(id)) => {
                    summary.inserted += 1;
                    log.log(format!("Saved to DB (#{}).", id)).await;
                }
                Ok(UpsertOutcome::Skipped) => {
                    summary.skipped += 1;
                    log.log(format!("Already stored, skipped: {}", listing.job_link))
                        .await;
                }
                Err(e) => {
                    summary.persistence_failures += 1;
                    tracing::error!(link = %listing.job_link, error = %format!("{:#}", e), "upsert failed");
                    log.log(format!("Storage error for {}: {:#}", listing.job_link, e))
                        .await;
                }
            }
        }
    }
}
