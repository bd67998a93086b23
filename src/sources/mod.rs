//! Job-board extraction strategies.
//!
//! Every source drives a browser session to a results page, snapshots the
//! rendered HTML and parses it with `scraper`. Extractors never fail: a
//! navigation or parse problem is logged and yields no candidates. The only
//! outcome distinct from "found N candidates" is a results container that
//! never rendered, which the pipeline treats as a setup failure.

mod alternate_board;
mod native_list;
mod search_engine;

pub use alternate_board::AlternateBoardExtractor;
pub use native_list::NativeListExtractor;
pub use search_engine::SearchEngineExtractor;

use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::browser::BrowserSession;
use crate::models::CandidateLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Direct job-search results listing (LinkedIn guest search).
    NativeList,
    /// Web search engine restricted to the posting URL pattern.
    SearchEngineIndirect,
    /// Second job board (Indeed).
    AlternateJobBoard,
}

impl Source {
    pub const ALL: [Source; 3] = [
        Source::NativeList,
        Source::SearchEngineIndirect,
        Source::AlternateJobBoard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::NativeList => "native-list",
            Source::SearchEngineIndirect => "search-engine-indirect",
            Source::AlternateJobBoard => "alternate-job-board",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native-list" | "linkedin" => Ok(Source::NativeList),
            "search-engine-indirect" | "xray" | "google" => Ok(Source::SearchEngineIndirect),
            "alternate-job-board" | "indeed" => Ok(Source::AlternateJobBoard),
            other => Err(format!(
                "Unknown source '{}'. Available: native-list (linkedin), \
                 search-engine-indirect (xray), alternate-job-board (indeed)",
                other
            )),
        }
    }
}

/// Resolved search parameters for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keywords: String,
    pub location: String,
    pub work_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(Vec<CandidateLink>),
    /// The results page never rendered its results container.
    NoResultsContainer,
}

impl Extraction {
    pub fn empty() -> Self {
        Extraction::Found(Vec::new())
    }
}

#[async_trait]
pub trait SourceExtractor: Send + Sync {
    fn source(&self) -> Source;

    async fn extract(&self, session: &mut dyn BrowserSession, query: &SearchQuery) -> Extraction;
}

pub fn extractor_for(source: Source) -> Box<dyn SourceExtractor> {
    match source {
        Source::NativeList => Box::new(NativeListExtractor::default()),
        Source::SearchEngineIndirect => Box::new(SearchEngineExtractor::default()),
        Source::AlternateJobBoard => Box::new(AlternateBoardExtractor::default()),
    }
}

// --- HTML helpers shared by the parsers ---

pub(crate) fn selector(css: &str) -> Option<Selector> {
    let parsed = Selector::parse(css).ok();
    if parsed.is_none() {
        tracing::error!(selector = css, "invalid CSS selector");
    }
    parsed
}

/// Whitespace-collapsed text of the first match under `scope`.
pub(crate) fn text_in(scope: ElementRef<'_>, css: &Selector) -> Option<String> {
    scope
        .select(css)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())
}

pub(crate) fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn attr_in(scope: ElementRef<'_>, css: &Selector, attr: &str) -> Option<String> {
    scope
        .select(css)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
