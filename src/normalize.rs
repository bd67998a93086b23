use url::Url;

use crate::models::{
    CandidateLink, NewListing, CONFIDENTIAL_COMPANY, PENDING_DESCRIPTION, UNKNOWN_COMPANY,
    UNKNOWN_ROLE,
};
use crate::sources::Source;

/// Map a source's candidate onto the canonical listing shape.
///
/// No source embeds description text at discovery time, so every listing
/// starts out with the pending placeholder.
pub fn normalize(source: Source, candidate: &CandidateLink, user_id: &str) -> NewListing {
    let role_title = non_empty(&candidate.title).unwrap_or(UNKNOWN_ROLE).to_string();
    let company_name = candidate
        .company
        .as_deref()
        .and_then(non_empty)
        .unwrap_or(match source {
            Source::AlternateJobBoard => CONFIDENTIAL_COMPANY,
            Source::NativeList | Source::SearchEngineIndirect => UNKNOWN_COMPANY,
        })
        .to_string();

    NewListing {
        user_id: user_id.to_string(),
        company_name,
        role_title,
        job_description: PENDING_DESCRIPTION.to_string(),
        job_link: canonical_link(source, &candidate.link),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Canonical form of a posting URL, used as the upsert conflict key.
///
/// Fragments never identify a posting. Native-list and search-engine links
/// carry only tracking parameters in the query; the alternate board keys its
/// postings on `jk`, so those are rewritten to the stable `viewjob` form.
pub fn canonical_link(source: Source, link: &str) -> String {
    let trimmed = link.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return clean_tracking_url(trimmed);
    };
    url.set_fragment(None);

    match source {
        Source::NativeList | Source::SearchEngineIndirect => {
            url.set_query(None);
        }
        Source::AlternateJobBoard => {
            let job_key = url
                .query_pairs()
                .find(|(k, _)| k == "jk")
                .map(|(_, v)| v.into_owned());
            if let Some(jk) = job_key {
                url.set_path("/viewjob");
                url.query_pairs_mut().clear().append_pair("jk", &jk);
            }
        }
    }

    url.to_string()
}

fn clean_tracking_url(url: &str) -> String {
    // Not an absolute URL; strip everything after ? or # and keep the rest
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_string()
}
