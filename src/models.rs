use serde::{Deserialize, Serialize};

/// Placeholder description stored until the detail page has been scraped.
pub const PENDING_DESCRIPTION: &str = "To be scraped...";

/// Stored when the detail page could not be loaded or had no description.
pub const FALLBACK_DESCRIPTION: &str = "Description not found or timed out.";

pub const UNKNOWN_COMPANY: &str = "Unknown";
pub const CONFIDENTIAL_COMPANY: &str = "Confidential";
pub const UNKNOWN_ROLE: &str = "Unknown Role";

/// A job posting found on a results page, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub title: String,
    pub company: Option<String>,
    pub link: String,
    pub external_id: Option<String>,
}

/// Insert shape for `job_listings`. `id` and `created_at` come from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    pub user_id: String,
    pub company_name: String,
    pub role_title: String,
    pub job_description: String,
    pub job_link: String,
}

impl NewListing {
    pub fn is_pending(&self) -> bool {
        self.job_description == PENDING_DESCRIPTION
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub id: i64,
    pub user_id: String,
    pub company_name: String,
    pub role_title: String,
    pub job_description: String,
    pub job_link: String,
    pub hiring_manager: Option<String>,
    pub is_actioned: bool,
    pub resume_url: Option<String>,
    pub cover_letter_url: Option<String>,
    pub drive_folder_url: Option<String>,
    pub created_at: String,
}
