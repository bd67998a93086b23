use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub default_keywords: String,
    pub default_location: String,
    /// Native-list work-type filter: 1 on-site, 2 remote, 3 hybrid.
    pub default_work_type: String,
    pub default_user_id: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub database_path: PathBuf,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_keywords: "software engineer".to_string(),
            default_location: "United Kingdom".to_string(),
            default_work_type: "2".to_string(),
            default_user_id: "default-user".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            database_path: default_database_path(),
            port: 3001,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let headless = match var("BROWSER_HEADLESS") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("BROWSER_HEADLESS must be true or false, got '{}'", v))?,
            None => defaults.headless,
        };

        let port = match var("PORT") {
            Some(v) => v.parse().context("PORT must be a valid number")?,
            None => defaults.port,
        };

        Ok(Self {
            default_keywords: var("SEARCH_KEYWORDS").unwrap_or(defaults.default_keywords),
            default_location: var("SEARCH_LOCATION").unwrap_or(defaults.default_location),
            default_work_type: var("SEARCH_WORK_TYPE").unwrap_or(defaults.default_work_type),
            default_user_id: var("DEFAULT_USER_ID").unwrap_or(defaults.default_user_id),
            webdriver_url: var("WEBDRIVER_URL").unwrap_or(defaults.webdriver_url),
            headless,
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            port,
        })
    }
}

/// Empty values count as unset.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_database_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobsweep") {
        proj_dirs.data_dir().join("jobsweep.db")
    } else {
        PathBuf::from("jobsweep.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_safe_literals() {
        let config = Config::default();
        assert_eq!(config.default_keywords, "software engineer");
        assert_eq!(config.default_location, "United Kingdom");
        assert_eq!(config.default_work_type, "2");
        assert_eq!(config.default_user_id, "default-user");
        assert_eq!(config.port, 3001);
        assert!(config.database_path.ends_with("jobsweep.db"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
