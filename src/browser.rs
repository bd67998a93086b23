use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use thirtyfour::prelude::*;
use thirtyfour::{CapabilitiesHelper, PageLoadStrategy};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Starts isolated browsing sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One browsing session. A session has a current page; `open_page` pushes a
/// fresh page on top of it and `close_page` discards that page again.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate the current page and wait for the DOM content to load.
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Poll for `selector` until it appears. `Ok(false)` means timed out.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn current_url(&mut self) -> Result<String>;

    async fn page_source(&mut self) -> Result<String>;

    /// Text content of the first element matching `selector`.
    async fn text_of(&mut self, selector: &str) -> Result<String>;

    /// Type `query` into the input at `selector` and submit it with Enter.
    async fn submit_query(&mut self, selector: &str, query: &str) -> Result<()>;

    async fn open_page(&mut self) -> Result<()>;

    async fn close_page(&mut self) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// User agent and window size chosen per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: &'static str,
    pub width: u32,
    pub height: u32,
}

impl Fingerprint {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let user_agent = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
        Self {
            user_agent,
            width: 1280 + rng.gen_range(0..=160),
            height: 800 + rng.gen_range(0..=100),
        }
    }

    fn chrome_args(&self) -> Vec<String> {
        vec![
            format!("--user-agent={}", self.user_agent),
            format!("--window-size={},{}", self.width, self.height),
            "--lang=en-US".to_string(),
        ]
    }
}

/// Launches Chrome through a chromedriver endpoint.
pub struct ChromeLauncher {
    webdriver_url: String,
    headless: bool,
}

impl ChromeLauncher {
    pub fn new(webdriver_url: &str, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            headless,
        }
    }

    async fn start(&self) -> Result<ChromeSession> {
        let fingerprint = Fingerprint::random(&mut rand::thread_rng());
        tracing::debug!(user_agent = fingerprint.user_agent, "launching chrome");

        let mut caps = DesiredCapabilities::chrome();
        // DOMContentLoaded, not network idle: job pages keep trackers polling
        caps.set_page_load_strategy(PageLoadStrategy::Eager)?;
        if self.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        for arg in fingerprint.chrome_args() {
            caps.add_arg(&arg)?;
        }

        let driver = WebDriver::new(self.webdriver_url.as_str(), caps)
            .await
            .with_context(|| {
                format!(
                    "Failed to start Chrome via {}. Make sure chromedriver is running.",
                    self.webdriver_url
                )
            })?;
        let root = driver.window().await?;

        Ok(ChromeSession {
            driver,
            pages: vec![root],
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(self.start().await?))
    }
}

pub struct ChromeSession {
    driver: WebDriver,
    pages: Vec<WindowHandle>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let found = self
            .driver
            .query(By::Css(selector))
            .wait(timeout, POLL_INTERVAL)
            .exists()
            .await?;
        Ok(found)
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn page_source(&mut self) -> Result<String> {
        self.driver
            .source()
            .await
            .context("Failed to read page source")
    }

    async fn text_of(&mut self, selector: &str) -> Result<String> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .with_context(|| format!("No element matches {}", selector))?;
        Ok(element.text().await?)
    }

    async fn submit_query(&mut self, selector: &str, query: &str) -> Result<()> {
        let input = self
            .driver
            .find(By::Css(selector))
            .await
            .with_context(|| format!("Search box {} not found", selector))?;
        input.send_keys(query).await?;
        input.send_keys(Key::Enter + "").await?;
        Ok(())
    }

    async fn open_page(&mut self) -> Result<()> {
        let handle = self
            .driver
            .new_tab()
            .await
            .context("Failed to open browser tab")?;
        self.driver.switch_to_window(handle.clone()).await?;
        self.pages.push(handle);
        Ok(())
    }

    async fn close_page(&mut self) -> Result<()> {
        // The root page lives as long as the session
        if self.pages.len() <= 1 {
            return Ok(());
        }
        // Handle is dropped and focus restored even when the close fails
        let closed = self.driver.close_window().await;
        self.pages.pop();
        let switched = match self.pages.last() {
            Some(previous) => self.driver.switch_to_window(previous.clone()).await,
            None => Ok(()),
        };
        closed.context("Failed to close browser tab")?;
        switched.context("Failed to switch back to previous tab")?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.driver.quit().await.context("Failed to close Chrome")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fingerprint_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let fp = Fingerprint::random(&mut rng);
            assert!(USER_AGENTS.contains(&fp.user_agent));
            assert!((1280..=1440).contains(&fp.width));
            assert!((800..=900).contains(&fp.height));
        }
    }

    #[test]
    fn test_fingerprint_chrome_args() {
        let fp = Fingerprint {
            user_agent: USER_AGENTS[0],
            width: 1300,
            height: 850,
        };
        let args = fp.chrome_args();
        assert!(args[0].starts_with("--user-agent=Mozilla/5.0"));
        assert_eq!(args[1], "--window-size=1300,850");
        assert_eq!(args[2], "--lang=en-US");
    }

    #[tokio::test]
    #[ignore] // Requires chromedriver on localhost:9515
    async fn test_chrome_session_round_trip() {
        let launcher = ChromeLauncher::new("http://localhost:9515", true);
        let mut session = launcher.launch().await.expect("Failed to launch chrome");
        session.goto("https://example.com").await.unwrap();
        assert!(session.wait_for("h1", Duration::from_secs(5)).await.unwrap());
        session.open_page().await.unwrap();
        session.close_page().await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires chromedriver on localhost:9515
    async fn test_failed_tab_close_still_returns_to_previous_page() {
        let launcher = ChromeLauncher::new("http://localhost:9515", true);
        let mut session = launcher.start().await.expect("Failed to launch chrome");
        session.open_page().await.unwrap();
        assert_eq!(session.pages.len(), 2);

        // Tab disappears behind the session's back
        session.driver.close_window().await.unwrap();
        assert!(session.close_page().await.is_err());
        assert_eq!(session.pages.len(), 1);

        session.goto("https://example.com").await.unwrap();
        assert!(session.wait_for("h1", Duration::from_secs(5)).await.unwrap());
        Box::new(session).close().await.unwrap();
    }
}
