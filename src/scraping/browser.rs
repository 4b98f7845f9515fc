use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::config::BrowserConfig;
use crate::error::AppError;
use crate::scraping::{PageDriver, WaitState};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One WebDriver session.
pub struct BrowserController {
    client: Client,
    page_timeout: Duration,
}

impl BrowserController {
    pub async fn connect(config: &BrowserConfig) -> Result<Self, AppError> {
        let mut capabilities = serde_json::Map::new();
        let mut chrome_args = vec!["--window-size=1280,2000"];
        if config.headless {
            chrome_args.push("--headless=new");
            capabilities.insert(
                "moz:firefoxOptions".to_string(),
                json!({ "args": ["-headless"] }),
            );
        }
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": chrome_args }),
        );

        debug!(
            "Connecting to WebDriver at {} (headless: {})",
            config.webdriver_url, config.headless
        );
        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| AppError::SessionError(format!("could not start browser session: {e}")))?;

        Ok(Self {
            client,
            page_timeout: config.page_timeout(),
        })
    }

    async fn displayed_count(&self, selector: &str) -> Result<(usize, usize), AppError> {
        let elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(AppError::browser)?;

        let mut displayed = 0;
        for element in &elements {
            // A node can go stale between lookup and the display check.
            if element.is_displayed().await.unwrap_or(false) {
                displayed += 1;
            }
        }
        Ok((elements.len(), displayed))
    }

    async fn state_reached(&self, selector: &str, state: WaitState) -> Result<bool, AppError> {
        let (present, displayed) = self.displayed_count(selector).await?;
        Ok(match state {
            WaitState::Attached => present > 0,
            WaitState::Visible => displayed > 0,
            WaitState::Hidden => displayed == 0,
            WaitState::Detached => present == 0,
        })
    }
}

#[async_trait]
impl PageDriver for BrowserController {
    async fn goto(&self, url: &str) -> Result<(), AppError> {
        timeout(self.page_timeout, self.client.goto(url))
            .await
            .map_err(|_| AppError::timeout(format!("navigation to {url}"), self.page_timeout))?
            .map_err(AppError::browser)
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let url = self.client.current_url().await.map_err(AppError::browser)?;
        Ok(url.to_string())
    }

    async fn exists(&self, selector: &str) -> Result<bool, AppError> {
        let elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(AppError::browser)?;
        Ok(!elements.is_empty())
    }

    async fn text(&self, selector: &str) -> Result<Option<String>, AppError> {
        let elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(AppError::browser)?;

        match elements.first() {
            Some(element) => {
                let text = element.text().await.map_err(AppError::browser)?;
                Ok(Some(text.trim().to_string()))
            }
            None => Ok(None),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        self.client
            .find(Locator::Css(selector))
            .await
            .map_err(AppError::browser)?
            .click()
            .await
            .map_err(AppError::browser)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), AppError> {
        let field = self
            .client
            .find(Locator::Css(selector))
            .await
            .map_err(AppError::browser)?;
        field.clear().await.map_err(AppError::browser)?;
        field.send_keys(value).await.map_err(AppError::browser)
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        wait: Duration,
    ) -> Result<(), AppError> {
        if state == WaitState::Attached {
            return match self
                .client
                .wait()
                .at_most(wait)
                .every(POLL_INTERVAL)
                .for_element(Locator::Css(selector))
                .await
            {
                Ok(_) => Ok(()),
                Err(CmdError::WaitTimeout) => {
                    Err(AppError::timeout(format!("{selector} to appear"), wait))
                }
                Err(e) => Err(AppError::browser(e)),
            };
        }

        let deadline = Instant::now() + wait;
        loop {
            if self.state_reached(selector, state).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(
                    format!("{selector} to become {state:?}"),
                    wait,
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn scroll_by(&self, px: i64) -> Result<(), AppError> {
        self.client
            .execute("window.scrollBy(0, arguments[0]);", vec![json!(px)])
            .await
            .map_err(AppError::browser)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, AppError> {
        self.client
            .execute(script, args)
            .await
            .map_err(AppError::browser)
    }

    async fn evaluate_async(&self, script: &str, args: Vec<Value>) -> Result<Value, AppError> {
        self.client
            .execute_async(script, args)
            .await
            .map_err(AppError::browser)
    }

    async fn close(&self) -> Result<(), AppError> {
        self.client.clone().close().await.map_err(AppError::browser)
    }
}
