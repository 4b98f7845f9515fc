use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{snapshot_items, InventorySummary, ItemSelectors, SiteAdapter};
use crate::config::BrowserConfig;
use crate::error::AppError;
use crate::models::{Credential, Item, Section};
use crate::scraping::login::{self, LoginForm, LoginOutcome};
use crate::scraping::{scroll_metrics, PageDriver, ScrollMetrics, WaitState};

pub const BASE_URL: &str = "https://helion.pl";

const ACCOUNT_URL: &str = "https://helion.pl/users";
const ACCOUNT_PATH: &str = "/users";
const LIBRARY_LINKS: &str = "a[href^=\"/users/konto/biblioteka/\"]";
const PAGE_SIZE: u32 = 100;

/// The counters endpoint reads all zeros for a while after a fresh login.
const INVENTORY_ATTEMPTS: usize = 30;
const INVENTORY_RETRY_DELAY: Duration = Duration::from_secs(1);

const LOGIN_FORM: LoginForm = LoginForm {
    url: "https://helion.pl/users/login",
    cookie_decline: Some("button#CybotCookiebotDialogBodyButtonDecline"),
    identity_field: "input[name=\"email\"]",
    secret_field: "input[name=\"password\"]",
    submit: "#log_in_submit",
    form_path: "/users/login",
};

const ITEMS: ItemSelectors = ItemSelectors {
    item: "ul#listBooks li",
    title: "h3.title",
    author: "p.author",
    cover: "img",
};

/// Fetches the counters with the session cookies of the current page.
const USER_INFO_JS: &str = r#"
const done = arguments[arguments.length - 1];
fetch('/api/users/info', { credentials: 'include' })
    .then((resp) => resp.ok ? resp.json() : null)
    .then((body) => done(body))
    .catch(() => done(null));
"#;

const PAGE_LINKS_JS: &str = r#"
return Array.from(document.querySelectorAll(arguments[0])).map((a) => a.getAttribute('href') || '');
"#;

const SECTIONS: &[Section] = &[Section::Ebooks, Section::Audiobooks, Section::Courses];

/// Library split into per-section URLs with numbered pages.
pub struct Helion {
    driver: Box<dyn PageDriver>,
    marker_timeout: Duration,
    section_url: Option<&'static str>,
    current_page: u32,
    last_page: u32,
}

impl Helion {
    pub fn new(driver: Box<dyn PageDriver>, config: &BrowserConfig) -> Self {
        Self {
            driver,
            marker_timeout: config.marker_timeout(),
            section_url: None,
            current_page: 0,
            last_page: 0,
        }
    }

    fn section_url(section: Section) -> &'static str {
        match section {
            Section::Ebooks => "https://helion.pl/users/konto/biblioteka/ebooki",
            Section::Audiobooks => "https://helion.pl/users/konto/biblioteka/audiobooki",
            Section::Courses => "https://helion.pl/users/konto/biblioteka/kursy",
        }
    }

    fn page_url(section_url: &str, page: u32) -> String {
        format!("{section_url}?onPage={PAGE_SIZE}&page={page}")
    }

    async fn open_page(&self, section_url: &str, page: u32) -> Result<(), AppError> {
        let url = Self::page_url(section_url, page);
        debug!("Opening {}", url);
        self.driver.goto(&url).await?;
        if let Err(e) = self
            .driver
            .wait_for(ITEMS.item, WaitState::Attached, self.marker_timeout)
            .await
        {
            debug!("No items rendered on {}: {}", url, e);
        }
        Ok(())
    }

    async fn read_last_page(&self) -> Result<u32, AppError> {
        let hrefs = self
            .driver
            .evaluate(PAGE_LINKS_JS, vec![Value::from(LIBRARY_LINKS)])
            .await?;
        let hrefs: Vec<String> = serde_json::from_value(hrefs)?;
        Ok(last_page_number(&hrefs))
    }
}

/// Highest `page=N` among pagination links; 1 when the listing has no pager.
pub fn last_page_number(hrefs: &[String]) -> u32 {
    let Ok(pattern) = regex::Regex::new(r"[?&]page=(\d+)") else {
        return 1;
    };
    hrefs
        .iter()
        .filter_map(|href| pattern.captures(href))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Reads the `biblioteka` counters, either a positional list or a keyed object.
pub fn parse_library_counters(body: &Value) -> Option<InventorySummary> {
    let library = body.get("biblioteka")?;
    let count = |value: Option<&Value>| value.and_then(Value::as_u64).unwrap_or(0);

    let by_section = match library {
        Value::Array(values) if values.len() >= 4 => BTreeMap::from([
            (Section::Ebooks, count(values.first())),
            (Section::Audiobooks, count(values.get(1))),
            (Section::Courses, count(values.get(2))),
        ]),
        Value::Object(map) => BTreeMap::from([
            (Section::Ebooks, count(map.get("ebooks"))),
            (Section::Audiobooks, count(map.get("audiobooks"))),
            (Section::Courses, count(map.get("courses"))),
        ]),
        _ => return None,
    };
    Some(InventorySummary::from_sections(by_section))
}

#[async_trait]
impl SiteAdapter for Helion {
    fn name(&self) -> &'static str {
        "helion"
    }

    fn sections(&self) -> &'static [Section] {
        SECTIONS
    }

    fn defers_covers(&self, _section: Section) -> bool {
        false
    }

    async fn login(&mut self, credential: &Credential) -> LoginOutcome {
        login::login(
            self.driver.as_ref(),
            &LOGIN_FORM,
            credential,
            self.marker_timeout,
        )
        .await
    }

    async fn dismiss_terms_dialog(&mut self) {}

    async fn inventory(&mut self) -> Result<InventorySummary, AppError> {
        if !self.driver.current_url().await?.contains(ACCOUNT_PATH) {
            self.driver.goto(ACCOUNT_URL).await?;
        }

        let mut last = InventorySummary::default();
        for attempt in 1..=INVENTORY_ATTEMPTS {
            match self.driver.evaluate_async(USER_INFO_JS, vec![]).await {
                Ok(body) => match parse_library_counters(&body) {
                    Some(summary) if summary.total > 0 => {
                        info!("Library counters: {:?}", summary.by_section);
                        return Ok(summary);
                    }
                    Some(summary) => {
                        debug!("Library counters still zero (attempt {})", attempt);
                        last = summary;
                    }
                    None => warn!("Unexpected library counters payload (attempt {})", attempt),
                },
                Err(e) => warn!("Library counters request failed (attempt {}): {}", attempt, e),
            }
            if attempt < INVENTORY_ATTEMPTS {
                tokio::time::sleep(INVENTORY_RETRY_DELAY).await;
            }
        }
        Ok(last)
    }

    async fn navigate_to_section(&mut self, section: Section) -> Result<(), AppError> {
        let section_url = Self::section_url(section);
        self.open_page(section_url, 1).await?;
        self.last_page = self.read_last_page().await?;
        self.current_page = 1;
        self.section_url = Some(section_url);
        info!("{} spans {} page(s)", section, self.last_page);
        Ok(())
    }

    async fn list_current_page_items(&mut self) -> Result<Vec<Item>, AppError> {
        snapshot_items(self.driver.as_ref(), &ITEMS).await
    }

    async fn has_next_page(&mut self) -> Result<bool, AppError> {
        Ok(self.section_url.is_some() && self.current_page < self.last_page)
    }

    async fn go_next_page(&mut self) -> Result<(), AppError> {
        let section_url = self
            .section_url
            .ok_or_else(|| AppError::BrowserError("no section is open".into()))?;
        let next = self.current_page + 1;
        self.open_page(section_url, next).await?;
        self.current_page = next;
        Ok(())
    }

    async fn scroll_by(&mut self, px: i64) -> Result<(), AppError> {
        self.driver.scroll_by(px).await
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, AppError> {
        scroll_metrics(self.driver.as_ref()).await
    }

    async fn close(&mut self) -> Result<(), AppError> {
        self.driver.close().await
    }
}
