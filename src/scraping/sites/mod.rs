//! One adapter per bookstore. The pipeline only talks to [`SiteAdapter`].

mod helion;
mod woblink;

pub use helion::Helion;
pub use woblink::Woblink;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::BrowserConfig;
use crate::error::AppError;
use crate::models::{Credential, Item, Section};
use crate::scraping::login::LoginOutcome;
use crate::scraping::{PageDriver, ScrollMetrics};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    #[default]
    Woblink,
    Helion,
}

impl SiteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteKind::Woblink => "woblink",
            SiteKind::Helion => "helion",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            SiteKind::Woblink => woblink::BASE_URL,
            SiteKind::Helion => helion::BASE_URL,
        }
    }

    pub fn open(
        &self,
        driver: Box<dyn PageDriver>,
        config: &BrowserConfig,
    ) -> Box<dyn SiteAdapter> {
        match self {
            SiteKind::Woblink => Box::new(Woblink::new(driver, config)),
            SiteKind::Helion => Box::new(Helion::new(driver, config)),
        }
    }
}

/// Purchased-item counters read from the account summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub total: u64,
    /// Filled only by sites that report counts per section.
    pub by_section: BTreeMap<Section, u64>,
}

impl InventorySummary {
    pub fn total(total: u64) -> Self {
        Self {
            total,
            by_section: BTreeMap::new(),
        }
    }

    pub fn from_sections(by_section: BTreeMap<Section, u64>) -> Self {
        Self {
            total: by_section.values().sum(),
            by_section,
        }
    }

    /// `false` only when the site reported an explicit zero for the section.
    pub fn may_contain(&self, section: Section) -> bool {
        self.by_section.get(&section).map_or(true, |count| *count > 0)
    }
}

/// A logged-in browser session on one bookstore.
#[async_trait]
pub trait SiteAdapter: Send {
    fn name(&self) -> &'static str;

    /// Sections the site offers, in extraction order.
    fn sections(&self) -> &'static [Section];

    /// Whether covers in this section are filled in only after scrolling.
    fn defers_covers(&self, section: Section) -> bool;

    async fn login(&mut self, credential: &Credential) -> LoginOutcome;

    async fn dismiss_terms_dialog(&mut self);

    async fn inventory(&mut self) -> Result<InventorySummary, AppError>;

    /// Opens the section on its first page and waits for it to load.
    async fn navigate_to_section(&mut self, section: Section) -> Result<(), AppError>;

    async fn list_current_page_items(&mut self) -> Result<Vec<Item>, AppError>;

    async fn has_next_page(&mut self) -> Result<bool, AppError>;

    async fn go_next_page(&mut self) -> Result<(), AppError>;

    async fn scroll_by(&mut self, px: i64) -> Result<(), AppError>;

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, AppError>;

    async fn close(&mut self) -> Result<(), AppError>;
}

/// Selectors for one shelf listing, passed to [`ITEM_SNAPSHOT_JS`].
#[derive(Debug, Clone, Copy)]
pub struct ItemSelectors {
    pub item: &'static str,
    pub title: &'static str,
    pub author: &'static str,
    pub cover: &'static str,
}

impl ItemSelectors {
    fn as_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.item),
            Value::from(self.title),
            Value::from(self.author),
            Value::from(self.cover),
        ]
    }
}

/// Returns one `{title, author, cover}` object per item node; missing parts are null.
/// The raw `src` attribute is read on purpose so unresolved relative values stay visible.
pub const ITEM_SNAPSHOT_JS: &str = r#"
const [itemSel, titleSel, authorSel, coverSel] = arguments;
const text = (root, sel) => {
    const node = root.querySelector(sel);
    return node ? node.innerText.trim() : null;
};
return Array.from(document.querySelectorAll(itemSel)).map((node) => {
    const img = node.querySelector(coverSel);
    const cover = img ? (img.getAttribute('src') || img.getAttribute('data-src')) : null;
    return { title: text(node, titleSel), author: text(node, authorSel), cover: cover };
});
"#;

pub async fn snapshot_items(
    driver: &dyn PageDriver,
    selectors: &ItemSelectors,
) -> Result<Vec<Item>, AppError> {
    let value = driver
        .evaluate(ITEM_SNAPSHOT_JS, selectors.as_args())
        .await?;
    parse_item_snapshot(&value)
}

/// Missing title or author is logged and the item kept, so positions stay stable.
pub fn parse_item_snapshot(value: &Value) -> Result<Vec<Item>, AppError> {
    let entries = value.as_array().ok_or_else(|| {
        AppError::BrowserError(format!("item snapshot is not a list: {value}"))
    })?;

    let field = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
    };

    Ok(entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let title = field(entry, "title");
            let author = field(entry, "author");
            if title.is_none() || author.is_none() {
                warn!("Item at position {} is missing its title or author", position);
            }
            Item {
                author: author.unwrap_or_default(),
                title: title.unwrap_or_default(),
                resource_ref: field(entry, "cover").filter(|c| !c.is_empty()),
            }
        })
        .collect())
}

/// First run of digits in a counter label such as "12 produktów".
pub fn parse_counter(text: &str) -> Option<u64> {
    let digits = regex::Regex::new(r"\d[\d\s\u{a0}]*").ok()?;
    let found = digits.find(text)?;
    found
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}
