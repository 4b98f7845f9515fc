//! Browser-side work: the page capability, login, paging and cover checks.

pub mod browser;
pub mod login;
pub mod paginator;
pub mod sites;
pub mod verifier;


use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;

/// Element states a bounded wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Present in the DOM.
    Attached,
    /// Present and displayed.
    Visible,
    /// Absent or not displayed.
    Hidden,
    /// Absent from the DOM.
    Detached,
}

/// Viewport bottom and total document height, both in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
    pub viewport_bottom: i64,
    pub scroll_height: i64,
}

impl ScrollMetrics {
    pub fn at_bottom(&self) -> bool {
        self.viewport_bottom >= self.scroll_height
    }
}

/// Page primitives a browser session offers. Site adapters are written against
/// this and never see the WebDriver client directly.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), AppError>;

    async fn current_url(&self) -> Result<String, AppError>;

    async fn exists(&self, selector: &str) -> Result<bool, AppError>;

    /// Trimmed text of the first match.
    async fn text(&self, selector: &str) -> Result<Option<String>, AppError>;

    async fn click(&self, selector: &str) -> Result<(), AppError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), AppError>;

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), AppError>;

    async fn scroll_by(&self, px: i64) -> Result<(), AppError>;

    /// Runs a synchronous script; `arguments[i]` binds `args[i]`.
    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, AppError>;

    /// Runs a script that reports through its trailing callback argument.
    async fn evaluate_async(&self, script: &str, args: Vec<Value>) -> Result<Value, AppError>;

    async fn close(&self) -> Result<(), AppError>;
}

const SCROLL_METRICS_JS: &str = "return [Math.ceil(window.scrollY + window.innerHeight), \
     document.documentElement.scrollHeight];";

pub async fn scroll_metrics(driver: &dyn PageDriver) -> Result<ScrollMetrics, AppError> {
    let value = driver.evaluate(SCROLL_METRICS_JS, vec![]).await?;
    let pair = value.as_array().ok_or_else(|| {
        AppError::BrowserError(format!("unexpected scroll metrics payload: {value}"))
    })?;

    let read = |index: usize| pair.get(index).and_then(Value::as_i64).unwrap_or(0);
    Ok(ScrollMetrics {
        viewport_bottom: read(0),
        scroll_height: read(1),
    })
}
