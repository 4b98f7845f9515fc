//! Scripted stand-ins for a browser session.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Credential, Item, Section};
use crate::scraping::login::LoginOutcome;
use crate::scraping::sites::{InventorySummary, SiteAdapter};
use crate::scraping::{PageDriver, ScrollMetrics, WaitState};

pub const VIEWPORT: i64 = 800;

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().map(|calls| calls.clone()).unwrap_or_default()
}

pub fn item(n: usize, cover: Option<&str>) -> Item {
    Item::new(format!("Author {}", n), format!("Title {}", n), cover)
}

/// A site whose pages, counters and scroll behaviour are fixed up front.
///
/// The first read of a page returns the scripted page. Later reads of the same
/// page pop from `samples`; the last sample repeats once the queue is drained.
pub struct StubSite {
    log: CallLog,
    login: LoginOutcome,
    inventory: Option<InventorySummary>,
    sections: &'static [Section],
    defers_covers: bool,
    pages: BTreeMap<Section, Vec<Vec<Item>>>,
    samples: VecDeque<Vec<Item>>,
    failing_page: Option<(Section, usize)>,
    current: Option<Section>,
    page_index: usize,
    reads_on_page: usize,
    scroll_y: i64,
    page_height: i64,
    grows_forever: bool,
}

impl StubSite {
    pub fn new(sections: &'static [Section]) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            login: LoginOutcome::Success,
            inventory: Some(InventorySummary::total(1)),
            sections,
            defers_covers: false,
            pages: BTreeMap::new(),
            samples: VecDeque::new(),
            failing_page: None,
            current: None,
            page_index: 0,
            reads_on_page: 0,
            scroll_y: 0,
            page_height: VIEWPORT,
            grows_forever: false,
        }
    }

    pub fn with_pages(mut self, section: Section, pages: Vec<Vec<Item>>) -> Self {
        self.pages.insert(section, pages);
        self
    }

    /// `None` makes the counter read fail.
    pub fn with_inventory(mut self, inventory: Option<InventorySummary>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_login(mut self, outcome: LoginOutcome) -> Self {
        self.login = outcome;
        self
    }

    pub fn with_samples(mut self, samples: Vec<Vec<Item>>) -> Self {
        self.samples = samples.into();
        self
    }

    pub fn with_page_height(mut self, height: i64) -> Self {
        self.page_height = height;
        self
    }

    pub fn deferring_covers(mut self) -> Self {
        self.defers_covers = true;
        self
    }

    pub fn growing_forever(mut self) -> Self {
        self.grows_forever = true;
        self
    }

    /// Reading this 1-based page of the section fails with a timeout.
    pub fn failing_on(mut self, section: Section, page: usize) -> Self {
        self.failing_page = Some((section, page));
        self
    }

    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.log.lock() {
            calls.push(call);
        }
    }

    fn section_pages(&self) -> &[Vec<Item>] {
        self.current
            .and_then(|section| self.pages.get(&section))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn enter_page(&mut self, index: usize) {
        self.page_index = index;
        self.reads_on_page = 0;
        self.scroll_y = 0;
    }
}

#[async_trait]
impl SiteAdapter for StubSite {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn sections(&self) -> &'static [Section] {
        self.sections
    }

    fn defers_covers(&self, _section: Section) -> bool {
        self.defers_covers
    }

    async fn login(&mut self, credential: &Credential) -> LoginOutcome {
        self.record(format!("login:{}", credential.identity));
        self.login.clone()
    }

    async fn dismiss_terms_dialog(&mut self) {
        self.record("terms".to_string());
    }

    async fn inventory(&mut self) -> Result<InventorySummary, AppError> {
        self.record("inventory".to_string());
        self.inventory
            .clone()
            .ok_or_else(|| AppError::timeout("purchase counter", Duration::from_secs(1)))
    }

    async fn navigate_to_section(&mut self, section: Section) -> Result<(), AppError> {
        self.record(format!("open:{}", section));
        self.current = Some(section);
        self.enter_page(0);
        Ok(())
    }

    async fn list_current_page_items(&mut self) -> Result<Vec<Item>, AppError> {
        let section = self
            .current
            .ok_or_else(|| AppError::browser("no section open"))?;
        let page = self.page_index + 1;
        self.record(format!("list:{}:{}", section, page));

        if self.failing_page == Some((section, page)) {
            return Err(AppError::timeout("loading indicator", Duration::from_secs(1)));
        }

        self.reads_on_page += 1;
        if self.reads_on_page > 1 {
            let sample = if self.samples.len() > 1 {
                self.samples.pop_front()
            } else {
                self.samples.front().cloned()
            };
            if let Some(sample) = sample {
                return Ok(sample);
            }
        }
        Ok(self
            .section_pages()
            .get(self.page_index)
            .cloned()
            .unwrap_or_default())
    }

    async fn has_next_page(&mut self) -> Result<bool, AppError> {
        Ok(self.page_index + 1 < self.section_pages().len())
    }

    async fn go_next_page(&mut self) -> Result<(), AppError> {
        let next = self.page_index + 1;
        self.record(format!("next:{}", next + 1));
        self.enter_page(next);
        Ok(())
    }

    async fn scroll_by(&mut self, px: i64) -> Result<(), AppError> {
        if self.grows_forever {
            self.page_height += px;
        }
        let max_y = (self.page_height - VIEWPORT).max(0);
        self.scroll_y = (self.scroll_y + px).min(max_y);
        Ok(())
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, AppError> {
        Ok(ScrollMetrics {
            viewport_bottom: self.scroll_y + VIEWPORT,
            scroll_height: self.page_height,
        })
    }

    async fn close(&mut self) -> Result<(), AppError> {
        self.record("close".to_string());
        Ok(())
    }
}

type Responder = Box<dyn Fn(&str, &[Value]) -> Result<Value, AppError> + Send + Sync>;

/// A page driver for exercising real site adapters without a browser.
///
/// Navigation and clicks are logged as `goto:<url>`, `click:<selector>`,
/// `wait:<selector>:<state>`, `exists:<selector>` and `evaluate_async`.
/// Waits succeed unless listed in `failing_waits`; `exists` pops scripted
/// answers and reports `false` once they run out.
pub struct ScriptedPage {
    log: CallLog,
    url: Mutex<String>,
    failing_waits: Vec<(String, WaitState)>,
    evaluate: Responder,
    async_answers: Mutex<VecDeque<Result<Value, AppError>>>,
    exists: Mutex<VecDeque<bool>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            url: Mutex::new(String::new()),
            failing_waits: Vec::new(),
            evaluate: Box::new(|_, _| Ok(Value::Null)),
            async_answers: Mutex::new(VecDeque::new()),
            exists: Mutex::new(VecDeque::new()),
        }
    }

    pub fn at(self, url: &str) -> Self {
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
        self
    }

    /// Waiting for `selector` to reach `state` times out.
    pub fn failing_wait(mut self, selector: &str, state: WaitState) -> Self {
        self.failing_waits.push((selector.to_string(), state));
        self
    }

    /// Answers every synchronous script from the script text and its arguments.
    pub fn on_evaluate(
        mut self,
        responder: impl Fn(&str, &[Value]) -> Result<Value, AppError> + Send + Sync + 'static,
    ) -> Self {
        self.evaluate = Box::new(responder);
        self
    }

    /// Answers for successive async scripts; `null` once drained.
    pub fn with_async_answers(self, answers: Vec<Result<Value, AppError>>) -> Self {
        if let Ok(mut queue) = self.async_answers.lock() {
            queue.extend(answers);
        }
        self
    }

    pub fn with_exists(self, answers: &[bool]) -> Self {
        if let Ok(mut queue) = self.exists.lock() {
            queue.extend(answers.iter().copied());
        }
        self
    }

    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.log.lock() {
            calls.push(call);
        }
    }
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<(), AppError> {
        self.record(format!("goto:{}", url));
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        Ok(self.url.lock().map(|url| url.clone()).unwrap_or_default())
    }

    async fn exists(&self, selector: &str) -> Result<bool, AppError> {
        self.record(format!("exists:{}", selector));
        Ok(self
            .exists
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(false))
    }

    async fn text(&self, _selector: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        self.record(format!("click:{}", selector));
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), AppError> {
        self.record(format!("wait:{}:{:?}", selector, state));
        let fails = self
            .failing_waits
            .iter()
            .any(|(failing, failing_state)| failing == selector && *failing_state == state);
        if fails {
            return Err(AppError::timeout(selector, timeout));
        }
        Ok(())
    }

    async fn scroll_by(&self, _px: i64) -> Result<(), AppError> {
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, AppError> {
        (self.evaluate)(script, &args)
    }

    async fn evaluate_async(&self, _script: &str, _args: Vec<Value>) -> Result<Value, AppError> {
        self.record("evaluate_async".to_string());
        self.async_answers
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(Ok(Value::Null))
    }

    async fn close(&self) -> Result<(), AppError> {
        self.record("close".to_string());
        Ok(())
    }
}
