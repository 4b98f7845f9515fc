use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{parse_counter, snapshot_items, InventorySummary, ItemSelectors, SiteAdapter};
use crate::config::BrowserConfig;
use crate::error::AppError;
use crate::models::{Credential, Item, Section};
use crate::scraping::login::{self, LoginForm, LoginOutcome, TermsDialog};
use crate::scraping::{scroll_metrics, PageDriver, ScrollMetrics, WaitState};

pub const BASE_URL: &str = "https://woblink.com";

const DASHBOARD_URL: &str = "https://woblink.com/account/dashboard";
const SHELF_URL: &str = "https://woblink.com/account/moja-polka";
const SHELF_PATH: &str = "/account/moja-polka";

const LOGIN_FORM: LoginForm = LoginForm {
    url: "https://woblink.com/logowanie",
    cookie_decline: Some("button#CybotCookiebotDialogBodyButtonDecline"),
    identity_field: "input[name=\"_username\"]",
    secret_field: "input[name=\"_password\"]",
    submit: "#login-form-submit",
    form_path: "/logowanie",
};

const TERMS_DIALOG: TermsDialog = TermsDialog {
    container: "#nw_popup_regulations",
    accept_checkbox: Some("#nw_popup_regulations_checkbox + span.checkmark"),
    confirm: "#nw_popup_regulations_button",
};

const PURCHASE_COUNTER: &str = ".user-page__tile.user-page__tile--shelf h3";
const TAB_MENU_ITEMS: &str =
    ".user-page__shelflist_filters > .user-page__shelflist_filters-menu li";
const LOADER: &str = "div.loader";
const NEXT_PAGE: &str = "section.user-page__pagination li.user-page__pagination_dot--next";

const ITEMS: ItemSelectors = ItemSelectors {
    item: "section.user-page__shelflist .shelflist-item",
    title: "h3.shelflist-item__title",
    author: "p.shelflist-item__author",
    cover: "img",
};

/// Clicks the first menu entry whose text contains `arguments[1]`, ignoring case.
/// Tabs may carry a count badge next to the label.
const CLICK_TAB_JS: &str = r#"
const [itemSel, label] = arguments;
const wanted = label.toLowerCase();
const tab = Array.from(document.querySelectorAll(itemSel))
    .find((node) => node.innerText.trim().toLowerCase().includes(wanted));
if (!tab) { return false; }
tab.click();
return true;
"#;

const SECTIONS: &[Section] = &[Section::Ebooks, Section::Audiobooks];

/// Shelf with tab filters, a loader overlay and a forward-only "next" dot.
pub struct Woblink {
    driver: Box<dyn PageDriver>,
    page_timeout: Duration,
    loader_timeout: Duration,
    marker_timeout: Duration,
}

impl Woblink {
    pub fn new(driver: Box<dyn PageDriver>, config: &BrowserConfig) -> Self {
        Self {
            driver,
            page_timeout: config.page_timeout(),
            loader_timeout: config.loader_timeout(),
            marker_timeout: config.marker_timeout(),
        }
    }

    fn tab_label(section: Section) -> &'static str {
        match section {
            Section::Ebooks => "EBooki",
            Section::Audiobooks => "Audiobooki",
            Section::Courses => "Kursy",
        }
    }

    /// The loader may flash faster than a poll, so only its disappearance is bounded hard.
    async fn await_loader_cycle(&self) -> Result<(), AppError> {
        if let Err(e) = self
            .driver
            .wait_for(LOADER, WaitState::Visible, self.marker_timeout)
            .await
        {
            debug!("Loader not observed before hiding: {}", e);
        }
        self.driver
            .wait_for(LOADER, WaitState::Hidden, self.loader_timeout)
            .await
    }

    async fn open_shelf(&self) -> Result<(), AppError> {
        if !self.driver.current_url().await?.contains(SHELF_PATH) {
            info!("Opening shelf {}", SHELF_URL);
            self.driver.goto(SHELF_URL).await?;
            self.await_loader_cycle().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for Woblink {
    fn name(&self) -> &'static str {
        "woblink"
    }

    fn sections(&self) -> &'static [Section] {
        SECTIONS
    }

    fn defers_covers(&self, _section: Section) -> bool {
        true
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

    async fn dismiss_terms_dialog(&mut self) {
        login::dismiss_terms_dialog(self.driver.as_ref(), &TERMS_DIALOG, self.marker_timeout).await
    }

    async fn inventory(&mut self) -> Result<InventorySummary, AppError> {
        self.driver.goto(DASHBOARD_URL).await?;
        self.driver
            .wait_for(PURCHASE_COUNTER, WaitState::Attached, self.marker_timeout)
            .await?;

        let label = self
            .driver
            .text(PURCHASE_COUNTER)
            .await?
            .unwrap_or_default();
        let total = parse_counter(&label).ok_or_else(|| {
            AppError::BrowserError(format!("unreadable purchase counter '{label}'"))
        })?;
        Ok(InventorySummary::total(total))
    }

    async fn navigate_to_section(&mut self, section: Section) -> Result<(), AppError> {
        self.open_shelf().await?;

        self.driver
            .wait_for(TAB_MENU_ITEMS, WaitState::Attached, self.page_timeout)
            .await?;
        let label = Self::tab_label(section);
        let clicked = self
            .driver
            .evaluate(
                CLICK_TAB_JS,
                vec![Value::from(TAB_MENU_ITEMS), Value::from(label)],
            )
            .await?;
        if clicked != Value::Bool(true) {
            return Err(AppError::BrowserError(format!(
                "no shelf tab labelled '{label}'"
            )));
        }

        self.await_loader_cycle().await
    }

    async fn list_current_page_items(&mut self) -> Result<Vec<Item>, AppError> {
        snapshot_items(self.driver.as_ref(), &ITEMS).await
    }

    async fn has_next_page(&mut self) -> Result<bool, AppError> {
        self.driver.exists(NEXT_PAGE).await
    }

    async fn go_next_page(&mut self) -> Result<(), AppError> {
        self.driver.click(NEXT_PAGE).await?;
        self.await_loader_cycle().await
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
