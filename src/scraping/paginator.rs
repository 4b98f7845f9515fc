use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{Item, Section};
use crate::scraping::sites::SiteAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagerState {
    /// Section opened, first page not read yet.
    Opened,
    /// At least one page read; the next read first follows "next".
    Reading,
    Exhausted,
}

/// Forward-only walk over the pages of one section.
///
/// Each [`next_page`](Self::next_page) call leaves the browser on the page it
/// returned, so callers can run further checks on that page before advancing.
pub struct SectionPaginator<'a> {
    site: &'a mut dyn SiteAdapter,
    section: Section,
    page: u32,
    state: PagerState,
}

impl<'a> SectionPaginator<'a> {
    pub async fn open(site: &'a mut dyn SiteAdapter, section: Section) -> Result<Self, AppError> {
        info!("Opening section {}", section);
        site.navigate_to_section(section).await?;
        Ok(Self {
            site,
            section,
            page: 0,
            state: PagerState::Opened,
        })
    }

    pub fn page_number(&self) -> u32 {
        self.page
    }

    pub fn site(&mut self) -> &mut dyn SiteAdapter {
        &mut *self.site
    }

    /// Items of the next page, or `None` once a page is empty or no "next" exists.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Item>>, AppError> {
        match self.state {
            PagerState::Exhausted => return Ok(None),
            PagerState::Opened => self.state = PagerState::Reading,
            PagerState::Reading => {
                if !self.site.has_next_page().await? {
                    info!("No next page after page {} of {}", self.page, self.section);
                    self.state = PagerState::Exhausted;
                    return Ok(None);
                }
                debug!("Advancing past page {} of {}", self.page, self.section);
                self.site.go_next_page().await?;
            }
        }

        self.page += 1;
        let items = self.site.list_current_page_items().await?;
        if items.is_empty() {
            info!("Page {} of {} is empty", self.page, self.section);
            self.state = PagerState::Exhausted;
            return Ok(None);
        }

        info!(
            "Found {} item(s) on page {} of {}",
            items.len(),
            self.page,
            self.section
        );
        Ok(Some(items))
    }
}
