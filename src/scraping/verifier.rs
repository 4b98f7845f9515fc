use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ScrollConfig;
use crate::error::AppError;
use crate::models::{is_absolute_url, Item, Section};
use crate::scraping::sites::SiteAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    Resolved,
    /// Absolute, but points at a known-empty image.
    Placeholder,
    /// Missing or relative.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub items: Vec<Item>,
    pub unresolved: usize,
}

/// Forces lazily loaded covers in by scrolling, then re-reads the page.
#[derive(Debug, Clone)]
pub struct LazyContentVerifier {
    step_px: i64,
    pause: Duration,
    max_scroll_attempts: usize,
    /// Scroll-and-resample passes after the first one before unresolved covers are accepted as-is.
    accept_partial_after_n_retries: usize,
    placeholder_patterns: Vec<String>,
}

impl LazyContentVerifier {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            step_px: config.step_px,
            pause: Duration::from_millis(config.pause_ms),
            max_scroll_attempts: config.max_attempts,
            accept_partial_after_n_retries: config.retry_passes,
            placeholder_patterns: config.placeholder_patterns.clone(),
        }
    }

    pub fn classify(&self, cover: Option<&str>) -> CoverState {
        match cover.map(str::trim) {
            Some(url) if is_absolute_url(url) => {
                let lowered = url.to_lowercase();
                if self
                    .placeholder_patterns
                    .iter()
                    .any(|pattern| lowered.contains(&pattern.to_lowercase()))
                {
                    CoverState::Placeholder
                } else {
                    CoverState::Resolved
                }
            }
            _ => CoverState::Unresolved,
        }
    }

    pub fn count_unresolved(&self, items: &[Item]) -> usize {
        items
            .iter()
            .filter(|item| self.classify(item.resource_ref.as_deref()) == CoverState::Unresolved)
            .count()
    }

    /// Never fails on covers that stay unresolved: they are kept with their last
    /// observed value and counted. Errors come only from the browser itself.
    pub async fn verify_and_complete(
        &self,
        site: &mut dyn SiteAdapter,
        section: Section,
        items_in_dom: Vec<Item>,
    ) -> Result<Verification, AppError> {
        let steps = self.scroll_until_settled(site).await?;
        let mut items = merge_samples(items_in_dom, site.list_current_page_items().await?);
        let mut unresolved = self.count_unresolved(&items);

        let mut retry = 0;
        while unresolved > 0 && retry < self.accept_partial_after_n_retries {
            retry += 1;
            debug!(
                "{} unresolved cover(s) in {}, scrolling again ({} step(s))",
                unresolved, section, steps
            );
            self.scroll_steps(site, steps).await?;
            items = merge_samples(items, site.list_current_page_items().await?);
            unresolved = self.count_unresolved(&items);
        }

        let placeholders = items
            .iter()
            .filter(|item| self.classify(item.resource_ref.as_deref()) == CoverState::Placeholder)
            .count();
        if placeholders > 0 {
            debug!("{} placeholder cover(s) in {}", placeholders, section);
        }
        if unresolved > 0 {
            warn!(
                "Accepting {} unresolved cover(s) in {} after {} retry pass(es)",
                unresolved, section, retry
            );
        } else {
            info!("All covers in {} resolved", section);
        }

        Ok(Verification { items, unresolved })
    }

    /// Scrolls until the document stops growing at the bottom or the budget runs out.
    /// Returns the number of steps taken.
    async fn scroll_until_settled(&self, site: &mut dyn SiteAdapter) -> Result<usize, AppError> {
        let mut previous = site.scroll_metrics().await?;
        let mut steps = 0;

        while steps < self.max_scroll_attempts {
            site.scroll_by(self.step_px).await?;
            tokio::time::sleep(self.pause).await;
            steps += 1;

            let current = site.scroll_metrics().await?;
            if current.scroll_height == previous.scroll_height && current.at_bottom() {
                debug!("Page settled after {} scroll step(s)", steps);
                return Ok(steps);
            }
            previous = current;
        }

        warn!(
            "Scroll budget of {} step(s) exhausted before the page settled",
            self.max_scroll_attempts
        );
        Ok(steps)
    }

    async fn scroll_steps(&self, site: &mut dyn SiteAdapter, steps: usize) -> Result<(), AppError> {
        for _ in 0..steps {
            site.scroll_by(self.step_px).await?;
            tokio::time::sleep(self.pause).await;
        }
        Ok(())
    }
}

/// Later samples win position by position; positions a shorter sample misses keep
/// their earlier value so nothing is dropped.
fn merge_samples(previous: Vec<Item>, sampled: Vec<Item>) -> Vec<Item> {
    if sampled.len() >= previous.len() {
        return sampled;
    }
    let mut merged = sampled;
    let start = merged.len();
    merged.extend(previous.into_iter().skip(start));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> LazyContentVerifier {
        LazyContentVerifier::new(&ScrollConfig::default())
    }

    #[test]
    fn classification_follows_url_shape() {
        let v = verifier();
        assert_eq!(v.classify(Some("https://cdn.x/covers/1.jpg")), CoverState::Resolved);
        assert_eq!(
            v.classify(Some("https://cdn.x/img/placeholder.png")),
            CoverState::Placeholder
        );
        assert_eq!(v.classify(Some("/covers/1.jpg")), CoverState::Unresolved);
        assert_eq!(v.classify(Some("")), CoverState::Unresolved);
        assert_eq!(v.classify(None), CoverState::Unresolved);
    }

    #[test]
    fn shorter_sample_keeps_trailing_items() {
        let previous = vec![
            Item::new("A", "1", None),
            Item::new("B", "2", None),
            Item::new("C", "3", Some("c.jpg")),
        ];
        let sampled = vec![Item::new("A", "1", Some("https://x/a.jpg"))];

        let merged = merge_samples(previous, sampled);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].resource_ref.as_deref(), Some("https://x/a.jpg"));
        assert_eq!(merged[2].resource_ref.as_deref(), Some("c.jpg"));
    }
}
