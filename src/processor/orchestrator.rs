use std::path::PathBuf;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::AppError;
use crate::models::{AccountRecord, Credential, Item, Section, SectionResult};
use crate::processor::checkpoint::CheckpointStore;
use crate::scraping::login::LoginOutcome;
use crate::scraping::paginator::SectionPaginator;
use crate::scraping::sites::SiteAdapter;
use crate::scraping::verifier::LazyContentVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    NotStarted,
    LoggingIn,
    Authenticated,
    Extracting(Section),
    Assembling,
    Persisted,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorPolicy {
    /// A zero purchase counter persists an empty record without opening the shelf.
    pub skip_if_zero_inventory: bool,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            skip_if_zero_inventory: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReport {
    pub path: PathBuf,
    pub items: usize,
    pub unresolved_covers: usize,
    pub integrity_violations: usize,
}

struct SectionExtraction {
    items: Vec<Item>,
    unresolved: usize,
}

/// Runs one account from login to a persisted checkpoint.
pub struct AccountOrchestrator<'a> {
    store: &'a CheckpointStore,
    verifier: &'a LazyContentVerifier,
    policy: OrchestratorPolicy,
    state: AccountState,
}

impl<'a> AccountOrchestrator<'a> {
    pub fn new(
        store: &'a CheckpointStore,
        verifier: &'a LazyContentVerifier,
        policy: OrchestratorPolicy,
    ) -> Self {
        Self {
            store,
            verifier,
            policy,
            state: AccountState::NotStarted,
        }
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    fn transition(&mut self, next: AccountState) {
        debug!("Account state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// No checkpoint is written unless the run reaches `Persisted`.
    pub async fn run(
        &mut self,
        credential: &Credential,
        site: &mut dyn SiteAdapter,
    ) -> Result<AccountReport, AppError> {
        let result = self.drive(credential, site).await;
        if let Err(e) = &result {
            self.transition(AccountState::Failed(e.to_string()));
        }
        result
    }

    async fn drive(
        &mut self,
        credential: &Credential,
        site: &mut dyn SiteAdapter,
    ) -> Result<AccountReport, AppError> {
        self.transition(AccountState::LoggingIn);
        if let LoginOutcome::Failure(reason) = site.login(credential).await {
            return Err(AppError::SessionError(reason.to_string()));
        }

        self.transition(AccountState::Authenticated);
        site.dismiss_terms_dialog().await;

        let inventory = match site.inventory().await {
            Ok(summary) => {
                info!("Purchased items on {}: {}", site.name(), summary.total);
                Some(summary)
            }
            Err(e) => {
                warn!("Could not read purchase counters, visiting every section: {}", e);
                None
            }
        };

        let mut record = AccountRecord::new(credential.clone());
        let mut unresolved_covers = 0;

        let owns_nothing = inventory.as_ref().is_some_and(|summary| summary.total == 0);
        if self.policy.skip_if_zero_inventory && owns_nothing {
            warn!("Account owns no items, skipping the shelf");
        } else {
            for &section in site.sections() {
                if !inventory
                    .as_ref()
                    .map_or(true, |summary| summary.may_contain(section))
                {
                    info!("Counter for {} is zero, skipping section", section);
                    continue;
                }

                self.transition(AccountState::Extracting(section));
                let extraction = self
                    .extract_section(site, section)
                    .instrument(info_span!("section", %section))
                    .await;
                unresolved_covers += extraction.unresolved;
                record.insert(SectionResult::new(section, extraction.items));
            }
        }

        self.transition(AccountState::Assembling);
        for section in Section::ALL {
            if !record.sections.contains_key(&section) {
                record.insert(SectionResult::empty(section));
            }
        }

        let path = self.store.write(&record)?;
        self.transition(AccountState::Persisted);

        let integrity_violations = record.integrity_violations();
        if integrity_violations > 0 {
            warn!(
                "Checkpoint {} is incomplete: {} cover(s) are not absolute URLs",
                path.display(),
                integrity_violations
            );
        }
        info!(
            "Saved {} item(s) for {} to {}",
            record.total_items(),
            credential.identity,
            path.display()
        );

        Ok(AccountReport {
            path,
            items: record.total_items(),
            unresolved_covers,
            integrity_violations,
        })
    }

    /// Errors stop the section but keep whatever was collected before them.
    async fn extract_section(
        &self,
        site: &mut dyn SiteAdapter,
        section: Section,
    ) -> SectionExtraction {
        let mut extraction = SectionExtraction {
            items: Vec::new(),
            unresolved: 0,
        };
        match self.walk_section(site, section, &mut extraction).await {
            Ok(()) => info!("Found {} item(s) in {}", extraction.items.len(), section),
            Err(e) => warn!(
                "Section {} stopped early, keeping {} item(s): {}",
                section,
                extraction.items.len(),
                e
            ),
        }
        extraction
    }

    async fn walk_section(
        &self,
        site: &mut dyn SiteAdapter,
        section: Section,
        extraction: &mut SectionExtraction,
    ) -> Result<(), AppError> {
        let verify_covers = site.defers_covers(section);
        let mut pager = SectionPaginator::open(site, section).await?;

        while let Some(page_items) = pager.next_page().await? {
            if !verify_covers {
                extraction.items.extend(page_items);
                continue;
            }

            match self
                .verifier
                .verify_and_complete(pager.site(), section, page_items.clone())
                .await
            {
                Ok(verification) => {
                    extraction.unresolved += verification.unresolved;
                    extraction.items.extend(verification.items);
                }
                Err(e) => {
                    warn!(
                        "Cover check failed on page {}, keeping first read: {}",
                        pager.page_number(),
                        e
                    );
                    extraction.unresolved += self.verifier.count_unresolved(&page_items);
                    extraction.items.extend(page_items);
                }
            }
        }
        Ok(())
    }
}
