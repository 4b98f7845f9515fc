use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::BrowserConfig;
use crate::error::AppError;
use crate::models::Credential;
use crate::processor::checkpoint::{CheckpointStatus, CheckpointStore};
use crate::processor::orchestrator::{AccountOrchestrator, OrchestratorPolicy};
use crate::processor::progress_tracker::ProgressTracker;
use crate::scraping::browser::BrowserController;
use crate::scraping::sites::{SiteAdapter, SiteKind};
use crate::scraping::verifier::LazyContentVerifier;
use crate::shutdown::ShutdownManager;

/// Opens a fresh browser session per account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// An error here means no browser can be started at all and ends the run.
    async fn open(&self) -> Result<Box<dyn SiteAdapter>, AppError>;
}

pub struct BrowserSessionFactory {
    browser: BrowserConfig,
    site: SiteKind,
}

impl BrowserSessionFactory {
    pub fn new(browser: BrowserConfig, site: SiteKind) -> Self {
        Self { browser, site }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn open(&self) -> Result<Box<dyn SiteAdapter>, AppError> {
        let controller = BrowserController::connect(&self.browser).await?;
        Ok(self.site.open(Box::new(controller), &self.browser))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountOutcome {
    Processed,
    Skipped,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// Checkpoints written during this run.
    pub persisted: Vec<PathBuf>,
}

pub struct BatchRunner<F: SessionFactory> {
    factory: F,
    store: CheckpointStore,
    verifier: LazyContentVerifier,
    policy: OrchestratorPolicy,
    repair: bool,
    shutdown: ShutdownManager,
}

impl<F: SessionFactory> BatchRunner<F> {
    pub fn new(
        factory: F,
        store: CheckpointStore,
        verifier: LazyContentVerifier,
        policy: OrchestratorPolicy,
        repair: bool,
        shutdown: ShutdownManager,
    ) -> Self {
        Self {
            factory,
            store,
            verifier,
            policy,
            repair,
            shutdown,
        }
    }

    /// One full pass, then a single retry pass over the accounts that failed.
    pub async fn run(
        &self,
        credentials: &[Credential],
        progress: &ProgressTracker,
    ) -> Result<BatchReport, AppError> {
        let mut report = BatchReport::default();
        let mut retry = Vec::new();

        for (index, credential) in credentials.iter().enumerate() {
            if self.stop_requested() {
                break;
            }
            progress.account(&credential.identity);
            info!(
                "Account {}/{}: {}",
                index + 1,
                credentials.len(),
                credential.identity
            );
            match self.process(credential, &mut report).await? {
                AccountOutcome::Failed => retry.push(credential),
                outcome => record_outcome(&mut report, credential, outcome),
            }
            progress.advance();
        }

        if !retry.is_empty() && !self.stop_requested() {
            info!("Retrying {} failed account(s)", retry.len());
            for credential in retry {
                if self.stop_requested() {
                    report.failed.push(credential.identity.clone());
                    continue;
                }
                let outcome = self.process(credential, &mut report).await?;
                record_outcome(&mut report, credential, outcome);
            }
        } else {
            report
                .failed
                .extend(retry.into_iter().map(|c| c.identity.clone()));
        }

        info!(
            "Batch finished: {} processed, {} skipped, {} failed",
            report.processed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        for identity in &report.failed {
            error!("Account {} could not be exported", identity);
        }
        progress.finish(&report);
        Ok(report)
    }

    fn stop_requested(&self) -> bool {
        if self.shutdown.is_requested() {
            warn!("Shutdown requested, not starting further accounts");
            return true;
        }
        false
    }

    /// Checks the checkpoint first, so a retry also skips accounts finished meanwhile.
    async fn process(
        &self,
        credential: &Credential,
        report: &mut BatchReport,
    ) -> Result<AccountOutcome, AppError> {
        let span = info_span!("account", identity = %credential.identity);
        self.process_in_span(credential, report)
            .instrument(span)
            .await
    }

    async fn process_in_span(
        &self,
        credential: &Credential,
        report: &mut BatchReport,
    ) -> Result<AccountOutcome, AppError> {
        match self.store.status(&credential.identity) {
            CheckpointStatus::Clean => {
                info!("Checkpoint is complete, skipping");
                return Ok(AccountOutcome::Skipped);
            }
            CheckpointStatus::Dirty { violations } if !self.repair => {
                warn!(
                    "Checkpoint has {} unresolved cover(s); rerun with repair enabled \
                     to refresh it",
                    violations
                );
                return Ok(AccountOutcome::Skipped);
            }
            CheckpointStatus::Unreadable(reason) if !self.repair => {
                warn!(
                    "Checkpoint is unreadable ({}); rerun with repair enabled to refresh it",
                    reason
                );
                return Ok(AccountOutcome::Skipped);
            }
            CheckpointStatus::Missing => debug!("No checkpoint yet"),
            status => info!("Repairing checkpoint ({:?})", status),
        }

        let mut site = self.factory.open().await?;
        let mut orchestrator = AccountOrchestrator::new(&self.store, &self.verifier, self.policy);
        let result = orchestrator.run(credential, site.as_mut()).await;

        if let Err(e) = site.close().await {
            warn!("Browser session did not close cleanly: {}", e);
        }

        match result {
            Ok(account) => {
                info!(
                    "Exported {} item(s), {} integrity violation(s)",
                    account.items, account.integrity_violations
                );
                if account.unresolved_covers > 0 {
                    warn!("{} cover(s) stayed unresolved", account.unresolved_covers);
                }
                report.persisted.push(account.path);
                Ok(AccountOutcome::Processed)
            }
            Err(e) => {
                error!("Account failed in state {:?}: {}", orchestrator.state(), e);
                Ok(AccountOutcome::Failed)
            }
        }
    }
}

fn record_outcome(report: &mut BatchReport, credential: &Credential, outcome: AccountOutcome) {
    let identity = credential.identity.clone();
    match outcome {
        AccountOutcome::Processed => report.processed.push(identity),
        AccountOutcome::Skipped => report.skipped.push(identity),
        AccountOutcome::Failed => report.failed.push(identity),
    }
}
