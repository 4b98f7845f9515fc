use std::path::Path;

use tracing::{info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::covers::CoverCache;
use crate::error::AppError;
use crate::models::Credential;
use crate::processor::{
    BatchReport, BatchRunner, BrowserSessionFactory, CheckpointStore, OrchestratorPolicy,
    ProgressTracker,
};
use crate::scraping::verifier::LazyContentVerifier;
use crate::shutdown::ShutdownManager;

pub struct App {
    config: AppConfig,
    show_progress: bool,
}

impl App {
    pub fn new_with_config(config: AppConfig, show_progress: bool) -> Self {
        Self {
            config,
            show_progress,
        }
    }

    pub async fn run(
        &self,
        credentials: &[Credential],
        shutdown: ShutdownManager,
    ) -> Result<BatchReport, AppError> {
        let site = self.config.site.kind;
        info!(
            "Exporting {} account(s) from {} into {}",
            credentials.len(),
            site.as_str(),
            self.config.output.dir.display()
        );

        let runner = BatchRunner::new(
            BrowserSessionFactory::new(self.config.browser.clone(), site),
            CheckpointStore::new(&self.config.output.dir),
            LazyContentVerifier::new(&self.config.scroll),
            OrchestratorPolicy {
                skip_if_zero_inventory: self.config.policy.skip_if_zero_inventory,
            },
            self.config.output.repair,
            shutdown.clone(),
        );
        let progress = ProgressTracker::new(credentials.len(), self.show_progress);
        let report = runner.run(credentials, &progress).await?;

        if let Some(dir) = &self.config.output.cover_cache {
            if shutdown.is_requested() {
                warn!("Skipping cover download after shutdown request");
            } else {
                self.warm_covers(dir, &report).await?;
            }
        }

        Ok(report)
    }

    async fn warm_covers(&self, dir: &Path, report: &BatchReport) -> Result<(), AppError> {
        let cache = CoverCache::new(dir)?;
        let base = Url::parse(self.config.site.kind.base_url()).ok();
        for path in &report.persisted {
            match CheckpointStore::load_path(path) {
                Ok(record) => {
                    cache.warm(&record, base.as_ref()).await?;
                }
                Err(e) => warn!("Could not reload {} for cover download: {}", path.display(), e),
            }
        }
        Ok(())
    }
}
