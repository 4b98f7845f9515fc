use config::Config;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::scraping::sites::SiteKind;

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    #[validate(nested)]
    pub browser: BrowserConfig,
    #[validate(nested)]
    pub scroll: ScrollConfig,
    pub output: OutputConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub kind: SiteKind,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct BrowserConfig {
    #[validate(url(message = "WebDriver URL must be an absolute URL"))]
    pub webdriver_url: String,
    pub headless: bool,
    #[validate(range(min = 1, message = "page timeout must be at least one second"))]
    pub page_timeout_secs: u64,
    #[validate(range(min = 1, message = "loader timeout must be at least one second"))]
    pub loader_timeout_secs: u64,
    #[validate(range(min = 1, message = "marker timeout must be at least one second"))]
    pub marker_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            page_timeout_secs: 30,
            loader_timeout_secs: 60,
            marker_timeout_secs: 10,
        }
    }
}

impl BrowserConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn loader_timeout(&self) -> Duration {
        Duration::from_secs(self.loader_timeout_secs)
    }

    pub fn marker_timeout(&self) -> Duration {
        Duration::from_secs(self.marker_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ScrollConfig {
    #[validate(range(min = 1, message = "scroll step must be positive"))]
    pub step_px: i64,
    pub pause_ms: u64,
    #[validate(range(min = 1, message = "scroll budget must allow at least one step"))]
    pub max_attempts: usize,
    /// Extra scroll-and-resample passes before unresolved covers are accepted.
    pub retry_passes: usize,
    /// Substrings marking an absolute cover URL as a known-empty image.
    pub placeholder_patterns: Vec<String>,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            step_px: 600,
            pause_ms: 250,
            max_attempts: 100,
            retry_passes: 1,
            placeholder_patterns: vec!["placeholder".to_string(), "no-cover".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Re-run accounts whose checkpoint holds unresolved covers.
    pub repair: bool,
    pub cover_cache: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            repair: false,
            cover_cache: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub skip_if_zero_inventory: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            skip_if_zero_inventory: true,
        }
    }
}

impl AppConfig {
    pub fn load_with_cli_args(cli_args: &CliArgs) -> Result<Self, AppError> {
        let mut builder = Config::builder()
            .add_source(config::File::with_name("library-lister").required(false));

        if let Some(config_path) = &cli_args.config {
            builder = builder.add_source(config::File::from(config_path.as_path()));
        }

        if let Some(output) = &cli_args.output {
            builder = builder.set_override("output.dir", output.to_string_lossy().to_string())?;
        }
        if let Some(cache) = &cli_args.cover_cache {
            builder =
                builder.set_override("output.cover_cache", cache.to_string_lossy().to_string())?;
        }
        if cli_args.fix_covers {
            builder = builder.set_override("output.repair", true)?;
        }
        if cli_args.head {
            builder = builder.set_override("browser.headless", false)?;
        }
        if let Some(url) = &cli_args.webdriver_url {
            builder = builder.set_override("browser.webdriver_url", url.as_str())?;
        }
        if let Some(site) = cli_args.site {
            builder = builder.set_override("site.kind", site.as_str())?;
        }

        let app_config: AppConfig = builder.build()?.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }
}
