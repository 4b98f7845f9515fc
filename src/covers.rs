use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AppError;
use crate::models::{AccountRecord, Section};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const PLACEHOLDER_FILE: &str = "placeholder.svg";
const PLACEHOLDER_SVG: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg"
     width="240" height="240" viewBox="0 0 64 64">
  <rect width="100%" height="100%" fill="#ececec"/>
  <path d="M12 56V12a4 4 0 0 1 4-4h32a4 4 0 0 1 4 4v44"
        fill="none" stroke="#b5b5b5" stroke-width="3"/>
  <line x1="12" y1="56" x2="52" y2="56" stroke="#b5b5b5" stroke-width="3"/>
</svg>
"##;

/// Resolves a stored cover value against the site's base URL.
///
/// Absolute values pass through, root-relative and relative ones are joined to
/// `base`. Empty values, unparseable values and non-HTTP schemes give `None`.
pub fn resolve_cover_url(cover: &str, base: Option<&Url>) -> Option<Url> {
    let cover = cover.trim();
    if cover.is_empty() {
        return None;
    }
    let resolved = match Url::parse(cover) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(cover).ok()?,
        Err(_) => return None,
    };
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    pub fetched: usize,
    pub cached: usize,
    pub placeholders: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSource {
    Fetched,
    Cached,
    Placeholder,
}

/// Content-addressed cover store: one file per resolved URL.
pub struct CoverCache {
    dir: PathBuf,
    client: reqwest::Client,
}

impl CoverCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            dir: dir.into(),
            client,
        })
    }

    /// `sha256(url)` in hex plus the extension of the URL path, `.img` without one.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        let hash = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        let ext = Path::new(url.path())
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or("img");
        self.dir.join(format!("{}.{}", hash, ext))
    }

    pub fn placeholder_path(&self) -> PathBuf {
        self.dir.join(PLACEHOLDER_FILE)
    }

    /// Local file for a cover value. Resolution and download failures yield the
    /// placeholder; only filesystem errors are returned.
    pub async fn fetch(
        &self,
        cover: &str,
        base: Option<&Url>,
    ) -> Result<(PathBuf, CoverSource), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let Some(url) = resolve_cover_url(cover, base) else {
            debug!("Cover {:?} has no usable URL", cover);
            return Ok((self.placeholder().await?, CoverSource::Placeholder));
        };

        let path = self.cache_path(&url);
        if tokio::fs::try_exists(&path).await? {
            debug!("Cover cache hit for {}", url);
            return Ok((path, CoverSource::Cached));
        }

        match self.download(&url).await {
            Ok(bytes) if !bytes.is_empty() => {
                tokio::fs::write(&path, &bytes).await?;
                debug!("Cached cover {} as {}", url, path.display());
                Ok((path, CoverSource::Fetched))
            }
            Ok(_) => {
                warn!("Cover {} is empty, using placeholder", url);
                Ok((self.placeholder().await?, CoverSource::Placeholder))
            }
            Err(e) => {
                warn!("Could not fetch cover {}: {}", url, e);
                Ok((self.placeholder().await?, CoverSource::Placeholder))
            }
        }
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn placeholder(&self) -> Result<PathBuf, AppError> {
        let path = self.placeholder_path();
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, PLACEHOLDER_SVG).await?;
        }
        Ok(path)
    }

    /// Fetches every cover of a record that is not cached yet.
    pub async fn warm(
        &self,
        record: &AccountRecord,
        base: Option<&Url>,
    ) -> Result<WarmReport, AppError> {
        let mut report = WarmReport::default();
        for section in Section::ALL {
            for item in record.items(section) {
                let cover = item.resource_ref.as_deref().unwrap_or_default();
                match self.fetch(cover, base).await?.1 {
                    CoverSource::Fetched => report.fetched += 1,
                    CoverSource::Cached => report.cached += 1,
                    CoverSource::Placeholder => report.placeholders += 1,
                }
            }
        }
        info!(
            "Covers for {}: {} fetched, {} already cached, {} placeholder(s)",
            record.credential.identity, report.fetched, report.cached, report.placeholders
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credential, Item, SectionResult};

    fn base() -> Url {
        Url::parse("https://woblink.com").unwrap()
    }

    #[test]
    fn resolves_every_cover_shape() {
        let base = base();
        assert_eq!(
            resolve_cover_url("https://cdn.x/a.jpg", Some(&base)).unwrap().as_str(),
            "https://cdn.x/a.jpg"
        );
        assert_eq!(
            resolve_cover_url("/media/a.jpg", Some(&base)).unwrap().as_str(),
            "https://woblink.com/media/a.jpg"
        );
        assert_eq!(
            resolve_cover_url("media/a.jpg", Some(&base)).unwrap().as_str(),
            "https://woblink.com/media/a.jpg"
        );
        assert_eq!(
            resolve_cover_url("//cdn.x/a.jpg", Some(&base)).unwrap().as_str(),
            "https://cdn.x/a.jpg"
        );
        assert_eq!(resolve_cover_url("", Some(&base)), None);
        assert_eq!(resolve_cover_url("media/a.jpg", None), None);
        assert_eq!(resolve_cover_url("data:image/png;base64,AAAA", Some(&base)), None);
    }

    #[test]
    fn cache_path_is_deterministic_and_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path()).unwrap();
        let url = Url::parse("https://cdn.x/covers/a.png?size=200").unwrap();

        let first = cache.cache_path(&url);
        assert_eq!(first, cache.cache_path(&url));
        assert_eq!(first.extension().unwrap(), "png");
        assert_eq!(first.file_stem().unwrap().len(), 64);

        let bare = cache.cache_path(&Url::parse("https://cdn.x/cover").unwrap());
        assert_eq!(bare.extension().unwrap(), "img");
    }

    #[tokio::test]
    async fn empty_cover_gets_the_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path()).unwrap();

        let (path, source) = cache.fetch("", Some(&base())).await.unwrap();
        assert_eq!(source, CoverSource::Placeholder);
        assert_eq!(path, cache.placeholder_path());
        let contents = std::fs::read(&path).unwrap();
        assert!(contents.starts_with(b"<svg"));
    }

    #[tokio::test]
    async fn cached_file_is_served_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path()).unwrap();
        let url = Url::parse("https://woblink.com/media/a.jpg").unwrap();
        std::fs::write(cache.cache_path(&url), b"jpeg").unwrap();

        let (path, source) = cache.fetch("/media/a.jpg", Some(&base())).await.unwrap();
        assert_eq!(source, CoverSource::Cached);
        assert_eq!(path, cache.cache_path(&url));
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn warm_counts_cached_and_placeholder_covers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path()).unwrap();
        let url = Url::parse("https://woblink.com/media/a.jpg").unwrap();
        std::fs::write(cache.cache_path(&url), b"jpeg").unwrap();

        let mut record = AccountRecord::new(Credential::new("a@x.com", "pw"));
        record.insert(SectionResult::new(
            Section::Ebooks,
            vec![
                Item::new("A", "One", Some("https://woblink.com/media/a.jpg")),
                Item::new("B", "Two", None),
            ],
        ));

        let report = cache.warm(&record, Some(&base())).await.unwrap();
        assert_eq!(
            report,
            WarmReport {
                fetched: 0,
                cached: 1,
                placeholders: 1
            }
        );
    }
}
