//! Raw byte fetching for locators: local files and http(s).

use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::trace;

use super::PipelineError;
use crate::models::{Locator, LocatorKind};

const USER_AGENT: &str = concat!("feedrow/", env!("CARGO_PKG_VERSION"));

pub struct Fetcher {
    timeout: Duration,
    /// Built on the first http(s) request.
    client: OnceCell<reqwest::Client>,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceCell::new(),
        }
    }

    pub async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError> {
        match locator.kind() {
            LocatorKind::File => self.fetch_file(locator).await,
            LocatorKind::Http => self.fetch_http(locator).await,
            LocatorKind::Unsupported => {
                Err(PipelineError::InvalidLocator(locator.as_str().to_string()))
            }
        }
    }

    async fn fetch_file(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError> {
        let path = locator
            .file_path()
            .ok_or_else(|| PipelineError::InvalidLocator(locator.as_str().to_string()))?;
        trace!(?path, "Reading image file");
        tokio::fs::read(&path)
            .await
            .map_err(|e| fetch_error(locator, e))
    }

    async fn fetch_http(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError> {
        let client = self.client.get_or_try_init(|| {
            reqwest::Client::builder()
                .timeout(self.timeout)
                .user_agent(USER_AGENT)
                .build()
                .map_err(|e| fetch_error(locator, e))
        })?;

        trace!(%locator, "Fetching image over http");
        let response = client
            .get(locator.as_str())
            .send()
            .await
            .map_err(|e| fetch_error(locator, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Http {
                locator: locator.as_str().to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(locator, e))?;
        Ok(bytes.to_vec())
    }
}

fn fetch_error(locator: &Locator, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Fetch {
        locator: locator.as_str().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fetch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();

        let fetcher = Fetcher::new(Duration::from_secs(1));
        let bytes = fetcher
            .fetch(&Locator::new(path.to_string_lossy()))
            .await
            .unwrap();
        assert_eq!(bytes, b"abc");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let fetcher = Fetcher::new(Duration::from_secs(1));
        let err = fetcher
            .fetch(&Locator::from("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_unsupported_scheme() {
        let fetcher = Fetcher::new(Duration::from_secs(1));
        let err = fetcher
            .fetch(&Locator::from("ftp://x/a.png"))
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::InvalidLocator("ftp://x/a.png".into()));
    }
}
