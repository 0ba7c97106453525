//! Runtime settings read from `FEEDROW_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::library::LibraryConfig;

const DEFAULT_CACHE_ENTRIES: usize = 256;
const DEFAULT_CACHE_MB: usize = 128;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ROW_WIDTH: f64 = 390.0;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub library: LibraryConfig,
    pub cache_entries: usize,
    pub cache_memory_mb: usize,
    pub http_timeout: Duration,
    pub row_width: f64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let root = match var("FEEDROW_LIBRARY_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => LibraryConfig::default_root()?,
        };
        let mut library = LibraryConfig::new(root);
        if let Some(catalog) = var("FEEDROW_CATALOG") {
            library = library.with_catalog(catalog);
        }
        if let Some(access) = var("FEEDROW_ACCESS") {
            library = library.with_access(access.parse().context("Invalid FEEDROW_ACCESS")?);
        }

        let cache_entries = match var("FEEDROW_CACHE_ENTRIES") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .context("Failed to parse FEEDROW_CACHE_ENTRIES as a positive integer")?,
            None => DEFAULT_CACHE_ENTRIES,
        };
        if cache_entries == 0 {
            anyhow::bail!("FEEDROW_CACHE_ENTRIES must be greater than 0");
        }

        let http_timeout = match var("FEEDROW_HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.trim()
                    .parse::<u64>()
                    .context("Failed to parse FEEDROW_HTTP_TIMEOUT_SECS as seconds")?,
            ),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let row_width = match var("FEEDROW_ROW_WIDTH") {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .context("Failed to parse FEEDROW_ROW_WIDTH as a number")?,
            None => DEFAULT_ROW_WIDTH,
        };
        if !(row_width.is_finite() && row_width > 0.0) {
            anyhow::bail!("FEEDROW_ROW_WIDTH must be a positive number");
        }

        Ok(Self {
            library,
            cache_entries,
            cache_memory_mb: DEFAULT_CACHE_MB,
            http_timeout,
            row_width,
        })
    }
}
