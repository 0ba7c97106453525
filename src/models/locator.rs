use std::fmt;
use std::path::PathBuf;

/// Opaque reference to a remote or local resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    File,
    Http,
    Unsupported,
}

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse a locator, treating blank input as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> LocatorKind {
        let lower = self.0.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            LocatorKind::Http
        } else if lower.starts_with("file://") || !lower.contains("://") {
            LocatorKind::File
        } else {
            LocatorKind::Unsupported
        }
    }

    /// Filesystem path for `file://` and bare-path locators.
    pub fn file_path(&self) -> Option<PathBuf> {
        match self.kind() {
            LocatorKind::File => {
                let raw = self.0.strip_prefix("file://").unwrap_or(&self.0);
                Some(PathBuf::from(raw))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
