//! Media persistence gateway: authorization plus atomic writes into the local photo library.

pub mod catalog;
pub mod local;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::pipeline::DecodedImage;

pub use local::{AccessPolicy, LibraryConfig, LocalMediaLibrary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

impl AuthorizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDetermined => "not-determined",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorizationStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-determined" => Ok(Self::NotDetermined),
            "authorized" => Ok(Self::Authorized),
            "denied" => Ok(Self::Denied),
            "restricted" => Ok(Self::Restricted),
            other => Err(LibraryError::Rejected(format!(
                "unknown authorization status {other:?}"
            ))),
        }
    }
}

/// A batch of library mutations applied all-or-nothing.
#[derive(Debug, Clone)]
pub enum ChangeRequest {
    CreateAsset { image: DecodedImage },
}

impl ChangeRequest {
    pub fn creation_request_for_asset(image: DecodedImage) -> Self {
        Self::CreateAsset { image }
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to encode photo: {0}")]
    Encode(String),
    #[error("{0}")]
    Io(String),
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),
    #[error("failed to move photo into library: {0}")]
    Persist(String),
    #[error("library worker is not running")]
    WorkerGone,
    #[error("{0}")]
    Rejected(String),
}

impl From<std::io::Error> for LibraryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type AuthorizationCallback = Box<dyn FnOnce(AuthorizationStatus) + Send + 'static>;

/// Called with `(success, error)`. Both may be unset when the library cannot tell.
pub type ChangeCompletion = Box<dyn FnOnce(bool, Option<LibraryError>) + Send + 'static>;

/// Platform photo library. Callbacks may run on any thread.
pub trait MediaLibrary: Send + Sync + 'static {
    fn request_authorization(&self, callback: AuthorizationCallback);

    fn perform_changes(&self, changes: ChangeRequest, completion: ChangeCompletion);
}
