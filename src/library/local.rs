//! Directory-backed photo library.
//!
//! - One worker thread owns the catalog connection and serializes every request
//! - Completions run on the worker thread, never on the caller's
//! - Photos are staged in a temp file inside the library and renamed into place

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use directories::{ProjectDirs, UserDirs};
use flume::{Receiver, Sender};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::catalog::{Catalog, NewAsset, SavedAsset};
use super::{
    AuthorizationCallback, AuthorizationStatus, ChangeCompletion, ChangeRequest, LibraryError,
    MediaLibrary,
};
use crate::image_loader;
use crate::pipeline::DecodedImage;

/// How a library with no stored decision answers an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Authorize and remember.
    Grant,
    /// Deny and remember.
    Deny,
    /// Report `Restricted`; nothing is stored.
    Restrict,
    /// Leave the status undetermined.
    Ask,
}

impl FromStr for AccessPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grant" => Ok(Self::Grant),
            "deny" => Ok(Self::Deny),
            "restrict" => Ok(Self::Restrict),
            "ask" => Ok(Self::Ask),
            other => anyhow::bail!("unknown access policy {other:?} (grant|deny|restrict|ask)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub root: PathBuf,
    pub catalog_path: PathBuf,
    pub access: AccessPolicy,
}

impl LibraryConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            catalog_path: root.join(".catalog.sqlite"),
            root,
            access: AccessPolicy::Ask,
        }
    }

    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    pub fn with_catalog(mut self, catalog_path: impl Into<PathBuf>) -> Self {
        self.catalog_path = catalog_path.into();
        self
    }

    /// `~/Pictures/feedrow`, falling back to the XDG data directory.
    pub fn default_root() -> anyhow::Result<PathBuf> {
        if let Some(pictures) = UserDirs::new().and_then(|d| d.picture_dir().map(Path::to_path_buf))
        {
            return Ok(pictures.join("feedrow"));
        }
        let proj_dirs = ProjectDirs::from("", "", "feedrow")
            .context("Failed to determine project directories")?;
        Ok(proj_dirs.data_dir().join("photos"))
    }
}

enum Job {
    Authorize(AuthorizationCallback),
    Perform(ChangeRequest, ChangeCompletion),
    SetAuthorization(AuthorizationStatus, Sender<Result<(), LibraryError>>),
    Status(Sender<Result<AuthorizationStatus, LibraryError>>),
    Assets(Sender<Result<Vec<SavedAsset>, LibraryError>>),
}

pub struct LocalMediaLibrary {
    root: PathBuf,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl LocalMediaLibrary {
    pub fn open(config: LibraryConfig) -> Result<Self, LibraryError> {
        std::fs::create_dir_all(&config.root)?;
        let catalog = Catalog::open(&config.catalog_path)?;

        let (tx, rx) = flume::unbounded();
        let root = config.root.clone();
        let worker = thread::Builder::new()
            .name("library-worker".into())
            .spawn(move || worker_loop(rx, catalog, config))?;

        info!(?root, "Opened photo library");
        Ok(Self {
            root,
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an access decision, as the user would in system settings.
    pub async fn set_authorization(&self, status: AuthorizationStatus) -> Result<(), LibraryError> {
        let (tx, rx) = flume::bounded(1);
        self.submit(Job::SetAuthorization(status, tx))?;
        rx.recv_async().await.map_err(|_| LibraryError::WorkerGone)?
    }

    /// Stored decision, without consulting the access policy.
    pub async fn authorization(&self) -> Result<AuthorizationStatus, LibraryError> {
        let (tx, rx) = flume::bounded(1);
        self.submit(Job::Status(tx))?;
        rx.recv_async().await.map_err(|_| LibraryError::WorkerGone)?
    }

    pub async fn assets(&self) -> Result<Vec<SavedAsset>, LibraryError> {
        let (tx, rx) = flume::bounded(1);
        self.submit(Job::Assets(tx))?;
        rx.recv_async().await.map_err(|_| LibraryError::WorkerGone)?
    }

    fn submit(&self, job: Job) -> Result<(), LibraryError> {
        let jobs = self.jobs.as_ref().ok_or(LibraryError::WorkerGone)?;
        jobs.send(job).map_err(|_| LibraryError::WorkerGone)
    }
}

impl MediaLibrary for LocalMediaLibrary {
    fn request_authorization(&self, callback: AuthorizationCallback) {
        let Some(jobs) = self.jobs.as_ref() else {
            callback(AuthorizationStatus::NotDetermined);
            return;
        };
        if let Err(flume::SendError(Job::Authorize(callback))) = jobs.send(Job::Authorize(callback))
        {
            warn!("Library worker gone, authorization undetermined");
            callback(AuthorizationStatus::NotDetermined);
        }
    }

    fn perform_changes(&self, changes: ChangeRequest, completion: ChangeCompletion) {
        let Some(jobs) = self.jobs.as_ref() else {
            completion(false, Some(LibraryError::WorkerGone));
            return;
        };
        if let Err(flume::SendError(Job::Perform(_, completion))) =
            jobs.send(Job::Perform(changes, completion))
        {
            completion(false, Some(LibraryError::WorkerGone));
        }
    }
}

impl Drop for LocalMediaLibrary {
    fn drop(&mut self) {
        // Closing the channel stops the worker once queued jobs are done.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        debug!(root = ?self.root, "Photo library closed");
    }
}

fn worker_loop(rx: Receiver<Job>, mut catalog: Catalog, config: LibraryConfig) {
    debug!("Library worker started");

    while let Ok(job) = rx.recv() {
        match job {
            Job::Authorize(callback) => {
                let status = resolve_authorization(&catalog, config.access);
                trace!(%status, "Authorization resolved");
                callback(status);
            }
            Job::Perform(changes, completion) => match apply_changes(&mut catalog, &config.root, changes) {
                Ok(asset) => {
                    info!(file = %asset.file_name, "Saved photo to library");
                    completion(true, None);
                }
                Err(e) => {
                    warn!(error = %e, "Library change request failed");
                    completion(false, Some(e));
                }
            },
            Job::SetAuthorization(status, reply) => {
                let _ = reply.send(catalog.set_authorization(status));
            }
            Job::Status(reply) => {
                let _ = reply.send(catalog.authorization());
            }
            Job::Assets(reply) => {
                let _ = reply.send(catalog.assets());
            }
        }
    }

    debug!("Library worker stopped");
}

fn resolve_authorization(catalog: &Catalog, policy: AccessPolicy) -> AuthorizationStatus {
    let stored = match catalog.authorization() {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, "Failed to read stored authorization");
            return AuthorizationStatus::NotDetermined;
        }
    };
    if stored != AuthorizationStatus::NotDetermined {
        return stored;
    }

    let decided = match policy {
        AccessPolicy::Grant => AuthorizationStatus::Authorized,
        AccessPolicy::Deny => AuthorizationStatus::Denied,
        AccessPolicy::Restrict => return AuthorizationStatus::Restricted,
        AccessPolicy::Ask => return AuthorizationStatus::NotDetermined,
    };
    if let Err(e) = catalog.set_authorization(decided) {
        warn!(error = %e, "Failed to remember authorization decision");
    }
    decided
}

fn apply_changes(
    catalog: &mut Catalog,
    root: &Path,
    changes: ChangeRequest,
) -> Result<SavedAsset, LibraryError> {
    match changes {
        ChangeRequest::CreateAsset { image } => create_asset(catalog, root, &image),
    }
}

fn create_asset(
    catalog: &mut Catalog,
    root: &Path,
    image: &DecodedImage,
) -> Result<SavedAsset, LibraryError> {
    let jpeg = image_loader::encode_jpeg(&image.pixels)
        .map_err(|e| LibraryError::Encode(format!("{e:#}")))?;

    // Staged in the library directory so the final rename stays on one filesystem.
    let mut staged = NamedTempFile::new_in(root)?;
    staged.write_all(&jpeg)?;
    staged.as_file().sync_all()?;

    let asset = NewAsset {
        content_hash: xxh3_64(image.pixels.as_raw()),
        width: image.width(),
        height: image.height(),
        source: image.locator.as_str(),
    };

    catalog.record_asset(asset, |file_name| {
        let target = root.join(file_name);
        staged
            .persist_noclobber(&target)
            .map_err(|e| LibraryError::Persist(e.error.to_string()))?;
        Ok(target)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Locator;
    use image::RgbaImage;
    use tempfile::tempdir;

    fn image() -> DecodedImage {
        DecodedImage::new(
            Locator::from("https://x/photo.jpg"),
            RgbaImage::from_pixel(12, 8, image::Rgba([200, 10, 10, 255])),
        )
    }

    async fn authorize(library: &LocalMediaLibrary) -> AuthorizationStatus {
        let (tx, rx) = flume::bounded(1);
        library.request_authorization(Box::new(move |status| {
            let _ = tx.send(status);
        }));
        rx.recv_async().await.unwrap()
    }

    #[test]
    fn test_access_policy_parse() {
        assert_eq!("Grant".parse::<AccessPolicy>().unwrap(), AccessPolicy::Grant);
        assert_eq!(" ask ".parse::<AccessPolicy>().unwrap(), AccessPolicy::Ask);
        assert!("sometimes".parse::<AccessPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_policy_decides_undetermined_status() {
        let dir = tempdir().unwrap();
        let ask = LocalMediaLibrary::open(LibraryConfig::new(dir.path().join("ask"))).unwrap();
        assert_eq!(authorize(&ask).await, AuthorizationStatus::NotDetermined);

        let restrict = LocalMediaLibrary::open(
            LibraryConfig::new(dir.path().join("restrict")).with_access(AccessPolicy::Restrict),
        )
        .unwrap();
        assert_eq!(authorize(&restrict).await, AuthorizationStatus::Restricted);
        assert_eq!(
            restrict.authorization().await.unwrap(),
            AuthorizationStatus::NotDetermined
        );
    }

    #[tokio::test]
    async fn test_granted_decision_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let library = LocalMediaLibrary::open(
                LibraryConfig::new(dir.path()).with_access(AccessPolicy::Grant),
            )
            .unwrap();
            assert_eq!(authorize(&library).await, AuthorizationStatus::Authorized);
        }

        let reopened = LocalMediaLibrary::open(
            LibraryConfig::new(dir.path()).with_access(AccessPolicy::Deny),
        )
        .unwrap();
        assert_eq!(authorize(&reopened).await, AuthorizationStatus::Authorized);
    }

    #[tokio::test]
    async fn test_stored_denial_wins_over_policy() {
        let dir = tempdir().unwrap();
        let library = LocalMediaLibrary::open(
            LibraryConfig::new(dir.path()).with_access(AccessPolicy::Grant),
        )
        .unwrap();
        library
            .set_authorization(AuthorizationStatus::Denied)
            .await
            .unwrap();
        assert_eq!(authorize(&library).await, AuthorizationStatus::Denied);
    }

    #[tokio::test]
    async fn test_create_asset_writes_file_and_catalog_on_worker_thread() {
        let dir = tempdir().unwrap();
        let library = LocalMediaLibrary::open(LibraryConfig::new(dir.path())).unwrap();

        let (tx, rx) = flume::bounded(1);
        library.perform_changes(
            ChangeRequest::creation_request_for_asset(image()),
            Box::new(move |success, error| {
                let thread = std::thread::current().name().map(str::to_string);
                let _ = tx.send((success, error.map(|e| e.to_string()), thread));
            }),
        );
        let (success, error, thread) = rx.recv_async().await.unwrap();

        assert!(success);
        assert_eq!(error, None);
        assert_eq!(thread.as_deref(), Some("library-worker"));

        let assets = library.assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!((assets[0].width, assets[0].height), (12, 8));
        assert_eq!(assets[0].source, "https://x/photo.jpg");

        let saved = std::fs::read(library.root().join(&assets[0].file_name)).unwrap();
        assert_eq!(image::guess_format(&saved).unwrap(), image::ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_repeated_saves_create_distinct_assets() {
        let dir = tempdir().unwrap();
        let library = LocalMediaLibrary::open(LibraryConfig::new(dir.path())).unwrap();

        for _ in 0..2 {
            let (tx, rx) = flume::bounded(1);
            library.perform_changes(
                ChangeRequest::creation_request_for_asset(image()),
                Box::new(move |success, _| {
                    let _ = tx.send(success);
                }),
            );
            assert!(rx.recv_async().await.unwrap());
        }

        let assets = library.assets().await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_ne!(assets[0].file_name, assets[1].file_name);
    }
}
