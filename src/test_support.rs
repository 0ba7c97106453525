//! Scripted collaborators shared by unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use flume::{Receiver, Sender};
use image::RgbaImage;
use parking_lot::Mutex;

use crate::library::{
    AuthorizationCallback, AuthorizationStatus, ChangeCompletion, ChangeRequest, LibraryError,
    MediaLibrary,
};
use crate::models::{Locator, PhotoRecord, PhotoUrls, UserRecord};
use crate::pipeline::{DecodedImage, ImagePipeline, PipelineError};

pub fn sample_photo(id: &str) -> PhotoRecord {
    PhotoRecord {
        id: id.to_string(),
        width: 3000,
        height: 2000,
        likes: 10,
        liked_by_user: false,
        updated_at: SystemTime::now() - Duration::from_secs(2 * 3600),
        user: UserRecord {
            name: format!("Author {id}"),
            username: format!("author_{id}"),
            profile_image: Some(Locator::new(format!("https://x/{id}/avatar.png"))),
        },
        urls: PhotoUrls {
            small: Some(Locator::new(format!("https://x/{id}/small.jpg"))),
            regular: Some(Locator::new(format!("https://x/{id}/regular.jpg"))),
        },
        download: Some(Locator::new(format!("https://x/{id}/download.jpg"))),
    }
}

pub fn pixel_image(locator: &str) -> DecodedImage {
    DecodedImage::new(Locator::from(locator), RgbaImage::new(2, 2))
}

/// Write a solid PNG into `dir` and return its path.
pub fn png_file(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, crate::image_loader::png_bytes(width, height, [40, 90, 160, 255]))
        .unwrap();
    path
}

type LoadResult = Result<DecodedImage, PipelineError>;

enum Script {
    Ready(LoadResult),
    Gated(Receiver<LoadResult>),
}

/// Lets a test decide when, and how, a gated load completes.
pub struct Gate {
    locator: Locator,
    tx: Sender<LoadResult>,
}

impl Gate {
    pub fn succeed(&self) -> DecodedImage {
        let image = pixel_image(self.locator.as_str());
        let _ = self.tx.send(Ok(image.clone()));
        image
    }

    pub fn fail(&self) {
        let _ = self.tx.send(Err(PipelineError::Fetch {
            locator: self.locator.as_str().to_string(),
            reason: "scripted failure".into(),
        }));
    }
}

/// Pipeline answering from a per-locator script. Unknown locators fail.
#[derive(Default)]
pub struct ScriptedPipeline {
    scripts: Mutex<HashMap<Locator, Script>>,
    calls: Mutex<Vec<Locator>>,
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&self, locator: &str) -> DecodedImage {
        let image = pixel_image(locator);
        self.scripts
            .lock()
            .insert(Locator::from(locator), Script::Ready(Ok(image.clone())));
        image
    }

    pub fn fail(&self, locator: &str) {
        self.scripts.lock().insert(
            Locator::from(locator),
            Script::Ready(Err(PipelineError::Decode {
                locator: locator.to_string(),
                reason: "scripted failure".into(),
            })),
        );
    }

    pub fn gate(&self, locator: &str) -> Gate {
        let (tx, rx) = flume::bounded(1);
        self.scripts
            .lock()
            .insert(Locator::from(locator), Script::Gated(rx));
        Gate {
            locator: Locator::from(locator),
            tx,
        }
    }

    pub fn calls(&self) -> Vec<Locator> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ImagePipeline for ScriptedPipeline {
    async fn load(&self, locator: &Locator) -> LoadResult {
        self.calls.lock().push(locator.clone());

        let gate = match self.scripts.lock().get(locator) {
            Some(Script::Ready(result)) => return result.clone(),
            Some(Script::Gated(rx)) => rx.clone(),
            None => {
                return Err(PipelineError::Fetch {
                    locator: locator.as_str().to_string(),
                    reason: "not scripted".into(),
                })
            }
        };

        gate.recv_async()
            .await
            .unwrap_or_else(|_| Err(PipelineError::Cancelled(locator.as_str().to_string())))
    }
}

#[derive(Debug, Clone)]
pub enum WriteScript {
    Succeed,
    FailWith(String),
    Unknown,
    DropCompletion,
}

/// Library answering from a script, always calling back from another thread.
pub struct ScriptedLibrary {
    status: Mutex<AuthorizationStatus>,
    write: Mutex<WriteScript>,
    authorization_requests: AtomicUsize,
    writes: AtomicUsize,
}

impl ScriptedLibrary {
    pub fn new(status: AuthorizationStatus, write: WriteScript) -> Self {
        Self {
            status: Mutex::new(status),
            write: Mutex::new(write),
            authorization_requests: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn authorization_requests(&self) -> usize {
        self.authorization_requests.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl MediaLibrary for ScriptedLibrary {
    fn request_authorization(&self, callback: AuthorizationCallback) {
        self.authorization_requests.fetch_add(1, Ordering::SeqCst);
        let status = *self.status.lock();
        std::thread::spawn(move || callback(status));
    }

    fn perform_changes(&self, _changes: ChangeRequest, completion: ChangeCompletion) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let script = self.write.lock().clone();
        std::thread::spawn(move || match script {
            WriteScript::Succeed => completion(true, None),
            WriteScript::FailWith(reason) => completion(false, Some(LibraryError::Io(reason))),
            WriteScript::Unknown => completion(false, None),
            WriteScript::DropCompletion => drop(completion),
        });
    }
}
