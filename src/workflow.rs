//! Save-to-library workflow: authorization, asset load, atomic write, feedback.
//!
//! ```text
//! Idle -> RequestingAuthorization -> Denied | Restricted | Undetermined
//!                                 -> Authorized -> LoadingAsset -> Persisting -> Succeeded | Failed
//! ```
//!
//! Library callbacks may arrive on any thread; each one is handed back over a
//! one-slot channel and awaited here, so the outcome is always produced on the
//! task that started the run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::library::{AuthorizationStatus, ChangeRequest, LibraryError, MediaLibrary};
use crate::models::{AlertMessage, Locator};
use crate::pipeline::{ImageHolder, ImagePipeline, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    RequestingAuthorization,
    Authorized,
    Denied,
    Restricted,
    Undetermined,
    LoadingAsset,
    Persisting,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Denied,
    Restricted,
    Undetermined,
    /// The asset could not be loaded; nothing was written.
    AssetUnavailable(PipelineError),
    Failed(String),
    UnknownFailure,
}

impl SaveOutcome {
    /// The single alert this outcome surfaces, if any.
    pub fn alert(&self) -> Option<AlertMessage> {
        match self {
            Self::Saved => Some(AlertMessage::saved()),
            Self::Denied => Some(AlertMessage::access_denied()),
            Self::Failed(reason) => Some(AlertMessage::save_failed(reason)),
            Self::UnknownFailure => Some(AlertMessage::unknown_error()),
            Self::Restricted | Self::Undetermined | Self::AssetUnavailable(_) => None,
        }
    }
}

impl SaveOutcome {
    /// State a run ends in with this outcome.
    pub fn terminal_state(&self) -> SaveState {
        match self {
            Self::Saved => SaveState::Succeeded,
            Self::Denied => SaveState::Denied,
            Self::Restricted => SaveState::Restricted,
            Self::Undetermined => SaveState::Undetermined,
            Self::AssetUnavailable(_) | Self::Failed(_) | Self::UnknownFailure => SaveState::Failed,
        }
    }
}

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// State of one save. Runs never share state, so concurrent saves stay apart.
struct SaveRun {
    id: u64,
    state: SaveState,
}

impl SaveRun {
    fn start() -> Self {
        Self {
            id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            state: SaveState::Idle,
        }
    }

    fn advance(&mut self, next: SaveState) {
        debug!(run = self.id, previous = ?self.state, ?next, "Save state");
        self.state = next;
    }

    fn finish(mut self, outcome: SaveOutcome) -> SaveOutcome {
        self.advance(outcome.terminal_state());
        outcome
    }
}

pub struct SaveWorkflow {
    pipeline: Arc<dyn ImagePipeline>,
    library: Arc<dyn MediaLibrary>,
}

impl SaveWorkflow {
    pub fn new(pipeline: Arc<dyn ImagePipeline>, library: Arc<dyn MediaLibrary>) -> Self {
        Self { pipeline, library }
    }

    /// Run one save for `locator`. Every call starts from a fresh authorization
    /// request, and concurrent calls run independently.
    pub async fn on_download_link_available(&self, locator: Locator) -> SaveOutcome {
        let mut run = SaveRun::start();
        debug!(run = run.id, %locator, "Save requested");
        run.advance(SaveState::RequestingAuthorization);

        match self.request_authorization().await {
            AuthorizationStatus::Authorized => run.advance(SaveState::Authorized),
            AuthorizationStatus::Denied => {
                info!(%locator, "Save refused, library access denied");
                return run.finish(SaveOutcome::Denied);
            }
            AuthorizationStatus::Restricted => {
                warn!(%locator, "Save skipped, library access restricted");
                return run.finish(SaveOutcome::Restricted);
            }
            AuthorizationStatus::NotDetermined => {
                warn!(%locator, "Save skipped, library access not determined");
                return run.finish(SaveOutcome::Undetermined);
            }
        }

        run.advance(SaveState::LoadingAsset);
        let holder = ImageHolder::new();
        if let Err(e) = self.pipeline.load_into(&locator, &holder).await {
            warn!(%locator, error = %e, "Asset unavailable, nothing saved");
            return run.finish(SaveOutcome::AssetUnavailable(e));
        }
        let Some(image) = holder.take() else {
            return run.finish(SaveOutcome::AssetUnavailable(PipelineError::Cancelled(
                locator.as_str().to_string(),
            )));
        };

        run.advance(SaveState::Persisting);
        let outcome = match self
            .perform_changes(ChangeRequest::creation_request_for_asset(image))
            .await
        {
            (true, _) => SaveOutcome::Saved,
            (false, Some(error)) => SaveOutcome::Failed(error.to_string()),
            (false, None) => SaveOutcome::UnknownFailure,
        };

        info!(run = run.id, %locator, ?outcome, "Save finished");
        run.finish(outcome)
    }

    async fn request_authorization(&self) -> AuthorizationStatus {
        let (tx, rx) = flume::bounded(1);
        self.library.request_authorization(Box::new(move |status| {
            let _ = tx.send(status);
        }));
        // A callback dropped without an answer leaves the decision open.
        rx.recv_async()
            .await
            .unwrap_or(AuthorizationStatus::NotDetermined)
    }

    async fn perform_changes(&self, changes: ChangeRequest) -> (bool, Option<LibraryError>) {
        let (tx, rx) = flume::bounded(1);
        self.library.perform_changes(
            changes,
            Box::new(move |success, error| {
                let _ = tx.send((success, error));
            }),
        );
        rx.recv_async().await.unwrap_or((false, None))
    }
}
