// Feed row: binds a data source to the row's visual state and controls.
// Each bind gets a fresh load token; every async result is applied only if the
// row still carries that token, so late loads never touch a reused row.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use super::controls::{
    height_points, ActionButton, ContentImageView, LikeIcon, Resolution, RowAction,
};
use crate::library::MediaLibrary;
use crate::models::{AlertMessage, Locator};
use crate::pipeline::{DecodedImage, ImagePipeline};
use crate::reactive::{combine_latest, either_change, for_each, next_change, DisposeBag};
use crate::source::{RowDataSource, RowInputs};
use crate::workflow::SaveWorkflow;

/// Token 0 means "not bound".
static NEXT_BIND_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct RowState {
    token: u64,
    avatar: Option<DecodedImage>,
    content: ContentImageView,
    full_name: String,
    username: String,
    updated: String,
    total_likes: String,
    photo_height: f32,
    like_icon: LikeIcon,
    like_button: ActionButton,
    photo_button: ActionButton,
    download_button: ActionButton,
}

/// What the row currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    pub token: u64,
    pub avatar: Option<Locator>,
    pub content: Option<Locator>,
    pub content_resolution: Option<Resolution>,
    pub full_name: String,
    pub username: String,
    pub updated: String,
    pub total_likes: String,
    pub photo_height: f32,
    pub like_icon: LikeIcon,
    pub like_action: Option<RowAction>,
    pub like_photo: Option<String>,
    pub details_photo: Option<String>,
    pub download_photo: Option<String>,
}

impl RowState {
    fn snapshot(&self) -> RowSnapshot {
        RowSnapshot {
            token: self.token,
            avatar: self.avatar.as_ref().map(|i| i.locator.clone()),
            content: self.content.image().map(|i| i.locator.clone()),
            content_resolution: self.content.resolution(),
            full_name: self.full_name.clone(),
            username: self.username.clone(),
            updated: self.updated.clone(),
            total_likes: self.total_likes.clone(),
            photo_height: self.photo_height,
            like_icon: self.like_icon,
            like_action: self.like_button.action(),
            like_photo: self.like_button.photo_id().map(str::to_string),
            details_photo: self.photo_button.photo_id().map(str::to_string),
            download_photo: self.download_button.photo_id().map(str::to_string),
        }
    }
}

struct RowInner {
    pipeline: Arc<dyn ImagePipeline>,
    library: Arc<dyn MediaLibrary>,
    state: Mutex<RowState>,
    subscriptions: Mutex<DisposeBag>,
    revision: watch::Sender<u64>,
}

impl RowInner {
    /// Mutate the visual state if `token` is still the bound one.
    fn update(&self, token: u64, f: impl FnOnce(&mut RowState)) -> bool {
        {
            let mut state = self.state.lock();
            if state.token != token {
                trace!(token, current = state.token, "Dropping stale row update");
                return false;
            }
            f(&mut state);
        }
        self.bump();
        true
    }

    fn is_bound(&self, token: u64) -> bool {
        self.state.lock().token == token
    }

    /// Invalidate the binding, clear images and actions, and drop every subscription.
    /// With `only`, nothing happens unless that binding is the current one.
    fn reset(&self, only: Option<u64>) -> bool {
        {
            let mut state = self.state.lock();
            if only.is_some_and(|token| token != state.token) {
                return false;
            }
            state.token = 0;
            state.avatar = None;
            state.content.clear();
            state.like_button.clear();
            state.photo_button.clear();
            state.download_button.clear();
        }

        let mut bag = std::mem::take(&mut *self.subscriptions.lock());
        bag.dispose();
        self.bump();
        true
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

/// Apply through a non-owning row reference; a dropped row makes this a no-op.
fn apply(row: &Weak<RowInner>, token: u64, f: impl FnOnce(&mut RowState)) -> bool {
    match row.upgrade() {
        Some(inner) => inner.update(token, f),
        None => false,
    }
}

/// Handle to one bind. Cancelling it severs that bind's wiring only.
#[derive(Debug, Clone)]
pub struct Binding {
    row: Weak<RowInner>,
    token: u64,
}

impl Binding {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn cancel(&self) -> bool {
        match self.row.upgrade() {
            Some(inner) => inner.reset(Some(self.token)),
            None => false,
        }
    }
}

/// One reusable feed row.
#[derive(Clone)]
pub struct RowWidget {
    inner: Arc<RowInner>,
}

impl RowWidget {
    pub fn new(pipeline: Arc<dyn ImagePipeline>, library: Arc<dyn MediaLibrary>) -> Self {
        Self {
            inner: Arc::new(RowInner {
                pipeline,
                library,
                state: Mutex::new(RowState::default()),
                subscriptions: Mutex::new(DisposeBag::new()),
                revision: watch::channel(0).0,
            }),
        }
    }

    /// Bind a data source, replacing any previous binding. Must run inside a tokio runtime.
    pub fn bind(&self, source: &dyn RowDataSource) -> Binding {
        self.prepare_for_reuse();

        let token = NEXT_BIND_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.inner.state.lock().token = token;

        let inputs = source.inputs();
        let outputs = source.outputs();
        let row = Arc::downgrade(&self.inner);
        let pipeline = Arc::clone(&self.inner.pipeline);
        let mut bag = DisposeBag::new();

        // Like toggle follows the latest (liked, photo) pair.
        {
            let row = row.clone();
            let inputs = Arc::clone(&inputs);
            bag.spawn(combine_latest(
                outputs.liked_by_user.clone(),
                outputs.photo.clone(),
                move |liked, photo| {
                    let action = RowAction::for_like_state(liked);
                    let inputs = Arc::clone(&inputs);
                    apply(&row, token, |s| {
                        s.like_button.bind(action, photo, inputs);
                    });
                },
            ));
        }

        {
            let row = row.clone();
            let inputs = Arc::clone(&inputs);
            bag.spawn(for_each(outputs.photo.clone(), move |photo| {
                let inputs = Arc::clone(&inputs);
                apply(&row, token, |s| {
                    s.photo_button
                        .bind(RowAction::OpenDetails, photo.clone(), Arc::clone(&inputs));
                    s.download_button.bind(RowAction::Download, photo, inputs);
                });
            }));
        }

        {
            let row = row.clone();
            bag.spawn(for_each(outputs.liked_by_user.clone(), move |liked| {
                apply(&row, token, |s| s.like_icon = LikeIcon::for_like_state(liked));
            }));
        }

        bag.spawn(drive_avatar(
            row.clone(),
            token,
            Arc::clone(&pipeline),
            outputs.avatar.clone(),
        ));
        bag.spawn(drive_content(
            row.clone(),
            token,
            Arc::clone(&pipeline),
            outputs.low_res.clone(),
            outputs.high_res.clone(),
        ));

        bind_label(&mut bag, &row, token, outputs.full_name.clone(), |s| &mut s.full_name);
        bind_label(&mut bag, &row, token, outputs.username.clone(), |s| &mut s.username);
        bind_label(&mut bag, &row, token, outputs.updated.clone(), |s| &mut s.updated);
        bind_label(&mut bag, &row, token, outputs.total_likes.clone(), |s| &mut s.total_likes);

        {
            let row = row.clone();
            bag.spawn(for_each(outputs.size_coefficient.clone(), move |coef| {
                apply(&row, token, |s| s.photo_height = height_points(coef));
            }));
        }

        let workflow = Arc::new(SaveWorkflow::new(
            pipeline,
            Arc::clone(&self.inner.library),
        ));
        bag.spawn(drive_downloads(
            row.clone(),
            token,
            workflow,
            inputs,
            outputs.download_link,
        ));

        debug!(token, subscriptions = bag.len(), "Bound row");
        *self.inner.subscriptions.lock() = bag;
        Binding { row, token }
    }

    /// Clear images and actions and cancel every subscription of the current binding.
    pub fn prepare_for_reuse(&self) {
        self.inner.reset(None);
    }

    pub fn snapshot(&self) -> RowSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn content_image(&self) -> Option<DecodedImage> {
        self.inner.state.lock().content.image().cloned()
    }

    /// Resolve once the row shows a state matching `predicate`.
    pub async fn wait_for<P>(&self, predicate: P) -> RowSnapshot
    where
        P: Fn(&RowSnapshot) -> bool,
    {
        let mut revision = self.inner.revision.subscribe();
        loop {
            let snapshot = self.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            // The sender lives as long as `self`, so this only ends via the predicate.
            let _ = revision.changed().await;
        }
    }

    pub fn tap_like(&self) -> bool {
        self.tap(|s| &s.like_button)
    }

    pub fn tap_photo(&self) -> bool {
        self.tap(|s| &s.photo_button)
    }

    pub fn tap_download(&self) -> bool {
        self.tap(|s| &s.download_button)
    }

    fn tap(&self, button: impl FnOnce(&RowState) -> &ActionButton) -> bool {
        // Dispatch outside the lock: the data source may echo straight back into this row.
        let bound = button(&self.inner.state.lock()).bound();
        match bound {
            Some(bound) => {
                trace!(action = ?bound.action, photo = %bound.photo.id, "Tap");
                bound.execute();
                true
            }
            None => false,
        }
    }
}

fn bind_label(
    bag: &mut DisposeBag,
    row: &Weak<RowInner>,
    token: u64,
    rx: watch::Receiver<String>,
    field: fn(&mut RowState) -> &mut String,
) {
    let row = row.clone();
    bag.spawn(for_each(rx, move |text| {
        apply(&row, token, |s| *field(s) = text);
    }));
}

async fn drive_avatar(
    row: Weak<RowInner>,
    token: u64,
    pipeline: Arc<dyn ImagePipeline>,
    mut rx: watch::Receiver<Option<Locator>>,
) {
    loop {
        let locator = rx.borrow_and_update().clone();
        let load = async {
            let image = match locator {
                Some(ref locator) => pipeline.load_or_empty(locator).await,
                None => None,
            };
            apply(&row, token, |s| s.avatar = image);
        };

        // A newer avatar abandons the pending load.
        let finished = tokio::select! {
            _ = load => true,
            _ = next_change(&mut rx) => false,
        };
        if finished && rx.changed().await.is_err() {
            break;
        }
    }
}

async fn drive_content(
    row: Weak<RowInner>,
    token: u64,
    pipeline: Arc<dyn ImagePipeline>,
    mut low: watch::Receiver<Option<Locator>>,
    mut high: watch::Receiver<Option<Locator>>,
) {
    loop {
        let low_locator = low.borrow_and_update().clone();
        let high_locator = high.borrow_and_update().clone();
        apply(&row, token, |s| s.content.begin_sequence());

        let sequence = load_progressive(&row, token, pipeline.as_ref(), low_locator, high_locator);
        let finished = tokio::select! {
            _ = sequence => true,
            _ = either_change(&mut low, &mut high) => false,
        };
        if finished {
            either_change(&mut low, &mut high).await;
        }
    }
}

/// Low and high load at once and each result is applied as it lands. The content
/// view refuses a downgrade, so a late low image never replaces high and a
/// stalled low load never holds high back.
async fn load_progressive(
    row: &Weak<RowInner>,
    token: u64,
    pipeline: &dyn ImagePipeline,
    low: Option<Locator>,
    high: Option<Locator>,
) {
    let low_stage = async move {
        let Some(locator) = low else { return };
        if let Some(image) = pipeline.load_or_empty(&locator).await {
            apply(row, token, |s| {
                if !s.content.apply(Resolution::Low, image) {
                    trace!(%locator, "Low resolution arrived after high, dropped");
                }
            });
        }
    };
    let high_stage = async move {
        let Some(locator) = high else { return };
        if let Some(image) = pipeline.load_or_empty(&locator).await {
            apply(row, token, |s| {
                s.content.apply(Resolution::High, image);
            });
        }
    };

    tokio::join!(low_stage, high_stage);
}

/// Each download link received after bind starts one save. Runs die with this task.
async fn drive_downloads(
    row: Weak<RowInner>,
    token: u64,
    workflow: Arc<SaveWorkflow>,
    inputs: Arc<dyn RowInputs>,
    mut rx: broadcast::Receiver<Locator>,
) {
    let mut runs = JoinSet::new();

    loop {
        tokio::select! {
            received = rx.recv() => {
                let locator = match received {
                    Ok(locator) => locator,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(token, skipped, "Download requests dropped, queue full");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let row = row.clone();
                let workflow = Arc::clone(&workflow);
                let inputs = Arc::clone(&inputs);
                runs.spawn(async move {
                    let outcome = workflow.on_download_link_available(locator).await;
                    if let Some(alert) = outcome.alert() {
                        deliver_alert(&row, token, inputs.as_ref(), alert);
                    }
                });
            }
            Some(_) = runs.join_next(), if !runs.is_empty() => {}
        }
    }

    while runs.join_next().await.is_some() {}
}

fn deliver_alert(
    row: &Weak<RowInner>,
    token: u64,
    inputs: &dyn RowInputs,
    alert: AlertMessage,
) {
    let bound = row.upgrade().is_some_and(|inner| inner.is_bound(token));
    if bound {
        inputs.alert(alert);
    } else {
        debug!(token, title = %alert.title, "Row rebound before save finished, alert dropped");
    }
}
