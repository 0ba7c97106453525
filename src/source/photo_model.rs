use std::sync::Arc;
use std::time::SystemTime;

use flume::{Receiver, Sender};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::{RowDataSource, RowInputs, RowOutputs};
use crate::models::{AlertMessage, Locator, PhotoRecord, RowContent};

/// User actions forwarded by the model, for whoever coordinates navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    Liked(String),
    Unliked(String),
    DetailsRequested(PhotoRecord),
    DownloadRequested(PhotoRecord),
}

/// Download links queued per subscriber before the oldest is dropped.
const DOWNLOAD_QUEUE: usize = 16;

struct Outputs {
    liked_by_user: watch::Sender<bool>,
    photo: watch::Sender<PhotoRecord>,
    avatar: watch::Sender<Option<Locator>>,
    low_res: watch::Sender<Option<Locator>>,
    high_res: watch::Sender<Option<Locator>>,
    full_name: watch::Sender<String>,
    username: watch::Sender<String>,
    size_coefficient: watch::Sender<f64>,
    updated: watch::Sender<String>,
    total_likes: watch::Sender<String>,
    download_link: broadcast::Sender<Locator>,
}

struct ModelInner {
    row_width: f64,
    outputs: Outputs,
    events: Sender<RowEvent>,
    alerts: Sender<AlertMessage>,
}

/// In-process view-model for one photo row.
///
/// Likes are echoed optimistically into the outputs. `download` publishes the
/// photo's download link, which a bound row turns into a save.
#[derive(Clone)]
pub struct PhotoRowModel {
    inner: Arc<ModelInner>,
}

/// Receiving ends for everything the model forwards.
pub struct ModelChannels {
    pub events: Receiver<RowEvent>,
    pub alerts: Receiver<AlertMessage>,
}

impl PhotoRowModel {
    pub fn new(photo: PhotoRecord, row_width: f64) -> (Self, ModelChannels) {
        let content = RowContent::from_photo(&photo, row_width, SystemTime::now());
        let (events_tx, events_rx) = flume::unbounded();
        let (alerts_tx, alerts_rx) = flume::unbounded();

        let outputs = Outputs {
            liked_by_user: watch::channel(photo.liked_by_user).0,
            avatar: watch::channel(content.avatar).0,
            low_res: watch::channel(content.low_res).0,
            high_res: watch::channel(content.high_res).0,
            full_name: watch::channel(content.full_name).0,
            username: watch::channel(content.username).0,
            size_coefficient: watch::channel(content.size_coefficient).0,
            updated: watch::channel(content.updated).0,
            total_likes: watch::channel(content.total_likes).0,
            download_link: broadcast::channel(DOWNLOAD_QUEUE).0,
            photo: watch::channel(photo).0,
        };

        let model = Self {
            inner: Arc::new(ModelInner {
                row_width,
                outputs,
                events: events_tx,
                alerts: alerts_tx,
            }),
        };
        let channels = ModelChannels {
            events: events_rx,
            alerts: alerts_rx,
        };
        (model, channels)
    }

    /// Publish a new photo on every photo-derived output. The like state is separate.
    pub fn publish(&self, photo: PhotoRecord) {
        let content = RowContent::from_photo(&photo, self.inner.row_width, SystemTime::now());
        let out = &self.inner.outputs;
        out.avatar.send_replace(content.avatar);
        out.low_res.send_replace(content.low_res);
        out.high_res.send_replace(content.high_res);
        out.full_name.send_replace(content.full_name);
        out.username.send_replace(content.username);
        out.size_coefficient.send_replace(content.size_coefficient);
        out.updated.send_replace(content.updated);
        out.total_likes.send_replace(content.total_likes);
        out.photo.send_replace(photo);
    }

    pub fn set_liked(&self, liked: bool) {
        self.inner.outputs.liked_by_user.send_replace(liked);
    }

    pub fn photo(&self) -> PhotoRecord {
        self.inner.outputs.photo.borrow().clone()
    }

    fn toggle_like(&self, mut photo: PhotoRecord, liked: bool) {
        if photo.liked_by_user != liked {
            photo.likes = if liked {
                photo.likes.saturating_add(1)
            } else {
                photo.likes.saturating_sub(1)
            };
            photo.liked_by_user = liked;
        }
        self.set_liked(liked);
        self.publish(photo);
    }

    fn forward(&self, event: RowEvent) {
        let _ = self.inner.events.send(event);
    }
}

impl RowInputs for PhotoRowModel {
    fn like(&self, photo: PhotoRecord) {
        debug!(photo = %photo.id, "Like");
        self.forward(RowEvent::Liked(photo.id.clone()));
        self.toggle_like(photo, true);
    }

    fn unlike(&self, photo: PhotoRecord) {
        debug!(photo = %photo.id, "Unlike");
        self.forward(RowEvent::Unliked(photo.id.clone()));
        self.toggle_like(photo, false);
    }

    fn open_details(&self, photo: PhotoRecord) {
        self.forward(RowEvent::DetailsRequested(photo));
    }

    fn download(&self, photo: PhotoRecord) {
        debug!(photo = %photo.id, link = ?photo.download, "Download requested");
        let link = photo.download.clone();
        self.forward(RowEvent::DownloadRequested(photo));
        match link {
            Some(link) => {
                // No bound row means nobody is listening; the tap is dropped.
                if self.inner.outputs.download_link.send(link).is_err() {
                    warn!("Download requested with no row bound");
                }
            }
            None => debug!("Photo has no download link"),
        }
    }

    fn alert(&self, alert: AlertMessage) {
        info!(title = %alert.title, message = %alert.message, "Alert");
        let _ = self.inner.alerts.send(alert);
    }
}

impl RowDataSource for PhotoRowModel {
    fn inputs(&self) -> Arc<dyn RowInputs> {
        Arc::new(self.clone())
    }

    fn outputs(&self) -> RowOutputs {
        let out = &self.inner.outputs;
        RowOutputs {
            liked_by_user: out.liked_by_user.subscribe(),
            photo: out.photo.subscribe(),
            avatar: out.avatar.subscribe(),
            low_res: out.low_res.subscribe(),
            high_res: out.high_res.subscribe(),
            full_name: out.full_name.subscribe(),
            username: out.username.subscribe(),
            size_coefficient: out.size_coefficient.subscribe(),
            updated: out.updated.subscribe(),
            total_likes: out.total_likes.subscribe(),
            download_link: out.download_link.subscribe(),
        }
    }
}
