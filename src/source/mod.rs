//! Data source contract a row binds to.
//!
//! Inputs are user actions taking the row's photo. State outputs are `watch`
//! channels, so a freshly bound row always sees the latest value; download links
//! are a broadcast so every request is delivered.

pub mod photo_model;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::models::{AlertMessage, Locator, PhotoRecord};

pub use photo_model::{PhotoRowModel, RowEvent};

pub trait RowInputs: Send + Sync + 'static {
    fn like(&self, photo: PhotoRecord);
    fn unlike(&self, photo: PhotoRecord);
    fn open_details(&self, photo: PhotoRecord);
    fn download(&self, photo: PhotoRecord);
    fn alert(&self, alert: AlertMessage);
}

pub struct RowOutputs {
    pub liked_by_user: watch::Receiver<bool>,
    pub photo: watch::Receiver<PhotoRecord>,
    pub avatar: watch::Receiver<Option<Locator>>,
    pub low_res: watch::Receiver<Option<Locator>>,
    pub high_res: watch::Receiver<Option<Locator>>,
    pub full_name: watch::Receiver<String>,
    pub username: watch::Receiver<String>,
    pub size_coefficient: watch::Receiver<f64>,
    pub updated: watch::Receiver<String>,
    pub total_likes: watch::Receiver<String>,
    /// One message per download request that carried a link. Only links sent
    /// after `outputs()` was called are received.
    pub download_link: broadcast::Receiver<Locator>,
}

pub trait RowDataSource: Send + Sync + 'static {
    fn inputs(&self) -> Arc<dyn RowInputs>;
    fn outputs(&self) -> RowOutputs;
}
