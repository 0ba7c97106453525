//! feedrow - reactive feed rows with progressive images and save-to-library.
//!
//! - `ui::RowWidget` binds a `source::RowDataSource` to a reusable row
//! - `workflow::SaveWorkflow` runs authorization, asset load and write for each download
//! - `pipeline::CachingImagePipeline` and `library::LocalMediaLibrary` are the
//!   concrete image and photo-library collaborators
//! - `app::FeedRowApp` is the headless host behind the `feedrow` binary

pub mod app;
pub mod config;
pub mod image_loader;
pub mod library;
pub mod models;
pub mod pipeline;
pub mod reactive;
pub mod source;
pub mod ui;
pub mod workflow;

#[cfg(test)]
mod test_support;
