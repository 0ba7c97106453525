use std::time::SystemTime;

use super::Locator;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub name: String,
    pub username: String,
    pub profile_image: Option<Locator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoUrls {
    /// Low-resolution rendition, shown first.
    pub small: Option<Locator>,
    /// High-resolution rendition, replaces `small` once loaded.
    pub regular: Option<Locator>,
}

/// Photo as delivered by the feed. The row never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub likes: u32,
    pub liked_by_user: bool,
    pub updated_at: SystemTime,
    pub user: UserRecord,
    pub urls: PhotoUrls,
    pub download: Option<Locator>,
}

impl PhotoRecord {
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}
