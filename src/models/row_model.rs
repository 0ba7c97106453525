use std::time::{Duration, SystemTime};

use super::{Locator, PhotoRecord};

/// Display-ready content for one feed row, derived from a `PhotoRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowContent {
    pub avatar: Option<Locator>,
    pub low_res: Option<Locator>,
    pub high_res: Option<Locator>,
    /// Height of the content image in logical points for the row width.
    pub size_coefficient: f64,
    pub full_name: String,
    pub username: String,
    pub updated: String,
    pub total_likes: String,
}

impl RowContent {
    pub fn from_photo(photo: &PhotoRecord, row_width: f64, now: SystemTime) -> Self {
        Self {
            avatar: photo.user.profile_image.clone(),
            low_res: photo.urls.small.clone(),
            high_res: photo.urls.regular.clone(),
            size_coefficient: row_width / photo.aspect_ratio(),
            full_name: photo.user.name.clone(),
            username: format!("@{}", photo.user.username),
            updated: relative_label(photo.updated_at, now),
            total_likes: likes_label(photo.likes),
        }
    }
}

pub fn likes_label(likes: u32) -> String {
    match likes {
        1 => "1 like".to_string(),
        n => format!("{n} likes"),
    }
}

/// Compact age label ("now", "5m", "3h", "2d", "4w", "1y").
pub fn relative_label(then: SystemTime, now: SystemTime) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    const WEEK: u64 = 7 * DAY;
    const YEAR: u64 = 365 * DAY;

    // Timestamps from the future read as "now".
    let secs = now
        .duration_since(then)
        .unwrap_or(Duration::ZERO)
        .as_secs();

    match secs {
        s if s < MINUTE => "now".to_string(),
        s if s < HOUR => format!("{}m", s / MINUTE),
        s if s < DAY => format!("{}h", s / HOUR),
        s if s < WEEK => format!("{}d", s / DAY),
        s if s < YEAR => format!("{}w", s / WEEK),
        s => format!("{}y", s / YEAR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhotoUrls, UserRecord};

    fn photo() -> PhotoRecord {
        PhotoRecord {
            id: "p1".into(),
            width: 4000,
            height: 2000,
            likes: 12,
            liked_by_user: false,
            updated_at: SystemTime::UNIX_EPOCH,
            user: UserRecord {
                name: "Ada Lovelace".into(),
                username: "ada".into(),
                profile_image: Some(Locator::from("https://x/ada.png")),
            },
            urls: PhotoUrls {
                small: Some(Locator::from("https://x/small.jpg")),
                regular: Some(Locator::from("https://x/regular.jpg")),
            },
            download: None,
        }
    }

    #[test]
    fn test_row_content_from_photo() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(3 * 3600);
        let content = RowContent::from_photo(&photo(), 375.0, now);

        assert_eq!(content.size_coefficient, 187.5);
        assert_eq!(content.username, "@ada");
        assert_eq!(content.updated, "3h");
        assert_eq!(content.total_likes, "12 likes");
        assert_eq!(content.low_res, Some(Locator::from("https://x/small.jpg")));
    }

    #[test]
    fn test_relative_label() {
        let base = SystemTime::UNIX_EPOCH;
        let at = |secs| base + Duration::from_secs(secs);
        assert_eq!(relative_label(base, at(30)), "now");
        assert_eq!(relative_label(base, at(5 * 60)), "5m");
        assert_eq!(relative_label(base, at(2 * 86_400)), "2d");
        assert_eq!(relative_label(base, at(21 * 86_400)), "3w");
        assert_eq!(relative_label(base, at(800 * 86_400)), "2y");
        assert_eq!(relative_label(at(100), base), "now");
    }

    #[test]
    fn test_likes_label() {
        assert_eq!(likes_label(1), "1 like");
        assert_eq!(likes_label(0), "0 likes");
    }
}
