// Visual state of the individual controls inside a feed row.

use std::fmt;
use std::sync::Arc;

use crate::models::PhotoRecord;
use crate::pipeline::DecodedImage;
use crate::source::RowInputs;

/// Action a row control can be wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Like,
    Unlike,
    OpenDetails,
    Download,
}

impl RowAction {
    /// Action for the like toggle given the current like state.
    pub fn for_like_state(liked_by_user: bool) -> Self {
        if liked_by_user {
            Self::Unlike
        } else {
            Self::Like
        }
    }

    fn dispatch(self, inputs: &dyn RowInputs, photo: PhotoRecord) {
        match self {
            Self::Like => inputs.like(photo),
            Self::Unlike => inputs.unlike(photo),
            Self::OpenDetails => inputs.open_details(photo),
            Self::Download => inputs.download(photo),
        }
    }
}

#[derive(Clone)]
pub struct BoundAction {
    pub action: RowAction,
    pub photo: PhotoRecord,
    inputs: Arc<dyn RowInputs>,
}

impl BoundAction {
    pub fn execute(self) {
        self.action.dispatch(self.inputs.as_ref(), self.photo);
    }
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAction")
            .field("action", &self.action)
            .field("photo", &self.photo.id)
            .finish()
    }
}

/// A button with one replaceable action slot.
#[derive(Debug, Clone, Default)]
pub struct ActionButton {
    bound: Option<BoundAction>,
}

impl ActionButton {
    /// Replace whatever was bound. Returns the previous action.
    pub fn bind(
        &mut self,
        action: RowAction,
        photo: PhotoRecord,
        inputs: Arc<dyn RowInputs>,
    ) -> Option<RowAction> {
        self.bound
            .replace(BoundAction {
                action,
                photo,
                inputs,
            })
            .map(|previous| previous.action)
    }

    pub fn clear(&mut self) {
        self.bound = None;
    }

    pub fn action(&self) -> Option<RowAction> {
        self.bound.as_ref().map(|b| b.action)
    }

    pub fn photo_id(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.photo.id.as_str())
    }

    pub fn bound(&self) -> Option<BoundAction> {
        self.bound.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeIcon {
    #[default]
    NotLiked,
    Liked,
}

impl LikeIcon {
    pub fn for_like_state(liked_by_user: bool) -> Self {
        if liked_by_user {
            Self::Liked
        } else {
            Self::NotLiked
        }
    }

    pub fn resource_name(self) -> &'static str {
        match self {
            Self::Liked => "favorite-black",
            Self::NotLiked => "favorite-border-black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resolution {
    Low,
    High,
}

/// Content image slot. Within one load sequence a lower resolution never
/// replaces a higher one.
#[derive(Debug, Clone, Default)]
pub struct ContentImageView {
    image: Option<DecodedImage>,
    resolution: Option<Resolution>,
}

impl ContentImageView {
    /// Returns false when the image was dropped in favour of a sharper one.
    pub fn apply(&mut self, resolution: Resolution, image: DecodedImage) -> bool {
        if self.resolution.is_some_and(|shown| resolution < shown) {
            return false;
        }
        self.image = Some(image);
        self.resolution = Some(resolution);
        true
    }

    /// New locators arrived: keep showing the current image, but accept any resolution again.
    pub fn begin_sequence(&mut self) {
        self.resolution = None;
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.resolution = None;
    }

    pub fn image(&self) -> Option<&DecodedImage> {
        self.image.as_ref()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }
}

/// Content height in logical points. Unusable coefficients collapse the image.
pub fn height_points(size_coefficient: f64) -> f32 {
    if size_coefficient.is_finite() && size_coefficient > 0.0 {
        size_coefficient as f32
    } else {
        0.0
    }
}
