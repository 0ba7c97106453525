/// Title/body pair handed to the data source for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub title: String,
    pub message: String,
}

const OOPS_TITLE: &str = "Upsss...";

impl AlertMessage {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn saved() -> Self {
        Self::new("Saved to Photos 🎉", "")
    }

    pub fn access_denied() -> Self {
        Self::new(
            OOPS_TITLE,
            "Photo can't be saved! Photo Library access is denied ⚠️",
        )
    }

    pub fn save_failed(reason: &str) -> Self {
        Self::new(OOPS_TITLE, format!("{reason} 😕"))
    }

    pub fn unknown_error() -> Self {
        Self::new(OOPS_TITLE, "Unknown error 😱")
    }
}
