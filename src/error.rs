use thiserror::Error;

#[derive(Debug, Error)]
pub enum VrtError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Diff computation error: {0}")]
    Diff(String),
}

impl VrtError {
    pub fn config(message: impl Into<String>) -> Self {
        VrtError::Config(message.into())
    }

    pub fn browser(message: impl Into<String>) -> Self {
        VrtError::Browser(message.into())
    }

    pub fn diff(message: impl Into<String>) -> Self {
        VrtError::Diff(message.into())
    }
}

pub type Result<T> = std::result::Result<T, VrtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: VrtError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, VrtError::Io(_)));
        assert!(format!("{err}").contains("disk gone"));
    }

    #[test]
    fn config_constructor_wraps_message() {
        let err = VrtError::config("threshold must be >= 0");
        assert!(format!("{err}").contains("threshold must be >= 0"));
    }
}
