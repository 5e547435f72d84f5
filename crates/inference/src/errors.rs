use thiserror::Error;

/// The request body has the wrong shape.
#[derive(Error, Debug)]
pub enum InvalidRequest {
    #[error("Invalid JSON: missing 'image' key")]
    MissingImageKey,
}

/// The image payload could not be turned into pixels.
#[derive(Error, Debug)]
pub enum InvalidImage {
    #[error("Error: Not a valid image. Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Error: Not a valid image. {0}")]
    Decode(#[from] image::ImageError),

    #[error("Error: Not a valid image. Expected a base64 string for 'image', got {0}")]
    NotText(&'static str),
}

/// The detector or the flattening of its output failed.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct InferenceFailure(pub String);

impl InferenceFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<anyhow::Error> for InferenceFailure {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line
        Self(format!("{:#}", err))
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    #[error(transparent)]
    InvalidImage(#[from] InvalidImage),

    #[error(transparent)]
    InferenceFailure(#[from] InferenceFailure),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidRequest(_) | ServiceError::InvalidImage(_) => 400,
            ServiceError::InferenceFailure(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = InvalidRequest::MissingImageKey;
        assert_eq!(err.to_string(), "Invalid JSON: missing 'image' key");

        let err = InvalidImage::NotText("number");
        assert_eq!(
            err.to_string(),
            "Error: Not a valid image. Expected a base64 string for 'image', got number"
        );

        let err = InferenceFailure::new("class index 7 out of range");
        assert_eq!(err.to_string(), "class index 7 out of range");
    }

    #[test]
    fn test_service_error_is_transparent() {
        let err: ServiceError = InvalidRequest::MissingImageKey.into();
        assert_eq!(err.to_string(), "Invalid JSON: missing 'image' key");
    }

    #[test]
    fn test_status_codes_follow_taxonomy() {
        let missing: ServiceError = InvalidRequest::MissingImageKey.into();
        let bad_image: ServiceError = InvalidImage::NotText("null").into();
        let failed: ServiceError = InferenceFailure::new("boom").into();

        assert_eq!(missing.status_code(), 400);
        assert_eq!(bad_image.status_code(), 400);
        assert_eq!(failed.status_code(), 500);
        assert!(missing.is_client_error());
        assert!(!failed.is_client_error());
    }

    #[test]
    fn test_anyhow_chain_is_preserved() {
        let err = anyhow::anyhow!("shape [1, 5, 8400]").context("Unexpected model output");
        let failure = InferenceFailure::from(err);
        assert_eq!(
            failure.to_string(),
            "Unexpected model output: shape [1, 5, 8400]"
        );
    }

    #[test]
    fn test_base64_error_converts_with_question_mark() {
        use base64::Engine;

        fn decode(text: &str) -> Result<Vec<u8>, InvalidImage> {
            Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
        }

        match decode("not base64!") {
            Err(InvalidImage::Base64(_)) => {}
            other => panic!("Expected Base64 variant, got {:?}", other.map(|b| b.len())),
        }
    }
}
