use thiserror::Error;

use crate::analysis::image::ImageError;
use crate::analysis::preferences::PreferencesError;
use crate::llm::CompletionError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No image file provided")]
    MissingImage,
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),
    #[error(transparent)]
    InvalidImage(ImageError),
    #[error(transparent)]
    InvalidPreferences(#[from] PreferencesError),
    #[error("Too many requests. Please try again later.")]
    RateLimited,
    #[error("model output could not be parsed after repair")]
    UnparseableResponse,
    #[error("completion provider unavailable: {0}")]
    ProviderUnavailable(CompletionError),
    #[error("completion call exceeded its deadline")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::MissingImage => "missing_image",
            AnalysisError::MalformedUpload(_) => "malformed_upload",
            AnalysisError::InvalidImage(_) => "invalid_image",
            AnalysisError::InvalidPreferences(_) => "invalid_preferences",
            AnalysisError::RateLimited => "rate_limited",
            AnalysisError::UnparseableResponse => "unparseable_response",
            AnalysisError::ProviderUnavailable(_) => "provider_unavailable",
            AnalysisError::Timeout => "timeout",
            AnalysisError::Internal(_) => "internal",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::MissingImage
                | AnalysisError::MalformedUpload(_)
                | AnalysisError::InvalidImage(_)
                | AnalysisError::InvalidPreferences(_)
                | AnalysisError::RateLimited
        )
    }

    // Text safe to show to the caller. Provider and parser detail stays in
    // the logs.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::MissingImage
            | AnalysisError::MalformedUpload(_)
            | AnalysisError::InvalidImage(_)
            | AnalysisError::InvalidPreferences(_)
            | AnalysisError::RateLimited => self.to_string(),
            AnalysisError::UnparseableResponse | AnalysisError::Internal(_) => {
                "Failed to analyze skin".to_string()
            }
            AnalysisError::ProviderUnavailable(_) => {
                "Analysis service is temporarily unavailable. Please try again later.".to_string()
            }
            AnalysisError::Timeout => "Analysis took too long. Please try again.".to_string(),
        }
    }
}

impl From<ImageError> for AnalysisError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::EncodeFailed(detail) => AnalysisError::Internal(detail),
            other => AnalysisError::InvalidImage(other),
        }
    }
}

impl From<CompletionError> for AnalysisError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout => AnalysisError::Timeout,
            other => AnalysisError::ProviderUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_timeouts_stay_distinct() {
        assert!(matches!(
            AnalysisError::from(CompletionError::Timeout),
            AnalysisError::Timeout
        ));
        assert!(matches!(
            AnalysisError::from(CompletionError::RateLimited),
            AnalysisError::ProviderUnavailable(CompletionError::RateLimited)
        ));
    }

    #[test]
    fn internal_detail_is_not_user_facing() {
        let err = AnalysisError::from(CompletionError::Provider {
            status: 500,
            message: "upstream stack trace".to_string(),
        });
        assert!(!err.user_message().contains("stack trace"));
        assert!(!err.is_client_error());

        let err = AnalysisError::from(ImageError::UnsupportedFormat("image/gif".to_string()));
        assert!(err.is_client_error());
        assert_eq!(err.user_message(), "Invalid image format. Allowed: jpeg, jpg, png, webp");
    }
}
