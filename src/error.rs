use reqwest::StatusCode;
use thiserror::Error;

/// Rejected before any work is done; no network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no model selected")]
    NoModelSelected,
    #[error("no image or region to process")]
    NoInput,
    #[error("a generation job is already running")]
    JobAlreadyActive,
}

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("image is not decoded yet")]
    ImageNotReady,
    #[error("region {width}x{height} is empty after clamping to the image")]
    EmptyRegion { width: u32, height: u32 },
    #[error("failed to encode region: {0}")]
    Encode(#[from] image::ImageError),
}

/// Anything the inference endpoint can do wrong while a call is in flight.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("request to inference endpoint failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference endpoint returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("inference endpoint reported an error: {0}")]
    Endpoint(String),
    #[error("malformed stream line '{line}': {source}")]
    MalformedStream {
        line: String,
        source: serde_json::Error,
    },
    #[error("no valid response received from inference endpoint")]
    EmptyResponse,
    #[error("generation task ended without a result")]
    Interrupted,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_distinct() {
        assert_eq!(ValidationError::NoModelSelected.to_string(), "no model selected");
        assert_eq!(
            ValidationError::NoInput.to_string(),
            "no image or region to process"
        );
    }

    #[test]
    fn generation_error_is_transparent() {
        let error: GenerationError = RasterError::ImageNotReady.into();
        assert_eq!(error.to_string(), "image is not decoded yet");
    }
}
