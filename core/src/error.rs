use thiserror::Error;

/// Per-file failure. Every variant is recoverable: it ends up in that file's
/// result and never aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file already queued: {0}")]
    DuplicateFile(String),

    #[error("failed to decode: {0}")]
    Decode(String),

    #[error("frame extraction timed out after {0} ms")]
    FrameExtractionTimeout(u64),

    #[error("extracted frame is empty (all sampled pixels are black)")]
    EmptyFrameDetected,

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("archive failed: {0}")]
    Archive(String),

    #[error("storage failed: {0}")]
    Store(String),
}

impl ConversionError {
    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::DuplicateFile(_) => "DuplicateFile",
            Self::Decode(_) => "DecodeError",
            Self::FrameExtractionTimeout(_) => "FrameExtractionTimeout",
            Self::EmptyFrameDetected => "EmptyFrameDetected",
            Self::Encode(_) => "EncodeError",
            Self::Archive(_) => "ArchiveError",
            Self::Store(_) => "StoreError",
        }
    }
}

impl From<crate::store::StoreError> for ConversionError {
    fn from(e: crate::store::StoreError) -> Self {
        ConversionError::Store(e.to_string())
    }
}
