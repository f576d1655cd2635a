use std::thread::ThreadId;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Everything that can go wrong while driving a [`Session`](crate::session::Session).
///
/// Collaborators report failures as `anyhow::Error`; the session wraps them in the
/// variant matching the step that failed.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("open source {path}: {source}")]
    DecoderOpen {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("open destination {path}: {source}")]
    EncoderOpen {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("decode: {0}")]
    Decode(#[source] anyhow::Error),

    #[error("encode: {0}")]
    Encode(#[source] anyhow::Error),

    #[error("filter: {0}")]
    Filter(#[source] anyhow::Error),

    #[error("release: {0}")]
    Release(#[source] anyhow::Error),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("geometry mismatch: expected {expected:?}, got {found:?}")]
    GeometryMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("filter engine is bound to thread {owner:?}, called from {current:?}")]
    ThreadAffinity { owner: ThreadId, current: ThreadId },

    #[error("session not started")]
    NotStarted,

    #[error("session closed")]
    Closed,

    #[error("cancelled")]
    Cancelled,
}

impl TranscodeError {
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage(message.into())
    }

    /// Failures that happened before any frame could be processed.
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::DecoderOpen { .. } | Self::EncoderOpen { .. })
    }
}
