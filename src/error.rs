use thiserror::Error;

use crate::mode::CanvasMode;

/// Everything that can go wrong inside the canvas manager and its helpers.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("invalid value: {0}")]
    Validation(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("lock already acquired")]
    AlreadyHeld,

    #[error("lock already released")]
    NotHeld,

    #[error("render loop already running")]
    AlreadyRunning,

    #[error("render loop not running")]
    NotRunning,

    #[error("frame rate not set")]
    FrameRateUnset,

    #[error("shader compilation error: {0}")]
    Compile(String),

    #[error("shader program initialization error: {0}")]
    Link(String),

    #[error("operation requires mode {expected}, current mode is {actual}")]
    WrongMode {
        expected: CanvasMode,
        actual: CanvasMode,
    },

    #[error("texture alias already exists: {0}")]
    DuplicateAlias(String),

    #[error("texture not found: {0}")]
    NotFound(String),

    #[error("all {0} texture units are bound")]
    AllUnitsBound(u32),

    #[error("gl context destroyed")]
    Destroyed,

    #[error("gl context already destroyed")]
    AlreadyTornDown,

    #[error("shader is not tracked by this store")]
    NotTracked,

    #[error("uniform {0} does not exist or was not user set")]
    UnknownUniform(String),

    #[error("no canvas exists in mode NONE")]
    NoCanvas,

    #[error("fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("browser error: {0}")]
    Platform(String),

    #[error(transparent)]
    Trigger(#[from] anyhow::Error),
}

impl CanvasError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        CanvasError::Validation(msg.into())
    }
}
