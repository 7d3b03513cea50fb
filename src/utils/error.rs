//! Error types for frameflow

use thiserror::Error;

/// Main error type for frameflow
#[derive(Error, Debug)]
pub enum FrameflowError {
    /// Model file unreadable or invalid
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Unknown device or out-of-range option
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime refused to allocate the requested resources
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pre-processing callback failed; the frame is dropped
    #[error("Pre-processing failed: {0}")]
    PreProc(String),

    /// Post-processing callback failed; the frame is published as a gap
    #[error("Post-processing failed: {0}")]
    PostProc(String),

    /// The runtime rejected an asynchronous launch
    #[error("Launch failed: {0}")]
    Launch(String),

    /// The runtime reported an execution failure
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameflowError>;
