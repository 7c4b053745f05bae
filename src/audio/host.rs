use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::page::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Suspended => write!(f, "suspended"),
            ContextState::Running => write!(f, "running"),
            ContextState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("failed to create processing context: {0}")]
    ContextCreation(String),

    #[error("cannot capture element {element} as a source: {reason}")]
    SourceUnavailable { element: ElementId, reason: String },

    #[error("failed to resume processing context: {0}")]
    Resume(String),
}

/// One processing context of the host audio runtime.
pub trait ProcessingContext: Send + 'static {
    fn state(&self) -> ContextState;

    fn sample_rate(&self) -> f32;

    /// Capture `element` as the source feeding this context.
    fn create_media_source(&mut self, element: ElementId) -> Result<(), HostError>;

    fn release_media_source(&mut self);

    fn resume(&mut self) -> impl Future<Output = Result<(), HostError>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Factory for processing contexts.
pub trait AudioBackend: Send + Sync + 'static {
    type Context: ProcessingContext;

    fn create_context(&self) -> impl Future<Output = Result<Self::Context, HostError>> + Send;
}
