//! Pipeline error type

use thiserror::Error;

use crate::backend::BackendError;
use crate::renderer::FramePhase;

/// Renderer error type
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Effect '{effect}' has no parameter named '{name}'")]
    MissingParameter {
        effect: &'static str,
        name: &'static str,
    },
    #[error("Cannot {operation} while the frame is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: FramePhase,
    },
    #[error("Bloom preset {index} out of range (0..{count})")]
    InvalidPreset { index: usize, count: usize },
}

pub type RenderResult<T> = Result<T, RenderError>;
