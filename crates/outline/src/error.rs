use thiserror::Error;

use crate::buffers::{AllocError, BufferSemantic};
use crate::stages::StageKind;

/// Reasons a camera's outline is dropped for the current frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutlineError {
    #[error("failed to allocate {semantic}")]
    Allocation {
        semantic: BufferSemantic,
        #[source]
        source: AllocError,
    },
    #[error("{stage} stage is missing its {semantic} input")]
    MissingInput {
        stage: StageKind,
        semantic: BufferSemantic,
    },
}

impl OutlineError {
    pub(crate) fn allocation(semantic: BufferSemantic) -> impl FnOnce(AllocError) -> Self {
        move |source| Self::Allocation { semantic, source }
    }
}
