use thiserror::Error;

/// Failures surfaced to the user. Everything else (bridge, trigger reader,
/// storage) is logged and absorbed where it happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Grant Screen Time authorization first.")]
    CapabilityDenied,
    #[error("Select a mode before blocking.")]
    NoModeSelected,
    #[error("Please select apps to block first.")]
    NoAppSelection,
    #[error("You can have at most {max} modes.")]
    LimitReached { max: usize },
    #[error("Invalid mode name: {0}")]
    InvalidModeName(String),
    #[error("Unknown mode: {0}")]
    UnknownMode(String),
    #[error("Failed to apply the app shield: {0}")]
    Shield(String),
    #[error("This draft was already committed or aborted.")]
    DraftFinished,
}

pub type BlockResult<T> = Result<T, BlockError>;
