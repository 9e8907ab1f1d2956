use thiserror::Error;

/// The review API answered, but not with the documented payload shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShapeError {
    #[error("API response is not a JSON object")]
    NotAMapping,
    #[error("API response has no `{0}` key")]
    MissingKey(&'static str),
    #[error("`homeworks` in API response is not a list")]
    NotASequence,
    #[error("`current_date` in API response is not an integer timestamp")]
    NotATimestamp,
}

/// A single homework record could not be turned into a message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("homework record is not a JSON object")]
    NotAMapping,
    #[error("homework record has no `homework_name`")]
    MissingName,
    #[error("unknown homework status: {}", .0.as_deref().unwrap_or("<missing>"))]
    UnknownStatus(Option<String>),
}

/// Anything that can go wrong inside one poll cycle.
///
/// The Display text is what ends up in the fault report sent to the chat.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Fault {
    #[error("request to review API failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Fault {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Fault::Transport(err.to_string())
    }
}
