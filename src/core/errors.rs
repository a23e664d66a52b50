use thiserror::Error;

use super::models::{
    CardId,
    ItemId,
    WordId,
};

#[derive(Error, Debug)]
pub enum StudyError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Deck encode error: {0}")]
    Encode(Box<bincode::error::EncodeError>),

    #[error("Deck decode error: {0}")]
    Decode(Box<bincode::error::DecodeError>),

    #[error("No study item with id {0}")]
    UnknownItem(ItemId),

    #[error("Word {0} is not in the word store")]
    UnknownWord(WordId),

    #[error("The engine has no card {0}")]
    UnknownCard(CardId),

    #[error("Priority must be between 1 and 9, got {0}")]
    InvalidPriority(u8),

    #[error("No item is being tested")]
    NoCurrentItem,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Corrupt deck data: {0}")]
    CorruptDeck(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T, E = StudyError> = std::result::Result<T, E>;

impl From<std::io::Error> for StudyError {
    fn from(error: std::io::Error) -> Self {
        StudyError::Io(Box::new(error))
    }
}

impl From<bincode::error::EncodeError> for StudyError {
    fn from(error: bincode::error::EncodeError) -> Self {
        StudyError::Encode(Box::new(error))
    }
}

impl From<bincode::error::DecodeError> for StudyError {
    fn from(error: bincode::error::DecodeError) -> Self {
        StudyError::Decode(Box::new(error))
    }
}
