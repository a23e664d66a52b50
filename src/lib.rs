pub mod core;
pub mod deck;
pub mod dictionary;
pub mod engine;
pub mod persistence;
pub mod settings;

pub use crate::core::{
    AnswerQuality,
    Clock,
    DeckHandle,
    ItemId,
    MainHint,
    QuestionType,
    QuestionTypes,
    Result,
    StudyError,
    WordId,
};
pub use crate::deck::{
    NextItem,
    ReconcileReport,
    StudyDeck,
    WordMapping,
};
pub use crate::dictionary::WordStore;
pub use crate::engine::SrsEngine;
pub use crate::settings::DeckSettings;
