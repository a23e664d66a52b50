pub mod clock;
pub mod errors;
pub mod models;
pub mod tasks;
pub mod utils;

pub use clock::{
    Clock,
    ManualClock,
    SystemClock,
};
pub use errors::{
    Result,
    StudyError,
};
pub use models::{
    AnswerQuality,
    CardId,
    DeckHandle,
    GroupHandle,
    ItemId,
    MainHint,
    QuestionType,
    QuestionTypes,
    ReadingIndex,
    WordId,
};
