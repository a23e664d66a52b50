use std::fmt;

use bitflags::bitflags;
use serde::{
    Deserialize,
    Serialize,
};

/// Index of a word in the word store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WordId(pub u32);

/// Stable id of a study item. Survives the Free -> Locked promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Card handle issued by the spaced-repetition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardId(pub u64);

/// Engine handle shared by every card of one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupHandle(pub u64);

/// Engine handle of the deck itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeckHandle(pub u32);

/// Index of a kanji reading (ON readings first, then KUN readings).
pub type ReadingIndex = u8;

macro_rules! display_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(WordId, ItemId, CardId, GroupHandle, DeckHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    Kanji,
    Kana,
    Definition,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] =
        [QuestionType::Kanji, QuestionType::Kana, QuestionType::Definition];

    pub fn flag(self) -> QuestionTypes {
        match self {
            QuestionType::Kanji => QuestionTypes::KANJI,
            QuestionType::Kana => QuestionTypes::KANA,
            QuestionType::Definition => QuestionTypes::DEFINITION,
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct QuestionTypes: u8 {
        const KANJI = 0b001;
        const KANA = 0b010;
        const DEFINITION = 0b100;
    }
}

impl QuestionTypes {
    pub fn types(self) -> impl Iterator<Item = QuestionType> {
        QuestionType::ALL.into_iter().filter(move |t| self.contains(t.flag()))
    }
}

impl From<QuestionType> for QuestionTypes {
    fn from(question: QuestionType) -> Self {
        question.flag()
    }
}

/// Which part of the word is shown as the main hint while testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MainHint {
    #[default]
    Default,
    Kanji,
    Kana,
    Definition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerQuality {
    Wrong,
    Retry,
    Correct,
    Easy,
}

impl AnswerQuality {
    pub fn is_pass(self) -> bool {
        matches!(self, AnswerQuality::Correct | AnswerQuality::Easy)
    }
}

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 9;
pub const DEFAULT_PRIORITY: u8 = 5;
