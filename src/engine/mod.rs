//! Contract of the spaced-repetition engine.
//!
//! The engine owns the per-card interval and ease state. The study deck only
//! decides *which* item to show; *when* a card is next due is always asked
//! from the engine.

use std::time::Duration;

use chrono::{
    DateTime,
    NaiveDate,
    TimeDelta,
    Utc,
};

use crate::core::{
    AnswerQuality,
    CardId,
    GroupHandle,
    Result,
};

pub mod memory;

pub use memory::MemoryEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewCard {
    pub card: CardId,
    pub group: GroupHandle,
}

pub trait SrsEngine: Send + Sync {
    /// Creates a card. Passing a group puts the card in that group, otherwise a
    /// new group is established and returned.
    fn create_card(&mut self, group: Option<GroupHandle>) -> Result<NewCard>;

    /// Deletes a card and returns its group if the group still holds other cards.
    fn delete_card(&mut self, card: CardId) -> Result<Option<GroupHandle>>;

    /// Records an answer and returns the time until the card is due again.
    fn answer(&mut self, card: CardId, quality: AnswerQuality, elapsed: Duration)
        -> Result<TimeDelta>;

    /// Revises the most recent answer. Fails if `card` was not the last card answered.
    fn change_last_answer(&mut self, card: CardId, quality: AnswerQuality) -> Result<TimeDelta>;

    fn card_next_test(&self, card: CardId) -> Option<DateTime<Utc>>;

    fn card_last_test(&self, card: CardId) -> Option<DateTime<Utc>>;

    /// Current spacing interval of the card.
    fn card_spacing(&self, card: CardId) -> Option<TimeDelta>;

    /// Expected spacing after the next correct answer.
    fn card_eta(&self, card: CardId) -> Option<TimeDelta>;

    /// Moves every card of `other` into `main` and returns the surviving handle.
    fn merge_groups(&mut self, main: GroupHandle, other: GroupHandle) -> Result<GroupHandle>;

    /// The logical day tests currently count towards.
    fn test_day(&self) -> NaiveDate;

    /// The logical day a moment in time belongs to.
    fn test_day_of(&self, at: DateTime<Utc>) -> NaiveDate;

    /// Moves the engine to the current test day. Returns true when a new day began.
    fn start_test_day(&mut self) -> bool;
}
