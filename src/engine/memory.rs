//! In-process SM-2 engine.
//!
//! Quality maps to the SuperMemo scale as Wrong = 1, Retry = 2, Correct = 4,
//! Easy = 5. Failed cards are due again immediately.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use chrono::{
    DateTime,
    NaiveDate,
    TimeDelta,
    Utc,
};
use log::debug;

use super::{
    NewCard,
    SrsEngine,
};
use crate::core::{
    AnswerQuality,
    CardId,
    Clock,
    GroupHandle,
    Result,
    StudyError,
};

const MIN_EASE_FACTOR: f32 = 1.3;
const START_EASE_FACTOR: f32 = 2.5;
const DEFAULT_DAY_START_HOUR: i64 = 4;
const MAX_SPACING_DAYS: i64 = 36500;

#[derive(Debug, Clone, PartialEq)]
struct CardState {
    group: GroupHandle,
    repetitions: u32,
    ease_factor: f32,
    spacing: TimeDelta,
    next_test: Option<DateTime<Utc>>,
    last_test: Option<DateTime<Utc>>,
    answer_count: u32,
}

impl CardState {
    fn new(group: GroupHandle) -> Self {
        Self {
            group,
            repetitions: 0,
            ease_factor: START_EASE_FACTOR,
            spacing: TimeDelta::zero(),
            next_test: None,
            last_test: None,
            answer_count: 0,
        }
    }

    fn score(quality: AnswerQuality) -> i32 {
        match quality {
            AnswerQuality::Wrong => 1,
            AnswerQuality::Retry => 2,
            AnswerQuality::Correct => 4,
            AnswerQuality::Easy => 5,
        }
    }

    fn passed_spacing(&self) -> TimeDelta {
        match self.repetitions {
            0 => TimeDelta::days(1),
            1 => TimeDelta::days(6),
            _ => {
                let days = (self.spacing.num_days().max(1) as f32 * self.ease_factor).round();
                TimeDelta::days((days as i64).clamp(1, MAX_SPACING_DAYS))
            }
        }
    }

    fn apply(&mut self, quality: AnswerQuality, at: DateTime<Utc>) -> TimeDelta {
        let q = Self::score(quality);

        if quality.is_pass() {
            self.spacing = self.passed_spacing();
            self.repetitions += 1;
            let miss = (5 - q) as f32;
            self.ease_factor =
                (self.ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR);
        } else {
            self.repetitions = 0;
            self.spacing = TimeDelta::zero();
            self.ease_factor = (self.ease_factor - 0.2).max(MIN_EASE_FACTOR);
        }

        self.answer_count += 1;
        self.last_test = Some(at);
        self.next_test =
            Some(at.checked_add_signed(self.spacing).unwrap_or(DateTime::<Utc>::MAX_UTC));
        self.spacing
    }
}

#[derive(Debug, Clone)]
struct LastAnswer {
    card: CardId,
    before: CardState,
    at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MemoryEngine {
    clock: Arc<dyn Clock>,
    day_start: TimeDelta,
    current_day: NaiveDate,
    cards: HashMap<CardId, CardState>,
    group_sizes: HashMap<GroupHandle, usize>,
    next_card: u64,
    next_group: u64,
    last_answer: Option<LastAnswer>,
}

impl MemoryEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_day_start(clock, DEFAULT_DAY_START_HOUR)
    }

    /// `day_start_hour` is the UTC hour at which a new test day begins.
    pub fn with_day_start(clock: Arc<dyn Clock>, day_start_hour: i64) -> Self {
        let day_start = TimeDelta::hours(day_start_hour.clamp(0, 23));
        let current_day = (clock.now() - day_start).date_naive();
        Self {
            clock,
            day_start,
            current_day,
            cards: HashMap::new(),
            group_sizes: HashMap::new(),
            next_card: 1,
            next_group: 1,
            last_answer: None,
        }
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn group_count(&self) -> usize {
        self.group_sizes.len()
    }

    pub fn card_group(&self, card: CardId) -> Option<GroupHandle> {
        self.cards.get(&card).map(|c| c.group)
    }

    pub fn card_answer_count(&self, card: CardId) -> Option<u32> {
        self.cards.get(&card).map(|c| c.answer_count)
    }

    fn card_mut(&mut self, card: CardId) -> Result<&mut CardState> {
        self.cards.get_mut(&card).ok_or(StudyError::UnknownCard(card))
    }
}

impl SrsEngine for MemoryEngine {
    fn create_card(&mut self, group: Option<GroupHandle>) -> Result<NewCard> {
        let group = match group {
            Some(group) if self.group_sizes.contains_key(&group) => group,
            Some(group) => {
                return Err(StudyError::InvalidOperation(format!("group {} does not exist", group)))
            }
            None => {
                let group = GroupHandle(self.next_group);
                self.next_group += 1;
                group
            }
        };

        let card = CardId(self.next_card);
        self.next_card += 1;
        self.cards.insert(card, CardState::new(group));
        *self.group_sizes.entry(group).or_insert(0) += 1;

        Ok(NewCard { card, group })
    }

    fn delete_card(&mut self, card: CardId) -> Result<Option<GroupHandle>> {
        let state = self.cards.remove(&card).ok_or(StudyError::UnknownCard(card))?;

        if self.last_answer.as_ref().is_some_and(|last| last.card == card) {
            self.last_answer = None;
        }

        let remaining = match self.group_sizes.get_mut(&state.group) {
            Some(size) => {
                *size = size.saturating_sub(1);
                *size
            }
            None => 0,
        };

        if remaining == 0 {
            self.group_sizes.remove(&state.group);
            Ok(None)
        } else {
            Ok(Some(state.group))
        }
    }

    fn answer(
        &mut self,
        card: CardId,
        quality: AnswerQuality,
        elapsed: Duration,
    ) -> Result<TimeDelta> {
        let at = self.clock.now();
        let state = self.card_mut(card)?;
        let before = state.clone();
        let eta = state.apply(quality, at);

        debug!("card {} answered {:?} after {:?}, next in {}", card, quality, elapsed, eta);
        self.last_answer = Some(LastAnswer { card, before, at });
        Ok(eta)
    }

    fn change_last_answer(&mut self, card: CardId, quality: AnswerQuality) -> Result<TimeDelta> {
        let last = match &self.last_answer {
            Some(last) if last.card == card => last.clone(),
            _ => {
                return Err(StudyError::InvalidOperation(format!(
                    "card {} does not hold the most recent answer",
                    card
                )))
            }
        };

        let state = self.card_mut(card)?;
        *state = last.before.clone();
        Ok(state.apply(quality, last.at))
    }

    fn card_next_test(&self, card: CardId) -> Option<DateTime<Utc>> {
        self.cards.get(&card).and_then(|c| c.next_test)
    }

    fn card_last_test(&self, card: CardId) -> Option<DateTime<Utc>> {
        self.cards.get(&card).and_then(|c| c.last_test)
    }

    fn card_spacing(&self, card: CardId) -> Option<TimeDelta> {
        self.cards.get(&card).map(|c| c.spacing)
    }

    fn card_eta(&self, card: CardId) -> Option<TimeDelta> {
        self.cards.get(&card).map(|c| c.passed_spacing())
    }

    fn merge_groups(&mut self, main: GroupHandle, other: GroupHandle) -> Result<GroupHandle> {
        if main == other {
            return Ok(main);
        }
        if !self.group_sizes.contains_key(&main) {
            return Err(StudyError::InvalidOperation(format!("group {} does not exist", main)));
        }

        let mut moved = 0;
        for state in self.cards.values_mut().filter(|c| c.group == other) {
            state.group = main;
            moved += 1;
        }
        self.group_sizes.remove(&other);
        *self.group_sizes.entry(main).or_insert(0) += moved;

        debug!("merged group {} into {} ({} cards)", other, main, moved);
        Ok(main)
    }

    fn test_day(&self) -> NaiveDate {
        self.test_day_of(self.clock.now())
    }

    fn test_day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        (at - self.day_start).date_naive()
    }

    fn start_test_day(&mut self) -> bool {
        let today = self.test_day();
        if today == self.current_day {
            return false;
        }
        self.current_day = today;
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::core::ManualClock;

    fn engine_at(hour: u32) -> (Arc<ManualClock>, MemoryEngine) {
        let start = Utc.with_ymd_and_hms(2024, 3, 10, hour, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let engine = MemoryEngine::new(clock.clone());
        (clock, engine)
    }

    #[test]
    fn test_groups_are_shared_and_released() {
        let (_, mut engine) = engine_at(12);
        let first = engine.create_card(None).unwrap();
        let second = engine.create_card(Some(first.group)).unwrap();
        assert_eq!(first.group, second.group);
        assert_eq!(engine.group_count(), 1);

        assert_eq!(engine.delete_card(first.card).unwrap(), Some(first.group));
        assert_eq!(engine.delete_card(second.card).unwrap(), None);
        assert_eq!(engine.group_count(), 0);
        assert!(engine.create_card(Some(first.group)).is_err());
    }

    #[test]
    fn test_intervals_grow_on_pass() {
        let (_, mut engine) = engine_at(12);
        let card = engine.create_card(None).unwrap().card;

        let first = engine.answer(card, AnswerQuality::Correct, Duration::from_secs(3)).unwrap();
        assert_eq!(first, TimeDelta::days(1));
        let second = engine.answer(card, AnswerQuality::Correct, Duration::from_secs(3)).unwrap();
        assert_eq!(second, TimeDelta::days(6));
        let third = engine.answer(card, AnswerQuality::Easy, Duration::from_secs(3)).unwrap();
        assert!(third > second);

        let failed = engine.answer(card, AnswerQuality::Wrong, Duration::from_secs(3)).unwrap();
        assert_eq!(failed, TimeDelta::zero());
        assert_eq!(engine.card_next_test(card), engine.card_last_test(card));
    }

    #[test]
    fn test_spacing_is_capped() {
        let (_, mut engine) = engine_at(12);
        let card = engine.create_card(None).unwrap().card;

        let mut eta = TimeDelta::zero();
        for _ in 0..40 {
            eta = engine.answer(card, AnswerQuality::Easy, Duration::from_secs(1)).unwrap();
        }
        assert_eq!(eta, TimeDelta::days(MAX_SPACING_DAYS));
        assert_eq!(engine.card_eta(card), Some(TimeDelta::days(MAX_SPACING_DAYS)));
        assert!(engine.card_next_test(card) > engine.card_last_test(card));
    }

    #[test]
    fn test_change_last_answer_reapplies_from_saved_state() {
        let (clock, mut engine) = engine_at(12);
        let card = engine.create_card(None).unwrap().card;
        let other = engine.create_card(None).unwrap().card;

        engine.answer(card, AnswerQuality::Wrong, Duration::from_secs(1)).unwrap();
        let answered_at = engine.card_last_test(card);
        clock.advance(TimeDelta::minutes(5));

        let eta = engine.change_last_answer(card, AnswerQuality::Correct).unwrap();
        assert_eq!(eta, TimeDelta::days(1));
        assert_eq!(engine.card_last_test(card), answered_at);
        assert_eq!(engine.card_answer_count(card), Some(1));

        assert!(matches!(
            engine.change_last_answer(other, AnswerQuality::Correct),
            Err(StudyError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_day_boundary_uses_day_start() {
        let (clock, mut engine) = engine_at(2);
        let before = engine.test_day();
        assert_eq!(before, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert!(!engine.start_test_day());

        clock.advance(TimeDelta::hours(3));
        assert_eq!(engine.test_day(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert!(engine.start_test_day());
        assert!(!engine.start_test_day());
    }

    #[test]
    fn test_merge_groups_moves_cards() {
        let (_, mut engine) = engine_at(12);
        let a = engine.create_card(None).unwrap();
        let b = engine.create_card(None).unwrap();

        let merged = engine.merge_groups(a.group, b.group).unwrap();
        assert_eq!(merged, a.group);
        assert_eq!(engine.card_group(b.card), Some(a.group));
        assert_eq!(engine.group_count(), 1);
        assert_eq!(engine.delete_card(a.card).unwrap(), Some(a.group));
    }
}
