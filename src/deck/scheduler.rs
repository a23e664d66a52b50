//! Next-item selection.
//!
//! New items come first while today's quota lasts, scanning priority buckets
//! from 9 down to 1. After that the due pool (failed items plus everything due
//! today) is searched, either for the shortest spacing or for the item shown
//! longest ago. Words tested within the cool-down window are avoided, and the
//! word that was just answered is only picked when nothing else is left.

use std::{
    collections::HashSet,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use chrono::{
    DateTime,
    NaiveDate,
    TimeDelta,
    Utc,
};
use log::debug;

use super::{
    due::{
        DueKeySource,
        EngineKeys,
    },
    items::LockedItem,
    state::DeckState,
};
use crate::{
    core::{
        models::{
            MAX_PRIORITY,
            MIN_PRIORITY,
        },
        ItemId,
        WordId,
    },
    engine::SrsEngine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextItem {
    Item(ItemId),
    /// Nothing else is left to ask, so the item just answered is asked again.
    RepeatCurrent(ItemId),
}

impl NextItem {
    pub fn id(self) -> ItemId {
        match self {
            NextItem::Item(id) | NextItem::RepeatCurrent(id) => id,
        }
    }

    pub fn is_repeat(self) -> bool {
        matches!(self, NextItem::RepeatCurrent(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SelectionInput {
    pub now: DateTime<Utc>,
    /// The item answered last, if any.
    pub previous: Option<ItemId>,
    pub prefer_short_interval: bool,
    pub new_quota_left: u32,
    pub cooldown: TimeDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Aborted;

pub(crate) type Selection = Result<Option<NextItem>, Aborted>;

enum FreePick {
    Found(ItemId),
    OnlyPreviousWord(ItemId),
    Nothing,
}

struct Context<'a, E: ?Sized> {
    state: &'a DeckState,
    engine: &'a E,
    input: &'a SelectionInput,
    abort: &'a AtomicBool,
    today: NaiveDate,
    previous_word: Option<WordId>,
    recent: HashSet<WordId>,
}

impl<'a, E: SrsEngine + ?Sized> Context<'a, E> {
    fn new(
        state: &'a DeckState,
        engine: &'a E,
        input: &'a SelectionInput,
        abort: &'a AtomicBool,
    ) -> Result<Self, Aborted> {
        let mut context = Self {
            state,
            engine,
            input,
            abort,
            today: engine.test_day(),
            previous_word: input.previous.and_then(|id| state.word_of(id)),
            recent: HashSet::new(),
        };
        context.recent = context.recently_tested_words()?;
        Ok(context)
    }

    fn check(&self) -> Result<(), Aborted> {
        if self.abort.load(Ordering::Relaxed) {
            Err(Aborted)
        } else {
            Ok(())
        }
    }

    fn recently_tested_words(&self) -> Result<HashSet<WordId>, Aborted> {
        let cutoff = self.input.now - self.input.cooldown;
        let mut recent = HashSet::new();

        for item in self.state.locked.iter() {
            self.check()?;
            if self.engine.card_last_test(item.card()).is_some_and(|at| at > cutoff) {
                recent.insert(item.word);
            }
        }
        // The word being answered right now may not carry its new timestamp yet.
        if let Some(word) = self.previous_word {
            recent.insert(word);
        }
        Ok(recent)
    }

    fn is_previous_word(&self, word: WordId) -> bool {
        self.previous_word == Some(word)
    }

    fn tested_today(&self, word: WordId) -> bool {
        self.state
            .records
            .get(word)
            .and_then(|record| record.last_included)
            .is_some_and(|at| self.engine.test_day_of(at) == self.today)
    }

    fn word_last_shown(&self, word: WordId) -> Option<DateTime<Utc>> {
        self.state.records.get(word).and_then(|record| record.last_included)
    }

    fn item_last_shown(&self, item: &LockedItem) -> Option<DateTime<Utc>> {
        self.engine.card_last_test(item.card()).or_else(|| self.word_last_shown(item.word))
    }

    fn pick_free(&self) -> Result<FreePick, Aborted> {
        let counts = self.state.free.priorities_snapshot();
        let mut fallback: Option<(Option<DateTime<Utc>>, ItemId)> = None;
        let mut previous_word_item = None;

        for priority in (MIN_PRIORITY..=MAX_PRIORITY).rev() {
            if counts[(priority - MIN_PRIORITY) as usize] == 0 {
                continue;
            }

            let mut outside_recent = None;
            for item in self.state.free.bucket(priority) {
                self.check()?;

                if self.is_previous_word(item.word) {
                    previous_word_item.get_or_insert(item.id);
                    continue;
                }
                if !self.tested_today(item.word) {
                    return Ok(FreePick::Found(item.id));
                }
                if outside_recent.is_none() && !self.recent.contains(&item.word) {
                    outside_recent = Some(item.id);
                }

                let shown = self.word_last_shown(item.word);
                if fallback.map_or(true, |(best, _)| shown < best) {
                    fallback = Some((shown, item.id));
                }
            }

            if let Some(id) = outside_recent {
                return Ok(FreePick::Found(id));
            }
        }

        Ok(match (fallback, previous_word_item) {
            (Some((_, id)), _) => FreePick::Found(id),
            (None, Some(id)) => FreePick::OnlyPreviousWord(id),
            (None, None) => FreePick::Nothing,
        })
    }

    /// Failed items first, then the due index up to the end of today.
    fn due_pool(&self) -> Result<Vec<&'a LockedItem>, Aborted> {
        let state = self.state;
        let keys = EngineKeys::new(&state.locked, self.engine);
        let mut pool = Vec::with_capacity(state.failed.len());

        for id in state.failed.iter() {
            self.check()?;
            if let Ok(item) = state.locked.get(id) {
                pool.push(item);
            }
        }
        for id in state.due.iter() {
            self.check()?;
            let key = keys.due_key(id);
            if keys.test_day_of(key.next_test) > self.today {
                break;
            }
            if let Ok(item) = state.locked.get(id) {
                pool.push(item);
            }
        }
        Ok(pool)
    }

    /// The candidate shown longest ago. Ties keep pool order.
    fn least_recent<'b>(
        &self,
        candidates: impl Iterator<Item = &'b LockedItem>,
    ) -> Result<Option<&'b LockedItem>, Aborted> {
        let mut best: Option<(Option<DateTime<Utc>>, &LockedItem)> = None;
        for item in candidates {
            self.check()?;
            let shown = self.item_last_shown(item);
            if best.map_or(true, |(best_shown, _)| shown < best_shown) {
                best = Some((shown, item));
            }
        }
        Ok(best.map(|(_, item)| item))
    }

    fn shortest_spacing<'b>(
        &self,
        candidates: impl Iterator<Item = &'b LockedItem>,
    ) -> Result<Option<&'b LockedItem>, Aborted> {
        let mut best: Option<(TimeDelta, &LockedItem)> = None;
        for item in candidates {
            self.check()?;
            let spacing = self.engine.card_spacing(item.card()).unwrap_or(TimeDelta::MAX);
            if best.map_or(true, |(best_spacing, _)| spacing < best_spacing) {
                best = Some((spacing, item));
            }
        }
        Ok(best.map(|(_, item)| item))
    }

    fn pick_due_other_word(&self, pool: &[&'a LockedItem]) -> Result<Option<ItemId>, Aborted> {
        let others: Vec<&LockedItem> =
            pool.iter().copied().filter(|item| !self.is_previous_word(item.word)).collect();
        if others.is_empty() {
            return Ok(None);
        }

        if self.input.prefer_short_interval {
            let fragile = self.shortest_spacing(others.iter().copied().filter(|item| {
                !self.recent.contains(&item.word) && !self.tested_today(item.word)
            }))?;
            if let Some(item) = fragile {
                debug!("picked item {} by shortest spacing", item.id);
                return Ok(Some(item.id));
            }
        }

        // Not tested today, then outside the cool-down, then anything.
        for tier in 0..3 {
            let accept = |item: &LockedItem| match tier {
                0 => !self.tested_today(item.word),
                1 => !self.recent.contains(&item.word),
                _ => true,
            };
            if let Some(item) = self.least_recent(others.iter().copied().filter(|i| accept(i)))? {
                return Ok(Some(item.id));
            }
        }
        Ok(None)
    }

    fn pick_due_previous_word(&self, pool: &[&'a LockedItem]) -> Result<Option<ItemId>, Aborted> {
        let siblings = pool.iter().copied().filter(|item| {
            self.is_previous_word(item.word) && Some(item.id) != self.input.previous
        });
        Ok(self.least_recent(siblings)?.map(|item| item.id))
    }
}

/// Chooses the item to ask after `input.previous`. Read-only; returns
/// `Err(Aborted)` as soon as `abort` is raised.
pub(crate) fn select_next<E: SrsEngine + ?Sized>(
    state: &DeckState,
    engine: &E,
    input: &SelectionInput,
    abort: &AtomicBool,
) -> Selection {
    let context = Context::new(state, engine, input, abort)?;

    let mut previous_word_free = None;
    if input.new_quota_left > 0 && !state.free.is_empty() {
        match context.pick_free()? {
            FreePick::Found(id) => {
                debug!("picked new item {}", id);
                return Ok(Some(NextItem::Item(id)));
            }
            FreePick::OnlyPreviousWord(id) => previous_word_free = Some(id),
            FreePick::Nothing => {}
        }
    }

    let pool = context.due_pool()?;
    if let Some(id) = context.pick_due_other_word(&pool)? {
        return Ok(Some(NextItem::Item(id)));
    }
    if let Some(id) = previous_word_free {
        debug!("only the previous word has new items left, picked {}", id);
        return Ok(Some(NextItem::Item(id)));
    }
    if let Some(id) = context.pick_due_previous_word(&pool)? {
        debug!("only the previous word is due, picked sibling {}", id);
        return Ok(Some(NextItem::Item(id)));
    }

    match input.previous {
        Some(previous) if pool.iter().any(|item| item.id == previous) => {
            debug!("nothing else is due, repeating item {}", previous);
            Ok(Some(NextItem::RepeatCurrent(previous)))
        }
        _ => Ok(None),
    }
}
