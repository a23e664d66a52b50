use std::time::Duration;

use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use log::{
    debug,
    warn,
};

use super::{
    due::EngineKeys,
    state::{
        DeckCore,
        DeckState,
    },
};
use crate::{
    core::{
        AnswerQuality,
        ItemId,
        Result,
    },
    dictionary::WordStore,
    engine::SrsEngine,
};

/// What `answer` did, kept so the answer can be revised later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnswerRecord {
    pub item: ItemId,
    pub quality: AnswerQuality,
    /// The item was free before this answer and got its card now.
    pub was_new: bool,
}

/// Takes a locked item out of whichever index holds it. Must run while the
/// engine still reports the item's old next-test time. Returns true when the
/// item sat in the failed index.
fn unplace<E: SrsEngine>(state: &mut DeckState, engine: &E, item: ItemId) -> bool {
    let keys = EngineKeys::new(&state.locked, engine);
    if state.due.remove(item, &keys) {
        false
    } else {
        state.failed.remove(item)
    }
}

fn place<E: SrsEngine>(state: &mut DeckState, engine: &E, item: ItemId, passed: bool) {
    if passed {
        let keys = EngineKeys::new(&state.locked, engine);
        state.due.insert(item, &keys);
    } else {
        state.failed.push(item);
    }
}

pub(crate) fn answer_item<E: SrsEngine, W: WordStore + ?Sized>(
    core: &mut DeckCore<E>,
    words: &W,
    item: ItemId,
    quality: AnswerQuality,
    elapsed: Duration,
    now: DateTime<Utc>,
) -> Result<(AnswerRecord, TimeDelta)> {
    let DeckCore { state, engine } = core;
    let was_new = state.free.contains(item);

    let (word, eta) = if was_new {
        let word = state.free.get(item)?.word;
        let group = state.records.get(word).and_then(|record| record.group);
        let new_card = engine.create_card(group)?;

        // The item stays free until the engine has taken the answer.
        let eta = match engine.answer(new_card.card, quality, elapsed) {
            Ok(eta) => eta,
            Err(e) => {
                if let Err(cleanup) = engine.delete_card(new_card.card) {
                    warn!("could not delete card {} of item {}: {}", new_card.card, item, cleanup);
                }
                return Err(e);
            }
        };

        let free = state.free.remove(item)?;
        state.locked.add(free.lock(new_card.card))?;
        if let Some(record) = state.records.get_mut(word) {
            record.group = Some(new_card.group);
        }
        state.new_count += 1;
        (word, eta)
    } else {
        let locked = state.locked.get(item)?;
        let (word, card) = (locked.word, locked.card());
        let was_failed = unplace(state, &*engine, item);
        let eta = match engine.answer(card, quality, elapsed) {
            Ok(eta) => eta,
            Err(e) => {
                place(state, &*engine, item, !was_failed);
                return Err(e);
            }
        };
        (word, eta)
    };
    place(state, &*engine, item, quality.is_pass());

    if was_new {
        state.readings.add(words, word, true, !quality.is_pass());
    } else {
        state.readings.commit();
    }

    if let Some(record) = state.records.get_mut(word) {
        record.include(now);
    }

    debug!("item {} answered {:?} (new: {}), due again in {}", item, quality, was_new, eta);
    Ok((AnswerRecord { item, quality, was_new }, eta))
}

/// Replaces the grade of the most recent answer.
pub(crate) fn change_answer<E: SrsEngine, W: WordStore + ?Sized>(
    core: &mut DeckCore<E>,
    words: &W,
    record: &AnswerRecord,
    quality: AnswerQuality,
) -> Result<(AnswerRecord, TimeDelta)> {
    let DeckCore { state, engine } = core;
    let locked = state.locked.get(record.item)?;
    let (word, card) = (locked.word, locked.card());

    unplace(state, &*engine, record.item);
    let eta = match engine.change_last_answer(card, quality) {
        Ok(eta) => eta,
        Err(e) => {
            place(state, &*engine, record.item, record.quality.is_pass());
            return Err(e);
        }
    };
    place(state, &*engine, record.item, quality.is_pass());

    if record.was_new {
        state.readings.undo_last_add();
        state.readings.add(words, word, true, !quality.is_pass());
    }

    debug!("answer of item {} changed from {:?} to {:?}", record.item, record.quality, quality);
    Ok((AnswerRecord { quality, ..*record }, eta))
}
