use chrono::{
    DateTime,
    Utc,
};
use log::{
    debug,
    info,
};

use super::{
    due::EngineKeys,
    items::{
        checked_priority,
        Free,
        StudyItem,
    },
    state::DeckCore,
};
use crate::{
    core::{
        utils::is_kanji_testable,
        ItemId,
        MainHint,
        QuestionType,
        QuestionTypes,
        Result,
        StudyError,
        WordId,
    },
    dictionary::WordStore,
    engine::SrsEngine,
};

/// Creates free items for every requested question type a word does not have
/// yet. Returns the number of items created.
pub(crate) fn queue_word_items<E: SrsEngine, W: WordStore + ?Sized>(
    core: &mut DeckCore<E>,
    words: &W,
    requests: &[(WordId, QuestionTypes)],
    priority: u8,
    main_hint: MainHint,
    now: DateTime<Utc>,
) -> Result<usize> {
    let priority = checked_priority(priority)?;
    if let Some((word, _)) = requests.iter().find(|(word, _)| !words.contains(*word)) {
        return Err(StudyError::UnknownWord(*word));
    }

    let state = &mut core.state;
    let mut added = 0;

    for (word, mask) in requests {
        let written = words.kanji(*word).unwrap_or_default();

        for question in mask.types() {
            if question == QuestionType::Kanji && !is_kanji_testable(written) {
                debug!("word {} has no kanji, skipping the kanji question", word);
                continue;
            }
            if state.records.get(*word).is_some_and(|record| record.item(question).is_some()) {
                continue;
            }

            let id = state.allocate_item();
            state.free.add(StudyItem {
                id,
                added: now,
                word: *word,
                question,
                main_hint,
                kind: Free { priority },
            })?;
            state.records.attach(*word, question, id)?;
            added += 1;
        }
    }

    info!("queued {} new items for {} words", added, requests.len());
    Ok(added)
}

pub(crate) fn remove_queued_items<E: SrsEngine>(
    core: &mut DeckCore<E>,
    items: &[ItemId],
) -> Result<usize> {
    let state = &mut core.state;
    if let Some(missing) = items.iter().find(|id| !state.free.contains(**id)) {
        return Err(StudyError::UnknownItem(*missing));
    }

    let mut removed = 0;
    for id in items {
        // Duplicates in `items` were removed on their first occurrence.
        let Ok(item) = state.free.remove(*id) else {
            continue;
        };
        state.records.detach(item.word, item.question);
        removed += 1;
    }
    Ok(removed)
}

/// Deletes the cards of locked items. With `requeue` set the items go back to
/// the free queue with the given priority, otherwise they are removed.
fn release_studied_items<E: SrsEngine>(
    core: &mut DeckCore<E>,
    items: &[ItemId],
    requeue: Option<u8>,
) -> Result<usize> {
    let DeckCore { state, engine } = core;
    if let Some(missing) = items.iter().find(|id| !state.locked.contains(**id)) {
        return Err(StudyError::UnknownItem(*missing));
    }

    let mut released = 0;
    for id in items {
        if !state.locked.contains(*id) {
            continue;
        }
        let card = state.locked.get(*id)?.card();
        let failed_at = {
            let keys = EngineKeys::new(&state.locked, &*engine);
            if state.due.remove(*id, &keys) {
                None
            } else {
                state.failed.take(*id)
            }
        };

        let remaining_group = match engine.delete_card(card) {
            Ok(group) => group,
            Err(e) => {
                match failed_at {
                    Some(at) => state.failed.insert_at(at, *id),
                    None => {
                        state.due.insert(*id, &EngineKeys::new(&state.locked, &*engine));
                    }
                }
                return Err(e);
            }
        };
        let item = state.locked.remove(*id)?;
        let (word, question) = (item.word, item.question);

        match requeue {
            Some(priority) => {
                state.free.add(item.unlock(priority))?;
            }
            None => {
                state.records.detach(word, question);
            }
        }
        if let Some(record) = state.records.get_mut(word) {
            record.group = remaining_group;
        }
        released += 1;
    }
    Ok(released)
}

pub(crate) fn remove_studied_items<E: SrsEngine>(
    core: &mut DeckCore<E>,
    items: &[ItemId],
) -> Result<usize> {
    let removed = release_studied_items(core, items, None)?;
    info!("removed {} studied items", removed);
    Ok(removed)
}

pub(crate) fn requeue_studied_items<E: SrsEngine>(
    core: &mut DeckCore<E>,
    items: &[ItemId],
    priority: u8,
) -> Result<usize> {
    let priority = checked_priority(priority)?;
    let requeued = release_studied_items(core, items, Some(priority))?;
    info!("moved {} studied items back to the queue", requeued);
    Ok(requeued)
}

pub(crate) fn set_queued_priority<E: SrsEngine>(
    core: &mut DeckCore<E>,
    items: &[ItemId],
    priority: u8,
) -> Result<()> {
    let priority = checked_priority(priority)?;
    let free = &mut core.state.free;
    if let Some(missing) = items.iter().find(|id| !free.contains(**id)) {
        return Err(StudyError::UnknownItem(*missing));
    }
    for id in items {
        free.set_priority(*id, priority)?;
    }
    Ok(())
}

pub(crate) fn set_main_hint<E: SrsEngine>(
    core: &mut DeckCore<E>,
    item: ItemId,
    hint: MainHint,
) -> Result<()> {
    let state = &mut core.state;
    if let Ok(free) = state.free.get_mut(item) {
        free.main_hint = hint;
        return Ok(());
    }
    state.locked.get_mut(item)?.main_hint = hint;
    Ok(())
}
